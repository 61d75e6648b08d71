use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::research::session::SourceHit;
use crate::tools::SearchTool;

#[derive(Debug, Serialize)]
pub struct TavilySearchRequest<'a> {
    pub query: &'a str,
    pub max_results: usize,
    pub search_depth: &'a str,
    pub include_raw_content: bool,
}

#[derive(Debug, Deserialize)]
pub struct TavilySearchResponse {
    #[serde(default)]
    pub results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
pub struct TavilyResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
}

impl TavilySearchResponse {
    pub fn into_hits(self) -> Vec<SourceHit> {
        self.results
            .into_iter()
            .filter(|r| !r.url.trim().is_empty())
            .map(|r| {
                let mut hit = SourceHit::new(r.url.trim());
                if !r.title.trim().is_empty() {
                    hit = hit.with_title(r.title.trim());
                }
                if !r.content.trim().is_empty() {
                    hit = hit.with_snippet(r.content.trim());
                }
                hit
            })
            .collect()
    }
}

/// Tavily 网页搜索
pub struct TavilySearch {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    max_results: usize,
    search_depth: String,
}

impl TavilySearch {
    pub const NAME: &'static str = "web_search";

    pub fn new(http: reqwest::Client, config: &SearchConfig) -> Self {
        Self {
            http,
            api_key: config.tavily_api_key.clone(),
            base_url: config.tavily_base_url.trim_end_matches('/').to_string(),
            max_results: config.max_results,
            search_depth: config.search_depth.clone(),
        }
    }
}

#[async_trait]
impl SearchTool for TavilySearch {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Search the web with the Tavily search engine; best for recent events, products, papers and general facts"
    }

    async fn search(&self, query: &str) -> Result<Vec<SourceHit>> {
        if self.api_key.is_empty() {
            bail!("TAVILY_API_KEY not set");
        }

        let request = TavilySearchRequest {
            query,
            max_results: self.max_results,
            search_depth: &self.search_depth,
            include_raw_content: false,
        };

        let response = self
            .http
            .post(format!("{}/search", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Tavily request failed")?
            .error_for_status()
            .context("Tavily returned an error status")?;

        let search_response: TavilySearchResponse = response
            .json()
            .await
            .context("Failed to parse Tavily response")?;

        Ok(search_response.into_hits())
    }
}
