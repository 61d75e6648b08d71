use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use url::Url;

use crate::config::SearchConfig;
use crate::research::session::SourceHit;
use crate::tools::SearchTool;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("static regex"));

#[derive(Debug, Deserialize)]
pub struct WikipediaResponse {
    #[serde(default)]
    pub query: Option<WikipediaQuery>,
}

#[derive(Debug, Deserialize)]
pub struct WikipediaQuery {
    #[serde(default)]
    pub search: Vec<WikipediaPage>,
}

#[derive(Debug, Deserialize)]
pub struct WikipediaPage {
    pub title: String,
    #[serde(default)]
    pub snippet: String,
}

/// 去掉 MediaWiki 高亮标签并还原常见实体
fn clean_snippet(snippet: &str) -> String {
    HTML_TAG
        .replace_all(snippet, "")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// 条目标题对应的页面地址
pub fn article_url(site: &Url, title: &str) -> Option<String> {
    let mut url = site.clone();
    url.path_segments_mut()
        .ok()?
        .clear()
        .push("wiki")
        .push(&title.trim().replace(' ', "_"));
    Some(url.to_string())
}

impl WikipediaResponse {
    pub fn into_hits(self, site: &Url) -> Vec<SourceHit> {
        self.query
            .map(|q| q.search)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|page| {
                let url = article_url(site, &page.title)?;
                let mut hit = SourceHit::new(url).with_title(page.title.trim());
                let snippet = clean_snippet(&page.snippet);
                if !snippet.is_empty() {
                    hit = hit.with_snippet(snippet);
                }
                Some(hit)
            })
            .collect()
    }
}

/// Wikipedia 全文检索 (MediaWiki search API)
pub struct WikipediaSearch {
    http: reqwest::Client,
    site: Url,
    max_results: usize,
}

impl WikipediaSearch {
    pub const NAME: &'static str = "wikipedia";

    pub fn new(http: reqwest::Client, config: &SearchConfig) -> Result<Self> {
        let site = Url::parse(&format!(
            "https://{}.wikipedia.org/",
            config.wikipedia_language.trim()
        ))
        .context("Invalid wikipedia language")?;
        Ok(Self {
            http,
            site,
            max_results: config.max_results,
        })
    }
}

#[async_trait]
impl SearchTool for WikipediaSearch {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Search Wikipedia articles; best for background, definitions, history and well-established facts"
    }

    async fn search(&self, query: &str) -> Result<Vec<SourceHit>> {
        let endpoint = self.site.join("w/api.php")?;
        let limit = self.max_results.to_string();

        let response = self
            .http
            .get(endpoint)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("format", "json"),
                ("utf8", "1"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
            ])
            .send()
            .await
            .context("Wikipedia request failed")?
            .error_for_status()
            .context("Wikipedia returned an error status")?;

        let body: WikipediaResponse = response
            .json()
            .await
            .context("Failed to parse Wikipedia response")?;

        Ok(body.into_hits(&self.site))
    }
}
