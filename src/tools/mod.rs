//! 研究循环使用的搜索工具，以及按名称分发的 ToolBox

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::CacheManager;
use crate::config::SearchConfig;
use crate::error::ResearchError;
use crate::research::collaborators::{ToolExecutor, ToolSpec};
use crate::research::session::SourceHit;

pub mod tavily;
pub mod wikipedia;

pub use tavily::TavilySearch;
pub use wikipedia::WikipediaSearch;

/// 单个搜索工具
#[async_trait]
pub trait SearchTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn search(&self, query: &str) -> Result<Vec<SourceHit>>;
}

/// 一组搜索工具，按名称分发调用，可选地缓存结果
#[derive(Clone, Default)]
pub struct ToolBox {
    tools: Vec<Arc<dyn SearchTool>>,
    cache: Option<Arc<CacheManager>>,
}

impl ToolBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, tool: Arc<dyn SearchTool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// 按配置启用工具
    pub fn from_config(config: &SearchConfig, cache: Option<Arc<CacheManager>>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .user_agent(concat!("deep-research-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        let mut toolbox = ToolBox::new();
        for name in &config.enabled_tools {
            match name.as_str() {
                TavilySearch::NAME => {
                    if config.tavily_api_key.is_empty() {
                        warn!("未配置 TAVILY_API_KEY，跳过工具 {}", name);
                        continue;
                    }
                    toolbox = toolbox.with_tool(Arc::new(TavilySearch::new(http.clone(), config)));
                }
                WikipediaSearch::NAME => {
                    toolbox =
                        toolbox.with_tool(Arc::new(WikipediaSearch::new(http.clone(), config)?));
                }
                other => warn!("未知的工具名称: {}", other),
            }
        }

        if let Some(cache) = cache {
            toolbox = toolbox.with_cache(cache);
        }
        Ok(toolbox)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn find(&self, tool_name: &str) -> Option<&Arc<dyn SearchTool>> {
        self.tools.iter().find(|t| t.name() == tool_name)
    }

    async fn cached(&self, tool_name: &str, query: &str) -> Option<Vec<SourceHit>> {
        let cache = self.cache.as_ref()?;
        match cache.get::<Vec<SourceHit>>(tool_name, query).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("读取工具缓存失败: {}", e);
                None
            }
        }
    }

    async fn store(&self, tool_name: &str, query: &str, hits: &[SourceHit]) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(tool_name, query, hits).await {
                warn!("写入工具缓存失败: {}", e);
            }
        }
    }
}

#[async_trait]
impl ToolExecutor for ToolBox {
    fn available_tools(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec::new(t.name(), t.description()))
            .collect()
    }

    async fn execute(&self, tool_name: &str, query: &str) -> Result<Vec<SourceHit>, ResearchError> {
        let tool = self
            .find(tool_name)
            .ok_or_else(|| ResearchError::ToolExecutionError {
                tool: tool_name.to_string(),
                message: "unknown tool".to_string(),
            })?;

        if let Some(hits) = self.cached(tool_name, query).await {
            debug!(tool = tool_name, hits = hits.len(), "使用缓存的搜索结果");
            return Ok(hits);
        }

        let hits = tool
            .search(query)
            .await
            .map_err(|e| ResearchError::ToolExecutionError {
                tool: tool_name.to_string(),
                message: format!("{:#}", e),
            })?;

        debug!(tool = tool_name, hits = hits.len(), "搜索完成");
        self.store(tool_name, query, &hits).await;
        Ok(hits)
    }
}
