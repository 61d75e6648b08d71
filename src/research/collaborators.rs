//! 研究循环依赖的外部协作者接口
//!
//! 控制器只通过这些 trait 与 LLM、搜索工具交互，真实实现与测试替身可以互换。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ResearchError;
use crate::research::mode::{ModeBudget, ResearchMode};
use crate::research::session::{RoundRecord, SourceHit, ToolCall};

/// 分析器输出：进展/缺口摘要，以及是否已经可以结束研究
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub summary: String,
    pub is_complete: bool,
}

impl Analysis {
    pub fn incomplete(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            is_complete: false,
        }
    }

    pub fn complete(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            is_complete: true,
        }
    }
}

/// 可供选择的工具描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// 工具选择请求
#[derive(Debug, Clone)]
pub struct SelectionRequest<'a> {
    pub question: &'a str,
    pub mode: ResearchMode,
    pub budget: ModeBudget,
    pub round_index: u32,
    pub analysis_summary: &'a str,
    pub seen_source_ids: &'a [String],
    pub available_tools: &'a [ToolSpec],
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(
        &self,
        question: &str,
        records: &[RoundRecord],
    ) -> Result<Analysis, ResearchError>;
}

#[async_trait]
pub trait ToolSelector: Send + Sync {
    /// 空列表是合法结果，表示没有值得继续的动作
    async fn select(&self, request: &SelectionRequest<'_>) -> Result<Vec<ToolCall>, ResearchError>;
}

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn available_tools(&self) -> Vec<ToolSpec>;

    async fn execute(&self, tool_name: &str, query: &str) -> Result<Vec<SourceHit>, ResearchError>;
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        question: &str,
        records: &[RoundRecord],
    ) -> Result<String, ResearchError>;
}

/// 一次研究所需的全部协作者，可在多个会话间共享
#[derive(Clone)]
pub struct Collaborators {
    pub analyzer: Arc<dyn Analyzer>,
    pub selector: Arc<dyn ToolSelector>,
    pub executor: Arc<dyn ToolExecutor>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl Collaborators {
    pub fn new(
        analyzer: Arc<dyn Analyzer>,
        selector: Arc<dyn ToolSelector>,
        executor: Arc<dyn ToolExecutor>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            analyzer,
            selector,
            executor,
            synthesizer,
        }
    }
}
