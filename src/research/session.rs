//! 研究会话数据模型

use serde::{Deserialize, Serialize};

use crate::research::mode::{ModeBudget, ResearchMode};
use crate::research::registry::SourceRegistry;

/// 一次工具调用 (工具名, 查询)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub tool_name: String,
    pub query: String,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            query: query.into(),
        }
    }
}

impl std::fmt::Display for ToolCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:?})", self.tool_name, self.query)
    }
}

/// 工具返回的一条来源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHit {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl SourceHit {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            snippet: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

/// 单轮研究记录，追加后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundRecord {
    /// 从1开始
    pub round_index: u32,
    pub tool_calls: Vec<ToolCall>,
    /// 本轮首次出现的来源（规范化形式，按工具选择顺序）
    pub new_source_ids: Vec<String>,
    pub analysis_summary: String,
    pub is_complete: bool,
    /// 新来源的标题与摘要，id 为规范化形式
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<SourceHit>,
}

impl RoundRecord {
    /// 构造“研究已完成”记录：没有工具调用，也没有新来源
    pub fn completion(round_index: u32, analysis_summary: impl Into<String>) -> Self {
        Self {
            round_index,
            tool_calls: Vec::new(),
            new_source_ids: Vec::new(),
            analysis_summary: analysis_summary.into(),
            is_complete: true,
            evidence: Vec::new(),
        }
    }
}

/// 会话状态，InProgress 之外均为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Exhausted,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::InProgress => write!(f, "inProgress"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Exhausted => write!(f, "exhausted"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// 一次研究请求的完整生命周期状态
#[derive(Debug, Clone)]
pub struct ResearchSession {
    pub id: String,
    question: String,
    mode: ResearchMode,
    rounds_completed: u32,
    registry: SourceRegistry,
    round_records: Vec<RoundRecord>,
    status: SessionStatus,
}

impl ResearchSession {
    pub fn new(question: impl Into<String>, mode: ResearchMode) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            question: question.into(),
            mode,
            rounds_completed: 0,
            registry: SourceRegistry::new(),
            round_records: Vec::new(),
            status: SessionStatus::InProgress,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn mode(&self) -> ResearchMode {
        self.mode
    }

    pub fn budget(&self) -> ModeBudget {
        self.mode.budget()
    }

    pub fn rounds_completed(&self) -> u32 {
        self.rounds_completed
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn round_records(&self) -> &[RoundRecord] {
        &self.round_records
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn seen_source_ids(&self) -> &[String] {
        self.registry.sources()
    }

    pub(crate) fn registry_mut(&mut self) -> &mut SourceRegistry {
        &mut self.registry
    }

    /// 下一轮的序号
    pub fn next_round_index(&self) -> u32 {
        self.rounds_completed + 1
    }

    pub fn budget_exhausted(&self) -> bool {
        self.rounds_completed >= self.mode.max_rounds()
    }

    /// 追加一轮记录并累加轮次
    pub(crate) fn push_round(&mut self, record: RoundRecord) {
        debug_assert!(!self.status.is_terminal());
        debug_assert_eq!(record.round_index, self.next_round_index());
        self.round_records.push(record);
        self.rounds_completed += 1;
    }

    /// 状态迁移，终态不可再变更；返回是否发生了迁移
    pub(crate) fn transition(&mut self, status: SessionStatus) -> bool {
        if self.status.is_terminal() || status == SessionStatus::InProgress {
            return false;
        }
        self.status = status;
        true
    }
}
