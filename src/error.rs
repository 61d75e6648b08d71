//! 研究流程错误类型

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 研究会话中各协作者可能产生的错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResearchError {
    #[error("analysis unavailable: {0}")]
    AnalysisUnavailable(String),

    #[error("tool selection unavailable: {0}")]
    SelectionUnavailable(String),

    #[error("tool `{tool}` failed: {message}")]
    ToolExecutionError { tool: String, message: String },

    #[error("synthesis unavailable: {0}")]
    SynthesisUnavailable(String),

    #[error("invalid research mode `{0}`, expected one of instant, quick, standard, deep")]
    InvalidMode(String),

    #[error("research session cancelled")]
    Cancelled,

    #[error("research session exceeded its wall clock budget of {0:?}")]
    DeadlineExceeded(std::time::Duration),
}

impl ResearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResearchError::AnalysisUnavailable(_) => ErrorKind::AnalysisUnavailable,
            ResearchError::SelectionUnavailable(_) => ErrorKind::SelectionUnavailable,
            ResearchError::ToolExecutionError { .. } => ErrorKind::ToolExecutionError,
            ResearchError::SynthesisUnavailable(_) => ErrorKind::SynthesisUnavailable,
            ResearchError::InvalidMode(_) => ErrorKind::InvalidMode,
            ResearchError::Cancelled => ErrorKind::Cancelled,
            ResearchError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
        }
    }
}

/// 对外暴露的错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    AnalysisUnavailable,
    SelectionUnavailable,
    ToolExecutionError,
    SynthesisUnavailable,
    InvalidMode,
    Cancelled,
    DeadlineExceeded,
}

/// 失败发生的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureStage {
    Request,
    Analysis,
    Selection,
    Synthesis,
    Cancelled,
    Deadline,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureStage::Request => write!(f, "request"),
            FailureStage::Analysis => write!(f, "analysis"),
            FailureStage::Selection => write!(f, "selection"),
            FailureStage::Synthesis => write!(f, "synthesis"),
            FailureStage::Cancelled => write!(f, "cancelled"),
            FailureStage::Deadline => write!(f, "deadline"),
        }
    }
}

/// 失败会话返回给调用方的结构化错误描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub stage: FailureStage,
    /// 已经执行的重试次数（不含首次调用）
    pub retries: u32,
    pub message: String,
}

impl ErrorDescriptor {
    pub fn new(stage: FailureStage, retries: u32, error: &ResearchError) -> Self {
        Self {
            kind: error.kind(),
            stage,
            retries,
            message: error.to_string(),
        }
    }
}
