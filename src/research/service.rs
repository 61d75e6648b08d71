//! 面向调用方的研究服务：请求解析、模式选择与响应组装

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{ErrorDescriptor, FailureStage};
use crate::research::collaborators::Collaborators;
use crate::research::controller::{ControllerOptions, RoundController, SessionOutcome};
use crate::research::mode::{ResearchMode, select_mode};
use crate::research::session::{RoundRecord, SessionStatus};

/// 研究请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchRequest {
    pub question: String,
    /// instant / quick / standard / deep，缺省时自动选择
    #[serde(default)]
    pub mode: Option<String>,
    /// 调用方上下文提示，例如 "team member"
    #[serde(default)]
    pub context: Option<String>,
}

impl ResearchRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// 研究响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchResponse {
    pub session_id: String,
    pub question: String,
    pub status: SessionStatus,
    pub mode: Option<ResearchMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
    pub rounds_used: u32,
    pub sources_used: usize,
    pub rounds: Vec<RoundRecord>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl ResearchResponse {
    fn from_outcome(outcome: SessionOutcome, started_at: DateTime<Utc>) -> Self {
        let SessionOutcome {
            session,
            final_answer,
            error,
        } = outcome;

        Self {
            session_id: session.id.clone(),
            question: session.question().to_string(),
            status: session.status(),
            mode: Some(session.mode()),
            final_answer,
            error,
            rounds_used: session.rounds_completed(),
            sources_used: session.seen_source_ids().len(),
            rounds: session.round_records().to_vec(),
            started_at,
            elapsed_ms: elapsed_ms(started_at),
        }
    }

    fn rejected(request: &ResearchRequest, error: ErrorDescriptor, started_at: DateTime<Utc>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            question: request.question.clone(),
            status: SessionStatus::Failed,
            mode: None,
            final_answer: None,
            error: Some(error),
            rounds_used: 0,
            sources_used: 0,
            rounds: Vec::new(),
            started_at,
            elapsed_ms: elapsed_ms(started_at),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Completed | SessionStatus::Exhausted
        )
    }
}

fn elapsed_ms(started_at: DateTime<Utc>) -> u64 {
    (Utc::now() - started_at).num_milliseconds().max(0) as u64
}

/// 研究服务，持有共享的协作者；每个请求创建独立会话，可并发处理
#[derive(Clone)]
pub struct ResearchService {
    controller: RoundController,
    default_mode: Option<ResearchMode>,
}

impl ResearchService {
    pub fn new(collaborators: Collaborators, options: ControllerOptions) -> Self {
        Self {
            controller: RoundController::new(collaborators, options),
            default_mode: None,
        }
    }

    /// 请求未指定模式时使用的模式，未设置则按问题自动选择
    pub fn with_default_mode(mut self, mode: Option<ResearchMode>) -> Self {
        self.default_mode = mode;
        self
    }

    /// 解析请求对应的模式，非法模式在任何轮次开始前即失败
    pub fn resolve_mode(&self, request: &ResearchRequest) -> Result<ResearchMode, ErrorDescriptor> {
        match request.mode.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw
                .parse::<ResearchMode>()
                .map_err(|e| ErrorDescriptor::new(FailureStage::Request, 0, &e)),
            _ => Ok(self.default_mode.unwrap_or_else(|| {
                select_mode(&request.question, request.context.as_deref())
            })),
        }
    }

    pub async fn handle(&self, request: ResearchRequest) -> ResearchResponse {
        self.handle_with_cancel(request, CancellationToken::new())
            .await
    }

    pub async fn handle_with_cancel(
        &self,
        request: ResearchRequest,
        cancel: CancellationToken,
    ) -> ResearchResponse {
        let started_at = Utc::now();

        let mode = match self.resolve_mode(&request) {
            Ok(mode) => mode,
            Err(error) => {
                warn!("拒绝研究请求: {}", error.message);
                return ResearchResponse::rejected(&request, error, started_at);
            }
        };
        info!(mode = %mode, explicit = request.mode.is_some(), "研究模式已确定");

        let outcome = self
            .controller
            .run_with_cancel(&request.question, mode, cancel)
            .await;
        ResearchResponse::from_outcome(outcome, started_at)
    }
}
