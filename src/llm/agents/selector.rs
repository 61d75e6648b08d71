use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::ResearchError;
use crate::llm::agents::PromptTemplate;
use crate::llm::client::LLMClient;
use crate::research::collaborators::{SelectionRequest, ToolSelector, ToolSpec};
use crate::research::session::ToolCall;

/// prompt中最多列出的已见来源数
const SEEN_SOURCES_IN_PROMPT: usize = 60;

/// 计划中的一次工具调用
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlannedCall {
    /// Name of one of the available tools
    pub tool_name: String,
    /// Search query for that tool
    pub query: String,
}

/// 本轮工具调用计划
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ToolPlan {
    /// Tool calls to run this round; empty when nothing useful remains
    #[serde(default)]
    pub calls: Vec<PlannedCall>,
}

/// 过滤计划：丢弃未知工具、空查询与重复调用，并限制数量
pub(crate) fn sanitize_plan(plan: ToolPlan, tools: &[ToolSpec], max_calls: usize) -> Vec<ToolCall> {
    let known: HashSet<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    let mut seen = HashSet::new();
    let mut calls = Vec::new();

    for planned in plan.calls {
        let tool_name = planned.tool_name.trim();
        let query = planned.query.trim();
        if !known.contains(tool_name) {
            warn!("忽略未知工具: {}", tool_name);
            continue;
        }
        if query.is_empty() {
            continue;
        }
        if !seen.insert((tool_name.to_string(), query.to_lowercase())) {
            continue;
        }
        calls.push(ToolCall::new(tool_name, query));
        if calls.len() >= max_calls {
            break;
        }
    }
    calls
}

/// 工具选择器 - 把知识缺口转化为具体的搜索调用
#[derive(Clone)]
pub struct LlmToolSelector {
    client: LLMClient,
    max_calls: usize,
}

impl LlmToolSelector {
    pub fn new(client: LLMClient, max_calls: usize) -> Self {
        Self {
            client,
            max_calls: max_calls.max(1),
        }
    }

    fn prompt_template() -> PromptTemplate {
        PromptTemplate {
            system_prompt: r#"You are a research planner. You turn the open knowledge gaps of a research question into a small set of targeted tool calls.

Rules:
- Only use tools from the provided list, spelled exactly as listed.
- Prefer queries likely to surface sources that have not been seen yet.
- Return an empty list when further searching would not improve the answer.

Return the plan as structured JSON."#
                .to_string(),
            opening_instruction: "Plan the tool calls for the next research round:".to_string(),
            closing_instruction: String::new(),
        }
    }

    pub(crate) fn build_user_prompt(request: &SelectionRequest<'_>, max_calls: usize) -> String {
        let tools = request
            .available_tools
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n");

        let seen = if request.seen_source_ids.is_empty() {
            "none".to_string()
        } else {
            let shown = request
                .seen_source_ids
                .iter()
                .rev()
                .take(SEEN_SOURCES_IN_PROMPT)
                .map(|id| format!("- {}", id))
                .collect::<Vec<_>>()
                .join("\n");
            let hidden = request
                .seen_source_ids
                .len()
                .saturating_sub(SEEN_SOURCES_IN_PROMPT);
            if hidden > 0 {
                format!("{}\n(and {} earlier sources)", shown, hidden)
            } else {
                shown
            }
        };

        let body = format!(
            "## Question\n{}\n\n## Mode\n{} (round {} of {})\n\n## Current analysis\n{}\n\n## Available tools\n{}\n\n## Sources already seen\n{}",
            request.question,
            request.mode,
            request.round_index,
            request.budget.max_rounds,
            request.analysis_summary,
            tools,
            seen
        );

        let closing = format!(
            "## Requirements\n- at most {} calls\n- aim for roughly {} new sources this round",
            max_calls, request.budget.sources_per_round
        );
        format!("{}\n\n{}", Self::prompt_template().render(&body), closing)
    }
}

#[async_trait]
impl ToolSelector for LlmToolSelector {
    async fn select(&self, request: &SelectionRequest<'_>) -> Result<Vec<ToolCall>, ResearchError> {
        if request.available_tools.is_empty() {
            return Ok(Vec::new());
        }

        let template = Self::prompt_template();
        let user_prompt = Self::build_user_prompt(request, self.max_calls);

        let plan: ToolPlan = self
            .client
            .extract(&template.system_prompt, &user_prompt)
            .await
            .map_err(|e| ResearchError::SelectionUnavailable(e.to_string()))?;

        let calls = sanitize_plan(plan, request.available_tools, self.max_calls);
        debug!(calls = calls.len(), round = request.round_index, "工具选择完成");
        Ok(calls)
    }
}
