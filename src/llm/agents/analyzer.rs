use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ResearchError;
use crate::llm::agents::{PromptTemplate, render_records};
use crate::llm::client::LLMClient;
use crate::research::collaborators::{Analysis, Analyzer};
use crate::research::session::RoundRecord;

const SNIPPET_LIMIT: usize = 400;

/// 知识缺口分析结果
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GapAnalysis {
    /// What is known so far, in two or three sentences
    pub summary: String,
    /// Concrete open questions that still need sources
    #[serde(default)]
    pub gaps: Vec<String>,
    /// True when the collected evidence already answers the question
    pub is_complete: bool,
}

impl From<GapAnalysis> for Analysis {
    fn from(value: GapAnalysis) -> Self {
        let gaps: Vec<&str> = value
            .gaps
            .iter()
            .map(|g| g.trim())
            .filter(|g| !g.is_empty())
            .collect();
        let summary = if gaps.is_empty() || value.is_complete {
            value.summary.trim().to_string()
        } else {
            format!("{}\nOpen gaps: {}", value.summary.trim(), gaps.join("; "))
        };
        Analysis {
            summary,
            is_complete: value.is_complete,
        }
    }
}

/// 知识缺口分析师 - 基于已完成的轮次判断还缺什么，以及是否可以结束研究
#[derive(Clone)]
pub struct LlmAnalyzer {
    client: LLMClient,
}

impl LlmAnalyzer {
    pub fn new(client: LLMClient) -> Self {
        Self { client }
    }

    fn prompt_template() -> PromptTemplate {
        PromptTemplate {
            system_prompt: r#"You are a meticulous research analyst. Given a research question and the evidence gathered so far, you decide what is already established and which knowledge gaps remain.

Rules:
- Judge only from the evidence listed; do not rely on memory for facts that need sources.
- Mark the research complete only when the evidence is sufficient to answer the question well.
- Gaps must be specific enough to turn into search queries.

Return the result as structured JSON."#
                .to_string(),
            opening_instruction: "Analyze the progress of the following research:".to_string(),
            closing_instruction: r#"
## Requirements
- summary: what is known so far
- gaps: remaining open questions, empty if none
- is_complete: whether the research can stop now"#
                .to_string(),
        }
    }

    pub(crate) fn build_user_prompt(question: &str, records: &[RoundRecord]) -> String {
        let body = format!(
            "## Question\n{}\n\n## Rounds so far\n{}",
            question,
            render_records(records, SNIPPET_LIMIT)
        );
        Self::prompt_template().render(&body)
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn analyze(
        &self,
        question: &str,
        records: &[RoundRecord],
    ) -> Result<Analysis, ResearchError> {
        let template = Self::prompt_template();
        let user_prompt = Self::build_user_prompt(question, records);

        let result: GapAnalysis = self
            .client
            .extract(&template.system_prompt, &user_prompt)
            .await
            .map_err(|e| ResearchError::AnalysisUnavailable(e.to_string()))?;

        debug!(
            gaps = result.gaps.len(),
            is_complete = result.is_complete,
            "缺口分析完成"
        );
        Ok(result.into())
    }
}
