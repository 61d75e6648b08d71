use async_trait::async_trait;
use tracing::debug;

use crate::error::ResearchError;
use crate::llm::agents::{PromptTemplate, render_records};
use crate::llm::client::LLMClient;
use crate::research::collaborators::Synthesizer;
use crate::research::session::RoundRecord;

const SNIPPET_LIMIT: usize = 1200;

/// 综合器 - 基于全部轮次的证据撰写最终答案
#[derive(Clone)]
pub struct LlmSynthesizer {
    client: LLMClient,
}

impl LlmSynthesizer {
    pub fn new(client: LLMClient) -> Self {
        Self { client }
    }

    fn prompt_template() -> PromptTemplate {
        PromptTemplate {
            system_prompt: r#"You are a senior research writer. You answer the research question using only the evidence gathered across the research rounds.

Rules:
- Cite sources inline by their URL or identifier.
- Say plainly when the evidence is thin or contradictory.
- Write in the language of the question, in well-structured Markdown."#
                .to_string(),
            opening_instruction: "Write the final answer for the following research:".to_string(),
            closing_instruction: r#"
## Requirements
- Lead with a direct answer, then supporting detail
- End with a short list of the sources you relied on"#
                .to_string(),
        }
    }

    pub(crate) fn build_user_prompt(question: &str, records: &[RoundRecord]) -> String {
        let body = format!(
            "## Question\n{}\n\n## Evidence by round\n{}",
            question,
            render_records(records, SNIPPET_LIMIT)
        );
        Self::prompt_template().render(&body)
    }
}

#[async_trait]
impl Synthesizer for LlmSynthesizer {
    async fn synthesize(
        &self,
        question: &str,
        records: &[RoundRecord],
    ) -> Result<String, ResearchError> {
        let template = Self::prompt_template();
        let user_prompt = Self::build_user_prompt(question, records);

        let answer = self
            .client
            .prompt_powerful(&template.system_prompt, &user_prompt)
            .await
            .map_err(|e| ResearchError::SynthesisUnavailable(e.to_string()))?;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(ResearchError::SynthesisUnavailable(
                "model returned an empty answer".to_string(),
            ));
        }
        debug!(chars = answer.len(), "综合完成");
        Ok(answer.to_string())
    }
}
