//! 基于LLM的研究协作者：分析器、工具选择器与综合器

pub mod analyzer;
pub mod selector;
pub mod synthesizer;

pub use analyzer::LlmAnalyzer;
pub use selector::LlmToolSelector;
pub use synthesizer::LlmSynthesizer;

use crate::research::session::RoundRecord;

/// Prompt模板
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub system_prompt: String,
    pub opening_instruction: String,
    pub closing_instruction: String,
}

impl PromptTemplate {
    /// 拼装用户prompt：开场指令 + 正文 + 收尾要求
    pub fn render(&self, body: &str) -> String {
        format!(
            "{}\n\n{}\n\n{}",
            self.opening_instruction.trim(),
            body.trim(),
            self.closing_instruction.trim()
        )
    }
}

/// 按字符截断，避免在多字节字符中间切断
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push('…');
    truncated
}

/// 把已完成的轮次格式化为prompt正文
pub(crate) fn render_records(records: &[RoundRecord], snippet_limit: usize) -> String {
    if records.is_empty() {
        return "No research rounds have been run yet.".to_string();
    }

    let mut out = String::new();
    for record in records {
        out.push_str(&format!(
            "### Round {}\nAnalysis: {}\n",
            record.round_index,
            record.analysis_summary
        ));
        if !record.tool_calls.is_empty() {
            out.push_str("Tool calls:\n");
            for call in &record.tool_calls {
                out.push_str(&format!("- {}\n", call));
            }
        }
        if record.evidence.is_empty() {
            out.push_str("New sources: none\n");
        } else {
            out.push_str("New sources:\n");
            for hit in &record.evidence {
                out.push_str(&format!("- {}", hit.id));
                if let Some(title) = &hit.title {
                    out.push_str(&format!(" ({})", title));
                }
                out.push('\n');
                if let Some(snippet) = &hit.snippet {
                    out.push_str(&format!("  {}\n", truncate_chars(snippet, snippet_limit)));
                }
            }
        }
        out.push('\n');
    }
    out
}
