use crate::config::LLMConfig;

/// 超过该长度的prompt直接交给powerful模型
const EFFICIENT_PROMPT_LIMIT: usize = 32 * 1024;

/// 依据prompt长度选择模型，返回 (首选模型, 失败时的兜底模型)
pub fn evaluate_befitting_model(
    llm_config: &LLMConfig,
    system_prompt: &str,
    user_prompt: &str,
) -> (String, Option<String>) {
    if system_prompt.len() + user_prompt.len() <= EFFICIENT_PROMPT_LIMIT
        && llm_config.model_efficient != llm_config.model_powerful
    {
        return (
            llm_config.model_efficient.clone(),
            Some(llm_config.model_powerful.clone()),
        );
    }
    if system_prompt.len() + user_prompt.len() <= EFFICIENT_PROMPT_LIMIT {
        return (llm_config.model_efficient.clone(), None);
    }
    (llm_config.model_powerful.clone(), None)
}
