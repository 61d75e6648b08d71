//! LLM客户端 - 提供统一的LLM服务接口
//!
//! 单次调用只带超时与 efficient → powerful 的模型兜底，重试由研究循环控制。

use anyhow::{Result, anyhow};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::LLMConfig;

mod providers;
pub mod utils;

use providers::ProviderClient;
use utils::evaluate_befitting_model;

/// LLM客户端 - 提供统一的LLM服务接口
#[derive(Clone)]
pub struct LLMClient {
    config: LLMConfig,
    client: ProviderClient,
}

impl LLMClient {
    /// 创建新的LLM客户端
    pub fn new(config: &LLMConfig) -> Result<Self> {
        let client = ProviderClient::new(config)?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// 检查模型连接和功能是否正常
    pub async fn check_connection(&self) -> Result<()> {
        info!("正在检查模型连接...");
        match self
            .prompt("System: You are a helpful assistant.", "Hello")
            .await
        {
            Ok(_) => {
                info!("模型连接正常");
                Ok(())
            }
            Err(e) => {
                error!("模型连接失败: {}", e);
                Err(e)
            }
        }
    }

    /// 为单次模型调用加上超时
    async fn with_timeout<T, Fut>(&self, model: &str, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let limit = Duration::from_secs(self.config.timeout_seconds.max(1));
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "model {} timed out after {}s",
                model,
                limit.as_secs()
            )),
        }
    }

    /// 数据提取方法
    pub async fn extract<T>(&self, system_prompt: &str, user_prompt: &str) -> Result<T>
    where
        T: JsonSchema + for<'a> Deserialize<'a> + Serialize + Send + Sync + 'static,
    {
        let (befitting_model, fallover_model) =
            evaluate_befitting_model(&self.config, system_prompt, user_prompt);

        self.extract_inner(system_prompt, user_prompt, befitting_model, fallover_model)
            .await
    }

    async fn extract_inner<T>(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        befitting_model: String,
        fallover_model: Option<String>,
    ) -> Result<T>
    where
        T: JsonSchema + for<'a> Deserialize<'a> + Serialize + Send + Sync + 'static,
    {
        debug!(model = %befitting_model, "结构化提取");
        let extractor =
            self.client
                .create_extractor::<T>(&befitting_model, system_prompt, &self.config);

        match self
            .with_timeout(&befitting_model, extractor.extract(user_prompt))
            .await
        {
            Ok(r) => Ok(r),
            Err(e) => match fallover_model {
                Some(model) => {
                    warn!("调用模型 {} 出错，尝试使用备选模型 {}: {}", befitting_model, model, e);
                    let user_prompt_with_fixer = format!(
                        "{}\n\nNote: a previous attempt failed with \"{}\". Avoid repeating that error.",
                        user_prompt, e
                    );
                    Box::pin(self.extract_inner(
                        system_prompt,
                        &user_prompt_with_fixer,
                        model,
                        None,
                    ))
                    .await
                }
                None => Err(e),
            },
        }
    }

    /// 单轮对话，按prompt长度选择模型
    pub async fn prompt(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let (befitting_model, fallover_model) =
            evaluate_befitting_model(&self.config, system_prompt, user_prompt);

        match self
            .prompt_with_model(&befitting_model, system_prompt, user_prompt)
            .await
        {
            Ok(r) => Ok(r),
            Err(e) => match fallover_model {
                Some(model) => {
                    warn!("调用模型 {} 出错，尝试使用备选模型 {}: {}", befitting_model, model, e);
                    self.prompt_with_model(&model, system_prompt, user_prompt)
                        .await
                }
                None => Err(e),
            },
        }
    }

    /// 使用powerful模型的单轮对话，用于最终综合
    pub async fn prompt_powerful(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let model = self.config.model_powerful.clone();
        self.prompt_with_model(&model, system_prompt, user_prompt)
            .await
    }

    async fn prompt_with_model(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String> {
        debug!(model = %model, "模型对话");
        let agent = self
            .client
            .create_agent(model, system_prompt, &self.config);
        self.with_timeout(model, agent.prompt(user_prompt)).await
    }
}
