use crate::config::{Config, LLMProvider};
use crate::research::ResearchRequest;
use anyhow::{Result, anyhow};
use clap::Parser;
use std::path::PathBuf;

/// Deep Research - 轮次化的多源调研助手
#[derive(Parser, Debug)]
#[command(name = "deep-research")]
#[command(
    about = "Round-based research agent: analyzes knowledge gaps, runs search tools, deduplicates sources and synthesizes a final answer."
)]
#[command(version)]
pub struct Args {
    /// 研究问题
    pub question: String,

    /// 研究模式 (instant, quick, standard, deep)，缺省时按问题自动选择
    #[arg(short, long)]
    pub mode: Option<String>,

    /// 调用方上下文提示，例如 "team member"
    #[arg(long)]
    pub context: Option<String>,

    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 是否启用详细日志
    #[arg(short, long)]
    pub verbose: bool,

    /// 以JSON格式输出完整响应
    #[arg(long)]
    pub json: bool,

    /// 开始研究前先检查模型连接
    #[arg(long)]
    pub check_connection: bool,

    /// 高能效模型，用于分析与工具选择
    #[arg(long)]
    pub model_efficient: Option<String>,

    /// 高质量模型，用于最终综合，以及作为efficient失效情况下的兜底
    #[arg(long)]
    pub model_powerful: Option<String>,

    /// LLM API基地址
    #[arg(long)]
    pub llm_api_base_url: Option<String>,

    /// LLM API KEY
    #[arg(long)]
    pub llm_api_key: Option<String>,

    /// LLM Provider (openai, deepseek, anthropic, ollama)
    #[arg(long)]
    pub llm_provider: Option<String>,

    /// 最大tokens数
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// 温度参数
    #[arg(long)]
    pub temperature: Option<f64>,

    /// 单轮工具调用的最大并发数
    #[arg(long)]
    pub max_parallels: Option<usize>,

    /// 分析/选择/综合失败后的重试次数
    #[arg(long)]
    pub retry_attempts: Option<u32>,

    /// Tavily API KEY
    #[arg(long)]
    pub tavily_api_key: Option<String>,

    /// 强制执行模式的 wall clock 预算
    #[arg(long)]
    pub enforce_wall_clock: bool,

    /// 是否禁用缓存
    #[arg(long)]
    pub no_cache: bool,
}

impl Args {
    /// 由CLI参数构造研究请求
    pub fn request(&self) -> ResearchRequest {
        ResearchRequest {
            question: self.question.clone(),
            mode: self.mode.clone(),
            context: self.context.clone(),
        }
    }

    /// 将CLI参数转换为配置，CLI参数优先于配置文件
    pub fn into_config(self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        // 覆盖LLM配置
        if let Some(provider_str) = self.llm_provider {
            config.llm.provider = provider_str
                .parse::<LLMProvider>()
                .map_err(|e| anyhow!(e))?;
        }
        if let Some(llm_api_base_url) = self.llm_api_base_url {
            config.llm.api_base_url = llm_api_base_url;
        }
        if let Some(llm_api_key) = self.llm_api_key {
            config.llm.api_key = llm_api_key;
        }
        if let Some(model_efficient) = self.model_efficient {
            config.llm.model_efficient = model_efficient;
        }
        if let Some(model_powerful) = self.model_powerful {
            config.llm.model_powerful = model_powerful;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.llm.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }

        // 研究循环配置
        if let Some(max_parallels) = self.max_parallels {
            config.research.max_parallels = max_parallels;
        }
        if let Some(retry_attempts) = self.retry_attempts {
            config.research.retry_attempts = retry_attempts;
        }
        if self.enforce_wall_clock {
            config.research.enforce_wall_clock = true;
        }

        if let Some(tavily_api_key) = self.tavily_api_key {
            config.search.tavily_api_key = tavily_api_key;
        }

        // 缓存配置
        if self.no_cache {
            config.cache.enabled = false;
        }

        config.verbose = config.verbose || self.verbose;

        Ok(config)
    }
}
