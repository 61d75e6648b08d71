use anyhow::{Result, bail};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use deep_research_rs::cache::CacheManager;
use deep_research_rs::cli::Args;
use deep_research_rs::llm::agents::{LlmAnalyzer, LlmSynthesizer, LlmToolSelector};
use deep_research_rs::llm::client::LLMClient;
use deep_research_rs::tools::ToolBox;
use deep_research_rs::{Collaborators, ControllerOptions, ResearchService};

fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "info,deep_research_rs=debug"
    } else {
        "warn,deep_research_rs=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let request = args.request();
    let print_json = args.json;
    let check_connection = args.check_connection;
    let config = args.into_config()?;

    init_tracing(config.verbose);

    let cache = config
        .cache
        .enabled
        .then(|| Arc::new(CacheManager::new(config.cache.clone())));
    let toolbox = ToolBox::from_config(&config.search, cache.clone())?;
    if toolbox.is_empty() {
        warn!("没有可用的搜索工具，研究将只依赖模型分析");
    }

    let client = LLMClient::new(&config.llm)?;
    if check_connection {
        client.check_connection().await?;
    }

    let collaborators = Collaborators::new(
        Arc::new(LlmAnalyzer::new(client.clone())),
        Arc::new(LlmToolSelector::new(
            client.clone(),
            config.research.max_tool_calls_per_round,
        )),
        Arc::new(toolbox),
        Arc::new(LlmSynthesizer::new(client)),
    );
    let service = ResearchService::new(collaborators, ControllerOptions::from(&config.research))
        .with_default_mode(config.research.default_mode);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，正在取消研究...");
            on_interrupt.cancel();
        }
    });

    let response = service.handle_with_cancel(request, cancel).await;
    info!(
        status = %response.status,
        rounds = response.rounds_used,
        sources = response.sources_used,
        elapsed_ms = response.elapsed_ms,
        "研究结束"
    );

    if let Some(cache) = &cache {
        let report = cache.generate_performance_report();
        info!(
            hits = report.cache_hits,
            misses = report.cache_misses,
            hit_rate = %format!("{:.1}%", report.hit_rate * 100.0),
            "工具缓存统计"
        );
    }

    if print_json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else if let Some(answer) = &response.final_answer {
        println!("{}", answer);
    }

    if !response.is_success() {
        match &response.error {
            Some(error) => bail!("研究失败 ({}): {}", error.stage, error.message),
            None => bail!("研究失败"),
        }
    }
    Ok(())
}
