//! 研究轮次控制器 - 驱动会话从创建到终态
//!
//! 每一轮依次执行：分析 → 选择工具 → 并发执行工具 → 来源去重登记 → 记录本轮。
//! 分析判定完成、工具选择为空或轮次预算耗尽时退出循环，随后进行最终综合。

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ResearchConfig;
use crate::error::{ErrorDescriptor, FailureStage, ResearchError};
use crate::research::collaborators::{Collaborators, SelectionRequest};
use crate::research::mode::ResearchMode;
use crate::research::registry::normalize;
use crate::research::session::{
    ResearchSession, RoundRecord, SessionStatus, SourceHit, ToolCall,
};
use crate::utils::threads::do_parallel_with_limit;

/// 控制器运行参数
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerOptions {
    /// 首次调用失败后的最大重试次数
    pub retry_attempts: u32,
    /// 首次重试前的等待时间，之后每次翻倍
    pub retry_delay_ms: u64,
    /// 单轮内同时执行的工具调用上限
    pub max_parallels: usize,
    /// 是否把模式的 wall clock 预算作为硬截止时间
    pub enforce_wall_clock: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::from(&ResearchConfig::default())
    }
}

impl From<&ResearchConfig> for ControllerOptions {
    fn from(config: &ResearchConfig) -> Self {
        Self {
            retry_attempts: config.retry_attempts,
            retry_delay_ms: config.retry_delay_ms,
            max_parallels: config.max_parallels,
            enforce_wall_clock: config.enforce_wall_clock,
        }
    }
}

/// 会话结束后的结果
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session: ResearchSession,
    pub final_answer: Option<String>,
    pub error: Option<ErrorDescriptor>,
}

/// 会话级中断条件：外部取消或截止时间
struct Interrupt {
    cancel: CancellationToken,
    deadline: Option<(Instant, Duration)>,
}

impl Interrupt {
    /// 等待 future 完成，期间若被取消或超时则提前返回
    async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, ResearchError> {
        let deadline = async {
            match self.deadline {
                Some((at, budget)) => {
                    tokio::time::sleep_until(at).await;
                    budget
                }
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ResearchError::Cancelled),
            budget = deadline => Err(ResearchError::DeadlineExceeded(budget)),
            output = fut => Ok(output),
        }
    }
}

fn interrupt_descriptor(err: ResearchError, retries: u32) -> ErrorDescriptor {
    let stage = match err {
        ResearchError::DeadlineExceeded(_) => FailureStage::Deadline,
        _ => FailureStage::Cancelled,
    };
    ErrorDescriptor::new(stage, retries, &err)
}

/// 研究轮次控制器，协作者通过构造函数注入，可被多个会话并发复用
#[derive(Clone)]
pub struct RoundController {
    collaborators: Collaborators,
    options: ControllerOptions,
}

impl RoundController {
    pub fn new(collaborators: Collaborators, options: ControllerOptions) -> Self {
        Self {
            collaborators,
            options,
        }
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    pub async fn run(&self, question: &str, mode: ResearchMode) -> SessionOutcome {
        self.run_with_cancel(question, mode, CancellationToken::new())
            .await
    }

    /// 执行一次完整的研究会话
    #[instrument(skip_all, fields(mode = %mode))]
    pub async fn run_with_cancel(
        &self,
        question: &str,
        mode: ResearchMode,
        cancel: CancellationToken,
    ) -> SessionOutcome {
        let mut session = ResearchSession::new(question, mode);
        let budget = session.budget();
        let interrupt = Interrupt {
            cancel,
            deadline: self
                .options
                .enforce_wall_clock
                .then(|| (Instant::now() + budget.wall_clock_budget, budget.wall_clock_budget)),
        };

        info!(
            session = %session.id,
            max_rounds = budget.max_rounds,
            sources_per_round = budget.sources_per_round,
            "开始研究会话"
        );

        let exit_status = match self.drive(&mut session, &interrupt).await {
            Ok(status) => status,
            Err(descriptor) => return Self::fail(session, descriptor),
        };

        let synthesis = {
            let synthesizer = &self.collaborators.synthesizer;
            let question = session.question();
            let records = session.round_records();
            self.call_with_retry(FailureStage::Synthesis, &interrupt, || {
                synthesizer.synthesize(question, records)
            })
            .await
        };

        match synthesis {
            Ok(answer) => {
                session.transition(exit_status);
                info!(
                    session = %session.id,
                    status = %exit_status,
                    rounds = session.rounds_completed(),
                    sources = session.seen_source_ids().len(),
                    "研究会话完成"
                );
                SessionOutcome {
                    session,
                    final_answer: Some(answer),
                    error: None,
                }
            }
            Err(descriptor) => Self::fail(session, descriptor),
        }
    }

    fn fail(mut session: ResearchSession, descriptor: ErrorDescriptor) -> SessionOutcome {
        session.transition(SessionStatus::Failed);
        error!(
            session = %session.id,
            stage = %descriptor.stage,
            retries = descriptor.retries,
            rounds = session.rounds_completed(),
            "研究会话失败: {}",
            descriptor.message
        );
        SessionOutcome {
            session,
            final_answer: None,
            error: Some(descriptor),
        }
    }

    /// 轮次循环，返回退出时应进入的终态（Completed 或 Exhausted）
    async fn drive(
        &self,
        session: &mut ResearchSession,
        interrupt: &Interrupt,
    ) -> Result<SessionStatus, ErrorDescriptor> {
        let available_tools = self.collaborators.executor.available_tools();

        loop {
            let round_index = session.next_round_index();
            info!(session = %session.id, round = round_index, "开始第 {} 轮研究", round_index);

            // 1. 分析进展与缺口
            let analysis = {
                let analyzer = &self.collaborators.analyzer;
                let question = session.question();
                let records = session.round_records();
                self.call_with_retry(FailureStage::Analysis, interrupt, || {
                    analyzer.analyze(question, records)
                })
                .await?
            };

            // 2. 分析器判定研究已完成，跳过工具选择
            if analysis.is_complete {
                info!(session = %session.id, round = round_index, "分析器判定研究已完成");
                session.push_round(RoundRecord::completion(round_index, analysis.summary));
                return Ok(SessionStatus::Completed);
            }

            // 3. 根据缺口选择下一步工具调用
            let calls = {
                let selector = &self.collaborators.selector;
                let request = SelectionRequest {
                    question: session.question(),
                    mode: session.mode(),
                    budget: session.budget(),
                    round_index,
                    analysis_summary: &analysis.summary,
                    seen_source_ids: session.seen_source_ids(),
                    available_tools: &available_tools,
                };
                self.call_with_retry(FailureStage::Selection, interrupt, || {
                    selector.select(&request)
                })
                .await?
            };

            if calls.is_empty() {
                info!(session = %session.id, round = round_index, "没有可执行的工具调用，结束研究");
                session.push_round(RoundRecord::completion(round_index, analysis.summary));
                return Ok(SessionStatus::Completed);
            }

            // 4. 并发执行工具，单个工具失败按空结果处理
            let hits = interrupt
                .guard(self.execute_calls(&calls))
                .await
                .map_err(|e| interrupt_descriptor(e, 0))?;

            // 5. 来源去重并登记
            let new_source_ids = session
                .registry()
                .filter_new(hits.iter().map(|h| h.id.as_str()));
            session.registry_mut().record(&new_source_ids);
            let evidence = collect_evidence(&hits, &new_source_ids);

            info!(
                session = %session.id,
                round = round_index,
                tool_calls = calls.len(),
                returned = hits.len(),
                new_sources = new_source_ids.len(),
                "第 {} 轮研究完成",
                round_index
            );

            // 6. 记录本轮
            session.push_round(RoundRecord {
                round_index,
                tool_calls: calls,
                new_source_ids,
                analysis_summary: analysis.summary,
                is_complete: false,
                evidence,
            });

            // 7. 轮次预算是硬上限
            if session.budget_exhausted() {
                info!(session = %session.id, rounds = session.rounds_completed(), "轮次预算已耗尽");
                return Ok(SessionStatus::Exhausted);
            }
        }
    }

    /// 并发执行本轮所有工具调用，结果按选择顺序合并
    async fn execute_calls(&self, calls: &[ToolCall]) -> Vec<SourceHit> {
        let executor = &self.collaborators.executor;
        let futures = calls.iter().map(|call| async move {
            match executor.execute(&call.tool_name, &call.query).await {
                Ok(hits) => {
                    debug!(call = %call, hits = hits.len(), "工具调用完成");
                    hits
                }
                Err(e) => {
                    warn!(call = %call, error = %e, "工具调用失败，按空结果处理");
                    Vec::new()
                }
            }
        });

        do_parallel_with_limit(futures, self.options.max_parallels)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// 通用重试逻辑，失败后按指数退避重试，超过重试次数则返回错误描述
    async fn call_with_retry<T, F, Fut>(
        &self,
        stage: FailureStage,
        interrupt: &Interrupt,
        operation: F,
    ) -> Result<T, ErrorDescriptor>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ResearchError>>,
    {
        let max_retries = self.options.retry_attempts;
        let mut retries = 0;

        loop {
            match interrupt.guard(operation()).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(err)) => {
                    if retries >= max_retries {
                        return Err(ErrorDescriptor::new(stage, retries, &err));
                    }
                    retries += 1;
                    let delay = self.backoff_delay(retries);
                    warn!(
                        stage = %stage,
                        "调用出错，{:?} 后重试 (第 {} / {} 次重试): {}",
                        delay, retries, max_retries, err
                    );
                    interrupt
                        .guard(tokio::time::sleep(delay))
                        .await
                        .map_err(|e| interrupt_descriptor(e, retries))?;
                }
                Err(interrupted) => return Err(interrupt_descriptor(interrupted, retries)),
            }
        }
    }

    fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(self.options.retry_delay_ms.saturating_mul(factor))
    }
}

/// 取出每个新来源第一次出现时的标题与摘要
fn collect_evidence(hits: &[SourceHit], new_source_ids: &[String]) -> Vec<SourceHit> {
    let wanted: HashSet<&str> = new_source_ids.iter().map(String::as_str).collect();
    let mut taken = HashSet::new();
    let mut evidence = Vec::new();

    for hit in hits {
        let id = normalize(&hit.id);
        if wanted.contains(id.as_str()) && taken.insert(id.clone()) {
            evidence.push(SourceHit {
                id,
                title: hit.title.clone(),
                snippet: hit.snippet.clone(),
            });
        }
    }
    evidence
}

// Include tests
#[cfg(test)]
mod tests;
