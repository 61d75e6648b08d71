use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{ControllerOptions, RoundController};
use crate::error::{ErrorKind, FailureStage, ResearchError};
use crate::research::collaborators::{
    Analysis, Analyzer, Collaborators, SelectionRequest, Synthesizer, ToolExecutor, ToolSelector,
    ToolSpec,
};
use crate::research::mode::ResearchMode;
use crate::research::session::{RoundRecord, SessionStatus, SourceHit, ToolCall};

type AnalyzeFn = dyn Fn(usize, &[RoundRecord]) -> Result<Analysis, ResearchError> + Send + Sync;
type SelectFn = dyn Fn(usize, &SelectionRequest<'_>) -> Result<Vec<ToolCall>, ResearchError> + Send + Sync;
type ExecuteFn = dyn Fn(&str, &str) -> Result<Vec<SourceHit>, ResearchError> + Send + Sync;

struct FnAnalyzer {
    calls: AtomicUsize,
    f: Box<AnalyzeFn>,
}

#[async_trait]
impl Analyzer for FnAnalyzer {
    async fn analyze(
        &self,
        _question: &str,
        records: &[RoundRecord],
    ) -> Result<Analysis, ResearchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.f)(n, records)
    }
}

struct FnSelector {
    calls: AtomicUsize,
    requests: Mutex<Vec<(u32, Vec<String>, u32, usize)>>,
    f: Box<SelectFn>,
}

#[async_trait]
impl ToolSelector for FnSelector {
    async fn select(&self, request: &SelectionRequest<'_>) -> Result<Vec<ToolCall>, ResearchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push((
            request.round_index,
            request.seen_source_ids.to_vec(),
            request.budget.sources_per_round,
            request.available_tools.len(),
        ));
        (self.f)(n, request)
    }
}

struct FnExecutor {
    delay: Option<Duration>,
    f: Box<ExecuteFn>,
}

#[async_trait]
impl ToolExecutor for FnExecutor {
    fn available_tools(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::new("web_search", "web"),
            ToolSpec::new("wikipedia", "encyclopedia"),
        ]
    }

    async fn execute(&self, tool_name: &str, query: &str) -> Result<Vec<SourceHit>, ResearchError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        // 让 "slow" 查询晚于后选的查询返回
        if query.starts_with("slow") {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        (self.f)(tool_name, query)
    }
}

#[derive(Default)]
struct RecordingSynthesizer {
    fail: bool,
    received: Mutex<Vec<Vec<RoundRecord>>>,
}

impl RecordingSynthesizer {
    fn calls(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl Synthesizer for RecordingSynthesizer {
    async fn synthesize(
        &self,
        question: &str,
        records: &[RoundRecord],
    ) -> Result<String, ResearchError> {
        self.received.lock().unwrap().push(records.to_vec());
        if self.fail {
            Err(ResearchError::SynthesisUnavailable("provider down".to_string()))
        } else {
            Ok(format!("answer to {question} from {} rounds", records.len()))
        }
    }
}

struct Harness {
    analyzer: Arc<FnAnalyzer>,
    selector: Arc<FnSelector>,
    synthesizer: Arc<RecordingSynthesizer>,
    controller: RoundController,
}

fn options() -> ControllerOptions {
    ControllerOptions {
        retry_attempts: 2,
        retry_delay_ms: 0,
        max_parallels: 4,
        enforce_wall_clock: false,
    }
}

fn harness(
    analyze: impl Fn(usize, &[RoundRecord]) -> Result<Analysis, ResearchError> + Send + Sync + 'static,
    select: impl Fn(usize, &SelectionRequest<'_>) -> Result<Vec<ToolCall>, ResearchError>
    + Send
    + Sync
    + 'static,
    execute: impl Fn(&str, &str) -> Result<Vec<SourceHit>, ResearchError> + Send + Sync + 'static,
) -> Harness {
    harness_with(options(), None, false, analyze, select, execute)
}

fn harness_with(
    options: ControllerOptions,
    executor_delay: Option<Duration>,
    synthesis_fails: bool,
    analyze: impl Fn(usize, &[RoundRecord]) -> Result<Analysis, ResearchError> + Send + Sync + 'static,
    select: impl Fn(usize, &SelectionRequest<'_>) -> Result<Vec<ToolCall>, ResearchError>
    + Send
    + Sync
    + 'static,
    execute: impl Fn(&str, &str) -> Result<Vec<SourceHit>, ResearchError> + Send + Sync + 'static,
) -> Harness {
    let analyzer = Arc::new(FnAnalyzer {
        calls: AtomicUsize::new(0),
        f: Box::new(analyze),
    });
    let selector = Arc::new(FnSelector {
        calls: AtomicUsize::new(0),
        requests: Mutex::new(Vec::new()),
        f: Box::new(select),
    });
    let executor = Arc::new(FnExecutor {
        delay: executor_delay,
        f: Box::new(execute),
    });
    let synthesizer = Arc::new(RecordingSynthesizer {
        fail: synthesis_fails,
        ..Default::default()
    });

    let collaborators = Collaborators::new(
        analyzer.clone(),
        selector.clone(),
        executor,
        synthesizer.clone(),
    );

    Harness {
        analyzer,
        selector,
        synthesizer,
        controller: RoundController::new(collaborators, options),
    }
}

fn never_complete(n: usize, _: &[RoundRecord]) -> Result<Analysis, ResearchError> {
    Ok(Analysis::incomplete(format!("gap #{n}")))
}

fn one_search(n: usize, _: &SelectionRequest<'_>) -> Result<Vec<ToolCall>, ResearchError> {
    Ok(vec![ToolCall::new("web_search", format!("query {n}"))])
}

fn url_per_query(_tool: &str, query: &str) -> Result<Vec<SourceHit>, ResearchError> {
    let slug = query.replace(' ', "-");
    Ok(vec![SourceHit::new(format!("https://example.com/{slug}")).with_title(query)])
}

#[tokio::test]
async fn test_instant_completes_immediately() {
    let h = harness(
        |_, _| Ok(Analysis::complete("AI is well known")),
        one_search,
        url_per_query,
    );

    let outcome = h.controller.run("What is AI?", ResearchMode::Instant).await;

    assert_eq!(outcome.session.status(), SessionStatus::Completed);
    assert_eq!(outcome.session.round_records().len(), 1);
    let record = &outcome.session.round_records()[0];
    assert!(record.is_complete);
    assert!(record.tool_calls.is_empty());
    assert!(record.new_source_ids.is_empty());
    assert_eq!(record.round_index, 1);
    assert_eq!(h.selector.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.synthesizer.calls(), 1);
    assert_eq!(h.synthesizer.received.lock().unwrap()[0].len(), 1);
    assert!(outcome.final_answer.is_some());
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn test_quick_exhausts_round_budget() {
    let h = harness(never_complete, one_search, url_per_query);

    let outcome = h.controller.run("Why is the sky blue?", ResearchMode::Quick).await;

    assert_eq!(outcome.session.status(), SessionStatus::Exhausted);
    assert_eq!(outcome.session.rounds_completed(), 2);
    let received = h.synthesizer.received.lock().unwrap();
    assert_eq!(received.len(), 1);
    let indexes: Vec<u32> = received[0].iter().map(|r| r.round_index).collect();
    assert_eq!(indexes, vec![1, 2]);
    assert!(received[0].iter().all(|r| !r.is_complete));
    assert_eq!(
        outcome.final_answer.as_deref(),
        Some("answer to Why is the sky blue? from 2 rounds")
    );
}

#[tokio::test]
async fn test_round_budget_is_hard_ceiling_for_every_mode() {
    for mode in ResearchMode::ALL {
        let h = harness(never_complete, one_search, url_per_query);
        let outcome = h.controller.run("q", mode).await;

        assert_eq!(outcome.session.status(), SessionStatus::Exhausted);
        assert_eq!(outcome.session.rounds_completed(), mode.max_rounds());
        assert_eq!(
            h.selector.calls.load(Ordering::SeqCst),
            mode.max_rounds() as usize
        );
    }
}

#[tokio::test]
async fn test_empty_selection_completes_early() {
    let h = harness(never_complete, |_, _| Ok(Vec::new()), url_per_query);

    let outcome = h.controller.run("q", ResearchMode::Standard).await;

    assert_eq!(outcome.session.status(), SessionStatus::Completed);
    assert_eq!(outcome.session.rounds_completed(), 1);
    assert!(outcome.session.round_records()[0].is_complete);
    assert_eq!(outcome.session.round_records()[0].analysis_summary, "gap #0");
    assert_eq!(h.synthesizer.calls(), 1);
}

#[tokio::test]
async fn test_analysis_failure_fails_session_without_synthesis() {
    let h = harness(
        |_, _| Err(ResearchError::AnalysisUnavailable("timeout".to_string())),
        one_search,
        url_per_query,
    );

    let outcome = h.controller.run("q", ResearchMode::Deep).await;

    assert_eq!(outcome.session.status(), SessionStatus::Failed);
    assert!(outcome.session.round_records().is_empty());
    assert!(outcome.final_answer.is_none());
    let error = outcome.error.expect("error descriptor");
    assert_eq!(error.kind, ErrorKind::AnalysisUnavailable);
    assert_eq!(error.stage, FailureStage::Analysis);
    assert_eq!(error.retries, 2);
    assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.synthesizer.calls(), 0);
}

#[tokio::test]
async fn test_transient_analysis_failure_is_retried() {
    let h = harness(
        |n, records| match n {
            0 => Err(ResearchError::AnalysisUnavailable("malformed".to_string())),
            _ if records.is_empty() => Ok(Analysis::incomplete("need sources")),
            _ => Ok(Analysis::complete("enough")),
        },
        one_search,
        url_per_query,
    );

    let outcome = h.controller.run("q", ResearchMode::Standard).await;

    assert_eq!(outcome.session.status(), SessionStatus::Completed);
    assert_eq!(outcome.session.rounds_completed(), 2);
    assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_selection_failure_preserves_partial_rounds() {
    let h = harness(
        never_complete,
        |n, _| match n {
            0 => Ok(vec![ToolCall::new("web_search", "first")]),
            _ => Err(ResearchError::SelectionUnavailable("quota".to_string())),
        },
        url_per_query,
    );

    let outcome = h.controller.run("q", ResearchMode::Standard).await;

    assert_eq!(outcome.session.status(), SessionStatus::Failed);
    assert_eq!(outcome.session.round_records().len(), 1);
    let error = outcome.error.unwrap();
    assert_eq!(error.kind, ErrorKind::SelectionUnavailable);
    assert_eq!(error.stage, FailureStage::Selection);
    // 第一轮成功 1 次，第二轮首次调用加 2 次重试
    assert_eq!(h.selector.calls.load(Ordering::SeqCst), 4);
    assert_eq!(h.synthesizer.calls(), 0);
}

#[tokio::test]
async fn test_synthesis_failure_fails_session() {
    let h = harness_with(
        options(),
        None,
        true,
        |_, _| Ok(Analysis::complete("done")),
        one_search,
        url_per_query,
    );

    let outcome = h.controller.run("q", ResearchMode::Quick).await;

    assert_eq!(outcome.session.status(), SessionStatus::Failed);
    assert_eq!(outcome.session.round_records().len(), 1);
    let error = outcome.error.unwrap();
    assert_eq!(error.kind, ErrorKind::SynthesisUnavailable);
    assert_eq!(error.stage, FailureStage::Synthesis);
    assert_eq!(h.synthesizer.calls(), 3);
}

#[tokio::test]
async fn test_partial_tool_failure_is_isolated() {
    let h = harness(
        |n, _| match n {
            0 => Ok(Analysis::incomplete("need three angles")),
            _ => Ok(Analysis::complete("covered")),
        },
        |_, _| {
            Ok(vec![
                ToolCall::new("web_search", "alpha"),
                ToolCall::new("broken", "beta"),
                ToolCall::new("wikipedia", "gamma"),
            ])
        },
        |tool, query| match tool {
            "broken" => Err(ResearchError::ToolExecutionError {
                tool: tool.to_string(),
                message: "503".to_string(),
            }),
            _ => url_per_query(tool, query),
        },
    );

    let outcome = h.controller.run("q", ResearchMode::Standard).await;

    assert_eq!(outcome.session.status(), SessionStatus::Completed);
    let first = &outcome.session.round_records()[0];
    assert_eq!(first.tool_calls.len(), 3);
    assert_eq!(
        first.new_source_ids,
        vec![
            "https://example.com/alpha".to_string(),
            "https://example.com/gamma".to_string()
        ]
    );
    assert_eq!(first.evidence.len(), 2);
    assert_eq!(first.evidence[0].title.as_deref(), Some("alpha"));
}

#[tokio::test]
async fn test_sources_are_deduplicated_across_rounds() {
    let h = harness(
        never_complete,
        |_, _| Ok(vec![ToolCall::new("web_search", "same")]),
        |_, _| {
            Ok(vec![
                SourceHit::new("https://Example.com/a?utm_source=feed"),
                SourceHit::new("https://example.com/a/"),
            ])
        },
    );

    let outcome = h.controller.run("q", ResearchMode::Quick).await;

    let records = outcome.session.round_records();
    assert_eq!(records[0].new_source_ids, vec!["https://example.com/a".to_string()]);
    assert!(records[1].new_source_ids.is_empty());
    assert_eq!(outcome.session.seen_source_ids().len(), 1);

    // 第二轮的选择请求能看到第一轮登记的来源
    let requests = h.selector.requests.lock().unwrap();
    assert!(requests[0].1.is_empty());
    assert_eq!(requests[1].1, vec!["https://example.com/a".to_string()]);
    assert_eq!(requests[1].0, 2);
    assert_eq!(requests[1].2, 20);
    assert_eq!(requests[1].3, 2);
}

#[tokio::test]
async fn test_source_budget_is_advisory() {
    let h = harness(never_complete, one_search, |_, _| {
        Ok((0..25)
            .map(|i| SourceHit::new(format!("https://example.com/{i}")))
            .collect())
    });

    let outcome = h.controller.run("q", ResearchMode::Instant).await;

    assert_eq!(outcome.session.status(), SessionStatus::Exhausted);
    assert_eq!(outcome.session.seen_source_ids().len(), 25);
}

#[tokio::test]
async fn test_merge_order_follows_selection_order() {
    let h = harness(
        |_, _| Ok(Analysis::incomplete("gap")),
        |_, _| {
            Ok(vec![
                ToolCall::new("web_search", "slow"),
                ToolCall::new("web_search", "fast"),
            ])
        },
        url_per_query,
    );

    let first = h.controller.run("q", ResearchMode::Instant).await;
    let second = h.controller.run("q", ResearchMode::Instant).await;

    assert_eq!(
        first.session.round_records()[0].new_source_ids,
        vec![
            "https://example.com/slow".to_string(),
            "https://example.com/fast".to_string()
        ]
    );
    assert_eq!(first.session.round_records(), second.session.round_records());
}

#[tokio::test]
async fn test_cancelled_session_skips_synthesis() {
    let h = harness_with(
        options(),
        Some(Duration::from_secs(30)),
        false,
        never_complete,
        one_search,
        url_per_query,
    );

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let outcome = h
        .controller
        .run_with_cancel("q", ResearchMode::Deep, token)
        .await;

    assert_eq!(outcome.session.status(), SessionStatus::Failed);
    assert!(outcome.session.round_records().is_empty());
    let error = outcome.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Cancelled);
    assert_eq!(error.stage, FailureStage::Cancelled);
    assert_eq!(h.synthesizer.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_wall_clock_deadline_when_enforced() {
    let h = harness_with(
        ControllerOptions {
            enforce_wall_clock: true,
            ..options()
        },
        Some(Duration::from_secs(120)),
        false,
        never_complete,
        one_search,
        url_per_query,
    );

    let outcome = h.controller.run("q", ResearchMode::Instant).await;

    assert_eq!(outcome.session.status(), SessionStatus::Failed);
    let error = outcome.error.unwrap();
    assert_eq!(error.kind, ErrorKind::DeadlineExceeded);
    assert_eq!(error.stage, FailureStage::Deadline);
    assert_eq!(h.synthesizer.calls(), 0);
}

#[test]
fn test_backoff_doubles() {
    let h = harness(never_complete, one_search, url_per_query);
    let controller = RoundController::new(
        h.controller.collaborators.clone(),
        ControllerOptions {
            retry_delay_ms: 100,
            ..options()
        },
    );
    assert_eq!(controller.backoff_delay(1), Duration::from_millis(100));
    assert_eq!(controller.backoff_delay(2), Duration::from_millis(200));
    assert_eq!(controller.backoff_delay(3), Duration::from_millis(400));
}
