// 轮次化深度研究
// Mode Policy：按模式查预算，或根据问题自动选择模式
// Source Registry：会话内来源去重
// Round Controller：分析 → 选择工具 → 执行 → 去重登记 → 记录，直到完成或预算耗尽
// Service：面向调用方的请求/响应边界

pub mod collaborators;
pub mod controller;
pub mod mode;
pub mod registry;
pub mod service;
pub mod session;

pub use collaborators::{
    Analysis, Analyzer, Collaborators, SelectionRequest, Synthesizer, ToolExecutor, ToolSelector,
    ToolSpec,
};
pub use controller::{ControllerOptions, RoundController, SessionOutcome};
pub use mode::{ModeBudget, ResearchMode, resolve_budget, select_mode};
pub use registry::{SourceRegistry, normalize};
pub use service::{ResearchRequest, ResearchResponse, ResearchService};
pub use session::{ResearchSession, RoundRecord, SessionStatus, SourceHit, ToolCall};
