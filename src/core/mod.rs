//! 核心编排层：错误分类、交换状态机、编排器、流式会话控制、工具并发池

pub mod error;
pub mod exchange;
pub mod orchestrator;
pub mod stream;
pub mod task_scheduler;

pub use error::{ChatError, APOLOGY_MESSAGE};
pub use exchange::{Exchange, ExchangePhase};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, Report, RetrievalAnswer};
pub use stream::{StreamOutcome, StreamSession};
pub use task_scheduler::TaskScheduler;
