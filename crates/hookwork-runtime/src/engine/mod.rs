mod adapter;
mod executor;
mod log;

pub use adapter::{ActionAdapter, ActionAdapters, ActionOutcome, ActionOutput};
pub use executor::{EngineEvent, HookEngine, DEFAULT_ACTION_TIMEOUT};
pub use log::{ExecutionLog, ExecutionResult, ExecutionStatus, DEFAULT_LOG_CAPACITY};
