pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod host;
pub mod storage;
pub mod template;
pub mod trigger;

pub use config::{load_config, HookworkConfig};
pub use context::{build_trigger_context, ExecutionContext, TriggerContext, MAX_CHAIN_DEPTH};
pub use engine::{
    ActionAdapter, ActionAdapters, ActionOutcome, ActionOutput, EngineEvent, ExecutionLog,
    ExecutionResult, ExecutionStatus, HookEngine,
};
pub use error::{EntityKind, ExecutionError, FieldError, HookError, TimeoutPhase};
pub use hooks::{Action, ActionKind, Hook, HookChange, HookManager, HookUpdate, HookValidator, NewHook};
pub use host::{
    AgentRegistry, ChatHost, IssueTracker, LogNotifier, Notifier, RecoveryChoice, ToolCatalog,
    VersionControl,
};
pub use storage::{MemoryStore, StateStore, Storage};
pub use trigger::{
    OperationType, TriggerEvent, TriggerOutput, TriggerRegistry, TriggerSystem, TriggerTiming,
};

/// Initialize structured JSON logging on stderr; stdout carries command output
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}
