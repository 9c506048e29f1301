pub mod hook;
pub mod manager;
pub mod migration;
pub mod validation;

pub use hook::{
    Action, ActionKind, AgentCommandParams, AgentType, CustomAgentParams, Hook, HookUpdate,
    IssueTrackerOperation, IssueTrackerParams, LocalAgentParams, MappingSource, NewHook,
    ParameterMapping, SelectedTool, ToolServerParams, ToolTarget, TriggerCondition,
    VersionControlOperation, VersionControlParams, MAX_NAME_LENGTH,
};
pub use manager::{HookChange, HookManager, HOOKS_STORAGE_KEY};
pub use validation::{HookValidator, ValidationReport};
