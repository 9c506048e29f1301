use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::TriggerContext;
use crate::template::expand;
use crate::trigger::{OperationType, TriggerSystem, TriggerTiming};

/// Longest accepted hook name, in characters
pub const MAX_NAME_LENGTH: usize = 100;

/// Which upstream event activates a hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerCondition {
    pub system: TriggerSystem,
    pub operation: OperationType,
    #[serde(default)]
    pub timing: TriggerTiming,
    /// Declared by the configuration format; dispatch does not observe it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for_completion: Option<bool>,
}

impl TriggerCondition {
    pub fn after(system: TriggerSystem, operation: OperationType) -> Self {
        Self {
            system,
            operation,
            timing: TriggerTiming::After,
            wait_for_completion: None,
        }
    }
}

/// Persisted automation rule binding a trigger condition to an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hook {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub trigger: TriggerCondition,
    pub action: Action,
    /// Unix epoch milliseconds
    pub created_at: i64,
    pub modified_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed_at: Option<i64>,
    #[serde(default)]
    pub execution_count: u64,
}

impl Hook {
    pub fn matches(&self, system: TriggerSystem, operation: OperationType) -> bool {
        self.trigger.system == system && self.trigger.operation == operation
    }
}

/// Caller-supplied fields for a new hook; identity and timestamps are assigned on create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHook {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub trigger: TriggerCondition,
    pub action: Action,
}

fn default_enabled() -> bool {
    true
}

/// Partial update. `id`, `createdAt` and `executionCount` are accepted so that
/// whole-hook payloads deserialize, but they are stripped before merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_count: Option<u64>,
}

impl HookUpdate {
    /// Drop fields that are immutable after creation; returns true if any were present
    pub fn strip_immutable(&mut self) -> bool {
        let had_any =
            self.id.is_some() || self.created_at.is_some() || self.execution_count.is_some();
        self.id = None;
        self.created_at = None;
        self.execution_count = None;
        had_any
    }

    /// Apply onto a copy of `hook`
    pub fn merged_into(&self, hook: &Hook) -> Hook {
        let mut merged = hook.clone();
        if let Some(name) = &self.name {
            merged.name = name.clone();
        }
        if let Some(enabled) = self.enabled {
            merged.enabled = enabled;
        }
        if let Some(trigger) = &self.trigger {
            merged.trigger = trigger.clone();
        }
        if let Some(action) = &self.action {
            merged.action = action.clone();
        }
        merged
    }
}

/// Closed set of action kinds, tagged by `type` with kind-specific `parameters`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters")]
pub enum Action {
    #[serde(rename = "agent-command", alias = "agent")]
    AgentCommand(AgentCommandParams),
    #[serde(rename = "version-control", alias = "git")]
    VersionControl(VersionControlParams),
    #[serde(rename = "issue-tracker", alias = "github")]
    IssueTracker(IssueTrackerParams),
    #[serde(rename = "tool-server", alias = "mcp")]
    ToolServer(ToolServerParams),
    #[serde(rename = "custom-agent", alias = "custom")]
    CustomAgent(CustomAgentParams),
    #[serde(rename = "local-agent", alias = "acp")]
    LocalAgent(LocalAgentParams),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    AgentCommand,
    VersionControl,
    IssueTracker,
    ToolServer,
    CustomAgent,
    LocalAgent,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActionKind::AgentCommand => "agent-command",
            ActionKind::VersionControl => "version-control",
            ActionKind::IssueTracker => "issue-tracker",
            ActionKind::ToolServer => "tool-server",
            ActionKind::CustomAgent => "custom-agent",
            ActionKind::LocalAgent => "local-agent",
        })
    }
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::AgentCommand(_) => ActionKind::AgentCommand,
            Action::VersionControl(_) => ActionKind::VersionControl,
            Action::IssueTracker(_) => ActionKind::IssueTracker,
            Action::ToolServer(_) => ActionKind::ToolServer,
            Action::CustomAgent(_) => ActionKind::CustomAgent,
            Action::LocalAgent(_) => ActionKind::LocalAgent,
        }
    }

    /// Action kinds whose referenced server/tool must be re-checked before each run
    pub fn requires_reference_check(&self) -> bool {
        matches!(self, Action::ToolServer(_))
    }

    /// Copy of this action with every templated string expanded against `ctx`.
    /// Tool-server mappings are left for the parameter resolver.
    pub fn expand_templates(&self, ctx: &TriggerContext) -> Action {
        let opt = |s: &Option<String>| s.as_deref().map(|t| expand(t, ctx));
        match self {
            Action::AgentCommand(p) => Action::AgentCommand(AgentCommandParams {
                command: expand(&p.command, ctx),
            }),
            Action::VersionControl(p) => Action::VersionControl(VersionControlParams {
                message_template: opt(&p.message_template),
                branch_name: opt(&p.branch_name),
                tag_name: opt(&p.tag_name),
                ..p.clone()
            }),
            Action::IssueTracker(p) => Action::IssueTracker(IssueTrackerParams {
                title_template: opt(&p.title_template),
                body_template: opt(&p.body_template),
                ..p.clone()
            }),
            Action::ToolServer(p) => Action::ToolServer(p.clone()),
            Action::CustomAgent(p) => Action::CustomAgent(CustomAgentParams {
                arguments: opt(&p.arguments),
                ..p.clone()
            }),
            Action::LocalAgent(p) => Action::LocalAgent(LocalAgentParams {
                task_instruction: expand(&p.task_instruction, ctx),
                ..p.clone()
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCommandParams {
    /// Slash-style command, e.g. `/speckit.clarify`
    #[serde(default)]
    pub command: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionControlOperation {
    Commit,
    Push,
    CreateBranch,
    Tag,
    Stash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionControlParams {
    pub operation: VersionControlOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    /// Push after a successful commit or tag
    #[serde(default)]
    pub push_to_remote: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueTrackerOperation {
    OpenIssue,
    CloseIssue,
    CreatePr,
    AddComment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTrackerParams {
    pub operation: IssueTrackerOperation,
    /// `owner/name`; the current repository is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingSource {
    /// Value is a path into the trigger context, e.g. `feature` or `metadata.specPath`
    Context,
    /// Value is used as-is, coerced to the tool's declared parameter type
    Literal,
    /// Value is a `{placeholder}` template
    Template,
}

/// How to derive one tool-call argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterMapping {
    pub tool_param: String,
    pub source: MappingSource,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedTool {
    #[serde(default)]
    pub server_id: String,
    #[serde(default)]
    pub tool_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolServerParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_tools: Vec<SelectedTool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameter_mappings: Vec<ParameterMapping>,
    /// Per-call timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// One concrete server/tool call derived from `ToolServerParams`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolTarget {
    pub server_id: String,
    pub tool_name: String,
    /// Field path prefix used when reporting errors about this target
    pub field_prefix: String,
}

impl ToolServerParams {
    /// The explicit `serverId`/`toolName` pair wins; otherwise every selected tool, in order
    pub fn targets(&self) -> Vec<ToolTarget> {
        if self.server_id.is_some() || self.tool_name.is_some() {
            return vec![ToolTarget {
                server_id: self.server_id.clone().unwrap_or_default(),
                tool_name: self.tool_name.clone().unwrap_or_default(),
                field_prefix: "action.parameters".to_string(),
            }];
        }
        self.selected_tools
            .iter()
            .enumerate()
            .map(|(i, t)| ToolTarget {
                server_id: t.server_id.clone(),
                tool_name: t.tool_name.clone(),
                field_prefix: format!("action.parameters.selectedTools[{}]", i),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Local,
    Background,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomAgentParams {
    #[serde(default)]
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<AgentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalAgentParams {
    /// Command line that starts the agent, e.g. `gemini --experimental-acp`
    #[serde(default)]
    pub agent_command: String,
    #[serde(default)]
    pub task_instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}
