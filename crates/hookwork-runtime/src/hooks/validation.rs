//! Cumulative hook validation: structure, name, per-action fields, then
//! best-effort reference checks against the tool catalog and agent registry.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::hook::{
    Action, Hook, IssueTrackerOperation, IssueTrackerParams, MappingSource, ToolServerParams,
    VersionControlOperation, VersionControlParams, MAX_NAME_LENGTH,
};
use crate::error::{FieldError, HookError};
use crate::host::{AgentRegistry, ToolCatalog};

const MIN_TOOL_TIMEOUT_MS: u64 = 1_000;
const MAX_TOOL_TIMEOUT_MS: u64 = 300_000;

/// Outcome of `HookValidator::validate`; collects every problem found
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn has_error_for(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    pub fn into_result(self) -> Result<(), HookError> {
        if self.valid {
            Ok(())
        } else {
            Err(HookError::Validation {
                errors: self.errors,
            })
        }
    }
}

#[derive(Clone, Default)]
pub struct HookValidator {
    tools: Option<Arc<dyn ToolCatalog>>,
    agents: Option<Arc<dyn AgentRegistry>>,
}

impl HookValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool_catalog(mut self, tools: Arc<dyn ToolCatalog>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_agent_registry(mut self, agents: Arc<dyn AgentRegistry>) -> Self {
        self.agents = Some(agents);
        self
    }

    /// Run every stage and collect all errors
    pub async fn validate(&self, hook: &Hook) -> ValidationReport {
        let mut errors = validate_structure(hook);
        errors.extend(validate_name(&hook.name));
        let action_errors = validate_action(&hook.action);
        let action_ok = action_errors.is_empty();
        errors.extend(action_errors);
        // References are only meaningful once the referencing fields are filled in
        if action_ok {
            errors.extend(self.validate_references(&hook.action).await);
        }
        ValidationReport::from_errors(errors)
    }

    /// Confirm referenced servers, tools and agents exist. Lookups that fail
    /// because the collaborator is unreachable are logged and treated as valid.
    pub async fn validate_references(&self, action: &Action) -> Vec<FieldError> {
        match action {
            Action::ToolServer(params) => self.check_tool_references(params).await,
            Action::CustomAgent(params) => {
                let Some(agents) = &self.agents else {
                    return Vec::new();
                };
                match agents.get_agent_by_id(&params.agent_id).await {
                    Ok(Some(_)) => Vec::new(),
                    Ok(None) => vec![FieldError::new(
                        "action.parameters.agentId",
                        format!(
                            "Agent '{}' was not found. Select an existing agent or remove this hook.",
                            params.agent_id
                        ),
                    )],
                    Err(e) => {
                        warn!(agent_id = %params.agent_id, error = %e, "Agent registry unreachable; skipping reference check");
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        }
    }

    async fn check_tool_references(&self, params: &ToolServerParams) -> Vec<FieldError> {
        let Some(tools) = &self.tools else {
            return Vec::new();
        };
        let mut errors = Vec::new();

        for target in params.targets() {
            match tools.get_server(&target.server_id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    errors.push(FieldError::new(
                        format!("{}.serverId", target.field_prefix),
                        format!(
                            "Tool server '{}' was not found. Select an available server or remove this hook.",
                            target.server_id
                        ),
                    ));
                    continue;
                }
                Err(e) => {
                    warn!(server_id = %target.server_id, error = %e, "Tool discovery unreachable; skipping reference check");
                    continue;
                }
            }

            match tools.get_tool(&target.server_id, &target.tool_name).await {
                Ok(Some(_)) => {}
                Ok(None) => errors.push(FieldError::new(
                    format!("{}.toolName", target.field_prefix),
                    format!(
                        "Tool '{}' is not provided by server '{}'. Select another tool or remove this hook.",
                        target.tool_name, target.server_id
                    ),
                )),
                Err(e) => {
                    warn!(server_id = %target.server_id, tool = %target.tool_name, error = %e, "Tool lookup unreachable; skipping reference check");
                }
            }
        }

        errors
    }
}

/// Shape checks on identity and timestamps
pub fn validate_structure(hook: &Hook) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if hook.id.trim().is_empty() {
        errors.push(FieldError::new("id", "Hook id is required"));
    }
    if hook.created_at <= 0 {
        errors.push(FieldError::new("createdAt", "Creation time must be positive"));
    }
    if hook.modified_at < hook.created_at {
        errors.push(FieldError::new(
            "modifiedAt",
            "Modification time cannot precede creation time",
        ));
    }
    errors
}

pub fn validate_name(name: &str) -> Vec<FieldError> {
    if name.trim().is_empty() {
        return vec![FieldError::new("name", "Name is required")];
    }
    let len = name.chars().count();
    if len > MAX_NAME_LENGTH {
        return vec![FieldError::new(
            "name",
            format!("Name must be at most {} characters (got {})", MAX_NAME_LENGTH, len),
        )];
    }
    Vec::new()
}

/// Required-field checks specific to each action kind
pub fn validate_action(action: &Action) -> Vec<FieldError> {
    let mut errors = Vec::new();
    match action {
        Action::AgentCommand(p) => {
            let command = p.command.trim();
            if command.is_empty() {
                errors.push(FieldError::new("action.parameters.command", "Command is required"));
            } else if !command.starts_with('/') {
                errors.push(FieldError::new(
                    "action.parameters.command",
                    "Command must start with '/', e.g. /speckit.clarify",
                ));
            }
        }
        Action::VersionControl(p) => validate_version_control(p, &mut errors),
        Action::IssueTracker(p) => validate_issue_tracker(p, &mut errors),
        Action::ToolServer(p) => validate_tool_server(p, &mut errors),
        Action::CustomAgent(p) => {
            if p.agent_id.trim().is_empty() {
                errors.push(FieldError::new("action.parameters.agentId", "Agent is required"));
            }
        }
        Action::LocalAgent(p) => {
            if p.agent_command.trim().is_empty() {
                errors.push(FieldError::new(
                    "action.parameters.agentCommand",
                    "Agent command is required",
                ));
            }
            if p.task_instruction.trim().is_empty() {
                errors.push(FieldError::new(
                    "action.parameters.taskInstruction",
                    "Task instruction is required",
                ));
            }
        }
    }
    errors
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}

fn validate_version_control(p: &VersionControlParams, errors: &mut Vec<FieldError>) {
    match p.operation {
        VersionControlOperation::Commit if is_blank(&p.message_template) => {
            errors.push(FieldError::new(
                "action.parameters.messageTemplate",
                "Commit message is required",
            ));
        }
        VersionControlOperation::CreateBranch if is_blank(&p.branch_name) => {
            errors.push(FieldError::new(
                "action.parameters.branchName",
                "Branch name is required",
            ));
        }
        VersionControlOperation::Tag if is_blank(&p.tag_name) => {
            errors.push(FieldError::new("action.parameters.tagName", "Tag name is required"));
        }
        _ => {}
    }
}

fn validate_issue_tracker(p: &IssueTrackerParams, errors: &mut Vec<FieldError>) {
    if let Some(repo) = &p.repository {
        let valid = repo
            .split_once('/')
            .map(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
            .unwrap_or(false);
        if !valid {
            errors.push(FieldError::new(
                "action.parameters.repository",
                "Repository must be in 'owner/name' form",
            ));
        }
    }

    let needs_title = matches!(
        p.operation,
        IssueTrackerOperation::OpenIssue | IssueTrackerOperation::CreatePr
    );
    if needs_title && is_blank(&p.title_template) {
        errors.push(FieldError::new("action.parameters.titleTemplate", "Title is required"));
    }

    let needs_number = matches!(
        p.operation,
        IssueTrackerOperation::CloseIssue | IssueTrackerOperation::AddComment
    );
    if needs_number && p.issue_number.is_none() {
        errors.push(FieldError::new(
            "action.parameters.issueNumber",
            "Issue number is required",
        ));
    }

    if p.operation == IssueTrackerOperation::AddComment && is_blank(&p.body_template) {
        errors.push(FieldError::new(
            "action.parameters.bodyTemplate",
            "Comment body is required",
        ));
    }
}

fn validate_tool_server(p: &ToolServerParams, errors: &mut Vec<FieldError>) {
    let targets = p.targets();
    if targets.is_empty() {
        errors.push(FieldError::new(
            "action.parameters.serverId",
            "Select a tool server and tool",
        ));
    }
    for target in &targets {
        if target.server_id.trim().is_empty() {
            errors.push(FieldError::new(
                format!("{}.serverId", target.field_prefix),
                "Server is required",
            ));
        }
        if target.tool_name.trim().is_empty() {
            errors.push(FieldError::new(
                format!("{}.toolName", target.field_prefix),
                "Tool is required",
            ));
        }
    }

    let mut seen = HashSet::new();
    for (i, mapping) in p.parameter_mappings.iter().enumerate() {
        let field = format!("action.parameters.parameterMappings[{}]", i);
        if mapping.tool_param.trim().is_empty() {
            errors.push(FieldError::new(
                format!("{}.toolParam", field),
                "Parameter name is required",
            ));
        } else if !seen.insert(mapping.tool_param.as_str()) {
            errors.push(FieldError::new(
                format!("{}.toolParam", field),
                format!("Parameter '{}' is mapped more than once", mapping.tool_param),
            ));
        }
        if mapping.source == MappingSource::Context && mapping.value.trim().is_empty() {
            errors.push(FieldError::new(
                format!("{}.value", field),
                "Context variable name is required",
            ));
        }
    }

    if let Some(timeout) = p.timeout {
        if !(MIN_TOOL_TIMEOUT_MS..=MAX_TOOL_TIMEOUT_MS).contains(&timeout) {
            errors.push(FieldError::new(
                "action.parameters.timeout",
                format!(
                    "Timeout must be between {} and {} ms",
                    MIN_TOOL_TIMEOUT_MS, MAX_TOOL_TIMEOUT_MS
                ),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::hook::{
        AgentCommandParams, CustomAgentParams, ParameterMapping, TriggerCondition,
    };
    use crate::host::{AgentAvailability, AgentInfo, ParameterCheck, ToolCallResult, ToolInfo, ToolServerInfo, ServerStatus};
    use crate::trigger::{OperationType, TriggerSystem};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::Value;

    fn hook(name: &str, action: Action) -> Hook {
        Hook {
            id: "h1".into(),
            name: name.into(),
            enabled: true,
            trigger: TriggerCondition::after(TriggerSystem::Speckit, OperationType::Specify),
            action,
            created_at: 1,
            modified_at: 1,
            last_executed_at: None,
            execution_count: 0,
        }
    }

    /// Catalog that knows server "github" with tool "create_issue", or is unreachable
    struct Catalog {
        reachable: bool,
    }

    #[async_trait]
    impl ToolCatalog for Catalog {
        async fn discover_servers(&self, _force: bool) -> anyhow::Result<Vec<ToolServerInfo>> {
            Ok(vec![])
        }
        async fn get_server(&self, id: &str) -> anyhow::Result<Option<ToolServerInfo>> {
            if !self.reachable {
                return Err(anyhow!("discovery offline"));
            }
            Ok((id == "github").then(|| ToolServerInfo {
                id: id.into(),
                name: "GitHub".into(),
                status: ServerStatus::Available,
                tools: vec![],
            }))
        }
        async fn get_tool(&self, _s: &str, tool: &str) -> anyhow::Result<Option<ToolInfo>> {
            Ok((tool == "create_issue").then(|| ToolInfo {
                name: tool.into(),
                description: String::new(),
                input_schema: Value::Null,
            }))
        }
        async fn validate_parameters(&self, _s: &str, _t: &str, _a: &Value) -> anyhow::Result<ParameterCheck> {
            Ok(ParameterCheck { valid: true, errors: vec![] })
        }
        async fn execute_tool(&self, _s: &str, _t: &str, _a: Value, _ms: u64) -> anyhow::Result<ToolCallResult> {
            Ok(ToolCallResult::default())
        }
    }

    struct Agents;

    #[async_trait]
    impl AgentRegistry for Agents {
        async fn get_agent_by_id(&self, id: &str) -> anyhow::Result<Option<AgentInfo>> {
            Ok((id == "reviewer").then(|| AgentInfo {
                id: id.into(),
                name: "Reviewer".into(),
                description: String::new(),
                source_path: None,
            }))
        }
        async fn check_agent_availability(&self, _id: &str) -> anyhow::Result<AgentAvailability> {
            Ok(AgentAvailability { available: true, reason: None })
        }
    }

    fn tool_action(server: &str, tool: &str) -> Action {
        Action::ToolServer(ToolServerParams {
            server_id: Some(server.into()),
            tool_name: Some(tool.into()),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_errors_are_cumulative() {
        let mut h = hook("", Action::AgentCommand(AgentCommandParams { command: String::new() }));
        h.id = String::new();
        let report = HookValidator::new().validate(&h).await;
        assert!(!report.valid);
        assert!(report.has_error_for("id"));
        assert!(report.has_error_for("name"));
        assert!(report.has_error_for("action.parameters.command"));
    }

    #[tokio::test]
    async fn test_name_length_bound() {
        let long = "x".repeat(MAX_NAME_LENGTH + 1);
        assert_eq!(validate_name(&long).len(), 1);
        assert!(validate_name(&"x".repeat(MAX_NAME_LENGTH)).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_server_names_field() {
        let validator = HookValidator::new().with_tool_catalog(Arc::new(Catalog { reachable: true }));
        let report = validator.validate(&hook("T", tool_action("jira", "create_issue"))).await;
        assert!(!report.valid);
        assert!(report.has_error_for("action.parameters.serverId"));
        assert!(report.errors[0].message.contains("jira"));
    }

    #[tokio::test]
    async fn test_unknown_tool_names_field() {
        let validator = HookValidator::new().with_tool_catalog(Arc::new(Catalog { reachable: true }));
        let report = validator.validate(&hook("T", tool_action("github", "delete_repo"))).await;
        assert!(report.has_error_for("action.parameters.toolName"));
    }

    #[tokio::test]
    async fn test_unreachable_discovery_degrades_to_valid() {
        let validator = HookValidator::new().with_tool_catalog(Arc::new(Catalog { reachable: false }));
        let report = validator.validate(&hook("T", tool_action("jira", "x"))).await;
        assert!(report.valid);
    }

    #[tokio::test]
    async fn test_unknown_agent_reported() {
        let validator = HookValidator::new().with_agent_registry(Arc::new(Agents));
        let action = Action::CustomAgent(CustomAgentParams {
            agent_id: "ghost".into(),
            ..Default::default()
        });
        let report = validator.validate(&hook("A", action)).await;
        assert!(report.has_error_for("action.parameters.agentId"));
    }

    #[test]
    fn test_tool_server_requires_a_target() {
        let errors = validate_action(&Action::ToolServer(ToolServerParams::default()));
        assert_eq!(errors[0].field, "action.parameters.serverId");
    }

    #[test]
    fn test_duplicate_mapping_rejected() {
        let mapping = ParameterMapping {
            tool_param: "title".into(),
            source: MappingSource::Literal,
            value: "x".into(),
        };
        let action = Action::ToolServer(ToolServerParams {
            server_id: Some("github".into()),
            tool_name: Some("create_issue".into()),
            parameter_mappings: vec![mapping.clone(), mapping],
            ..Default::default()
        });
        let errors = validate_action(&action);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "action.parameters.parameterMappings[1].toolParam");
    }

    #[test]
    fn test_issue_tracker_required_fields() {
        let action = Action::IssueTracker(IssueTrackerParams {
            operation: IssueTrackerOperation::AddComment,
            repository: Some("not-a-repo".into()),
            title_template: None,
            body_template: None,
            issue_number: None,
            base_branch: None,
            labels: vec![],
        });
        let fields: Vec<String> = validate_action(&action).into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"action.parameters.repository".to_string()));
        assert!(fields.contains(&"action.parameters.issueNumber".to_string()));
        assert!(fields.contains(&"action.parameters.bodyTemplate".to_string()));
    }
}
