//! Contracts for the external systems hooks act on.
//!
//! `Err(_)` from a lookup means the system could not be reached; `Ok(None)`
//! means it answered and the entity does not exist. Validation depends on
//! that distinction.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use crate::error::HookError;
use crate::hooks::Hook;

/// Chat surface that runs agent commands and custom agents
#[async_trait]
pub trait ChatHost: Send + Sync {
    /// Submit a slash-style command or prompt to the agent chat
    async fn send_prompt(&self, prompt: &str) -> Result<()>;

    /// Hand `arguments` to a named custom agent
    async fn invoke_agent(&self, agent: &AgentInfo, arguments: Option<&str>) -> Result<()>;
}

/// Version-control operations, run against the workspace repository
#[async_trait]
pub trait VersionControl: Send + Sync {
    async fn current_branch(&self) -> Result<Option<String>>;
    async fn user_name(&self) -> Result<Option<String>>;
    async fn remote_url(&self) -> Result<Option<String>>;

    /// Each mutating operation returns a short human-readable summary
    async fn commit(&self, message: &str) -> Result<String>;
    async fn push(&self) -> Result<String>;
    async fn create_branch(&self, name: &str) -> Result<String>;
    async fn tag(&self, name: &str, message: Option<&str>) -> Result<String>;
    async fn stash(&self, message: Option<&str>) -> Result<String>;
}

/// Issue or pull request created/touched by an issue-tracker action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRef {
    pub number: u64,
    pub url: String,
}

#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// `owner/name` of the workspace repository, if it can be determined
    async fn current_repository(&self) -> Result<Option<String>>;
    async fn open_issue(
        &self,
        repository: &str,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<IssueRef>;
    async fn close_issue(&self, repository: &str, number: u64) -> Result<IssueRef>;
    async fn create_pull_request(
        &self,
        repository: &str,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<IssueRef>;
    async fn add_comment(&self, repository: &str, number: u64, body: &str) -> Result<IssueRef>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Available,
    Unavailable,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the tool's arguments
    #[serde(default)]
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolServerInfo {
    pub id: String,
    pub name: String,
    pub status: ServerStatus,
    #[serde(default)]
    pub tools: Vec<ToolInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterCheck {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub success: bool,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Tool-server discovery and invocation
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    async fn discover_servers(&self, force_refresh: bool) -> Result<Vec<ToolServerInfo>>;
    async fn get_server(&self, server_id: &str) -> Result<Option<ToolServerInfo>>;
    async fn get_tool(&self, server_id: &str, tool_name: &str) -> Result<Option<ToolInfo>>;
    async fn validate_parameters(
        &self,
        server_id: &str,
        tool_name: &str,
        args: &Value,
    ) -> Result<ParameterCheck>;
    async fn execute_tool(
        &self,
        server_id: &str,
        tool_name: &str,
        args: Value,
        timeout_ms: u64,
    ) -> Result<ToolCallResult>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAvailability {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Registry of custom agents that hooks may invoke
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    async fn get_agent_by_id(&self, id: &str) -> Result<Option<AgentInfo>>;
    async fn check_agent_availability(&self, id: &str) -> Result<AgentAvailability>;
}

/// Remediation offered when a hook's configuration is broken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryChoice {
    UpdateConfiguration,
    RemoveHook,
    Ignore,
}

impl RecoveryChoice {
    pub const ALL: [RecoveryChoice; 3] = [
        RecoveryChoice::UpdateConfiguration,
        RecoveryChoice::RemoveHook,
        RecoveryChoice::Ignore,
    ];
}

/// User-facing reporting of hook failures
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Configuration problem; the host should offer `choices` to the user
    async fn configuration_problem(&self, hook: &Hook, error: &HookError, choices: &[RecoveryChoice]);

    /// Transient or runtime failure; informational only
    async fn runtime_failure(&self, hook: &Hook, error: &HookError);
}

/// Notifier that only writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn configuration_problem(&self, hook: &Hook, error: &HookError, choices: &[RecoveryChoice]) {
        error!(
            hook_id = %hook.id,
            hook = %hook.name,
            kind = error.kind(),
            error = %error,
            ?choices,
            "Hook configuration needs attention"
        );
    }

    async fn runtime_failure(&self, hook: &Hook, error: &HookError) {
        warn!(hook_id = %hook.id, hook = %hook.name, kind = error.kind(), error = %error, "Hook failed");
    }
}
