//! Error kinds shared by the hook registry, the engine and the action adapters.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A validation problem tied to one field of a hook, e.g. `action.parameters.serverId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Entity a `NotFound` error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Hook,
    Server,
    Tool,
    Agent,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Hook => "Hook",
            EntityKind::Server => "Server",
            EntityKind::Tool => "Tool",
            EntityKind::Agent => "Agent",
        };
        f.write_str(name)
    }
}

/// Which stage of an action was running when its timer fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutPhase {
    /// Subprocess agent had not established a session yet
    Handshake,
    /// Session established, prompt response still pending
    Session,
    /// Generic action timeout enforced by the engine or an adapter
    Action,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeoutPhase::Handshake => "handshake",
            TimeoutPhase::Session => "session",
            TimeoutPhase::Action => "action",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error)]
pub enum HookError {
    #[error("Validation failed: {}", join_fields(.errors))]
    Validation { errors: Vec<FieldError> },

    #[error("A hook named '{0}' already exists")]
    DuplicateName(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Circular dependency: hook '{hook_id}' already ran in this execution chain")]
    CircularDependency { hook_id: String },

    #[error("Maximum chain depth {max} reached (depth {depth})")]
    MaxDepthExceeded { depth: u32, max: u32 },

    #[error("Timed out during {phase} after {after_ms}ms")]
    Timeout { phase: TimeoutPhase, after_ms: u64 },

    #[error("Server '{server_id}' is unavailable: {reason}")]
    ServerUnavailable { server_id: String, reason: String },

    #[error("Parameter validation failed: {}", .errors.join("; "))]
    ParameterValidation { errors: Vec<String> },

    #[error("Failed to spawn '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Agent finished without producing any output")]
    EmptyResponse,

    #[error("Action failed: {0}")]
    ActionFailed(String),
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl HookError {
    /// Build a validation error from a single field problem
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        HookError::Validation {
            errors: vec![FieldError::new(field, message)],
        }
    }

    pub fn not_found(entity: EntityKind, id: impl Into<String>) -> Self {
        HookError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Stable machine-readable kind, used in logs and serialized results
    pub fn kind(&self) -> &'static str {
        match self {
            HookError::Validation { .. } => "validation",
            HookError::DuplicateName(_) => "duplicate_name",
            HookError::NotFound { .. } => "not_found",
            HookError::Persistence(_) => "persistence",
            HookError::CircularDependency { .. } => "circular_dependency",
            HookError::MaxDepthExceeded { .. } => "max_depth_exceeded",
            HookError::Timeout { .. } => "timeout",
            HookError::ServerUnavailable { .. } => "server_unavailable",
            HookError::ParameterValidation { .. } => "parameter_validation",
            HookError::SpawnFailed { .. } => "spawn_failed",
            HookError::Protocol(_) => "protocol",
            HookError::EmptyResponse => "empty_response",
            HookError::ActionFailed(_) => "action_failed",
        }
    }

    /// Worth retrying: the same call may succeed a moment later
    pub fn is_transient(&self) -> bool {
        match self {
            HookError::Timeout { .. } => true,
            HookError::ActionFailed(msg) => looks_transient(msg),
            _ => false,
        }
    }

    /// The hook's configuration is wrong; the user should update or remove it
    pub fn is_configuration_problem(&self) -> bool {
        matches!(
            self,
            HookError::Validation { .. }
                | HookError::NotFound { .. }
                | HookError::ParameterValidation { .. }
                | HookError::SpawnFailed { .. }
        )
    }
}

/// Heuristic classification of free-form failure text reported by external systems
pub fn looks_transient(message: &str) -> bool {
    let lower = message.to_lowercase();
    [
        "timeout",
        "timed out",
        "network",
        "connection",
        "unavailable",
        "econnreset",
        "econnrefused",
        "temporarily",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

/// Serializable snapshot of a `HookError`, stored in execution results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

impl From<&HookError> for ExecutionError {
    fn from(err: &HookError) -> Self {
        let fields = match err {
            HookError::Validation { errors } => errors.clone(),
            _ => Vec::new(),
        };
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            fields,
        }
    }
}

pub type Result<T> = std::result::Result<T, HookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(HookError::Timeout {
            phase: TimeoutPhase::Action,
            after_ms: 10
        }
        .is_transient());
        assert!(HookError::ActionFailed("ECONNRESET by peer".into()).is_transient());
        assert!(HookError::ActionFailed("Service Unavailable".into()).is_transient());
        assert!(!HookError::ActionFailed("invalid argument".into()).is_transient());
        assert!(!HookError::ParameterValidation { errors: vec![] }.is_transient());
        assert!(!HookError::not_found(EntityKind::Tool, "x").is_transient());
    }

    #[test]
    fn test_validation_message_lists_fields() {
        let err = HookError::Validation {
            errors: vec![
                FieldError::new("name", "Name is required"),
                FieldError::new("action.parameters.command", "Command is required"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("name: Name is required"));
        assert!(msg.contains("action.parameters.command"));

        let snapshot = ExecutionError::from(&err);
        assert_eq!(snapshot.kind, "validation");
        assert_eq!(snapshot.fields.len(), 2);
    }
}
