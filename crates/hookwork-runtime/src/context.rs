//! Per-chain execution state and the trigger-context snapshot used for templates.

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::host::VersionControl;
use crate::trigger::{TriggerEvent, TriggerTiming};

/// Hard cap on nested/sequential hook executions within one context
pub const MAX_CHAIN_DEPTH: u32 = 10;

/// State of one trigger chain. Created per top-level trigger, never persisted.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub execution_id: String,
    pub chain_depth: u32,
    pub executed_hooks: HashSet<String>,
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            chain_depth: 0,
            executed_hooks: HashSet::new(),
            started_at: Utc::now(),
        }
    }

    pub fn has_executed(&self, hook_id: &str) -> bool {
        self.executed_hooks.contains(hook_id)
    }

    /// Mark `hook_id` as executed and deepen the chain. Must happen before dispatch.
    pub fn enter(&mut self, hook_id: &str) {
        self.executed_hooks.insert(hook_id.to_string());
        self.chain_depth += 1;
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Values available to templates and `context` parameter mappings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerContext {
    pub system: String,
    pub operation: String,
    pub timing: String,
    /// RFC 3339
    pub timestamp: String,
    pub branch: String,
    pub feature: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl TriggerContext {
    /// Look up a variable by name or dotted path. Unknown names fall back to metadata.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let text = |s: &str| Some(Value::String(s.to_string()));
        match path {
            "system" => text(&self.system),
            "operation" => text(&self.operation),
            "timing" => text(&self.timing),
            "timestamp" => text(&self.timestamp),
            "branch" => text(&self.branch),
            "feature" => text(&self.feature),
            "user" => text(&self.user),
            "outputPath" | "output_path" => self.output_path.as_deref().and_then(text),
            _ => {
                let rest = path.strip_prefix("metadata.").unwrap_or(path);
                let mut parts = rest.split('.');
                let first = parts.next()?;
                let mut current = self.metadata.get(first)?;
                for part in parts {
                    current = match current {
                        Value::Object(map) => map.get(part)?,
                        Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                        _ => return None,
                    };
                }
                Some(current.clone())
            }
        }
    }

    /// Template rendering of a looked-up value; missing or null render empty
    pub fn lookup_text(&self, path: &str) -> String {
        match self.lookup(path) {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

fn feature_branch_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{3}-[A-Za-z0-9._-]+$").expect("valid feature regex"))
}

/// Feature name implied by a `NNN-slug` branch, empty otherwise
pub fn feature_from_branch(branch: &str) -> String {
    if feature_branch_regex().is_match(branch) {
        branch.to_string()
    } else {
        String::new()
    }
}

/// Snapshot the trigger plus repository state for template expansion.
/// Repository lookups that fail leave the value empty.
pub async fn build_trigger_context(
    event: Option<&TriggerEvent>,
    vcs: Option<&dyn VersionControl>,
) -> TriggerContext {
    let mut ctx = TriggerContext::default();

    let when = event
        .and_then(|e| Utc.timestamp_millis_opt(e.timestamp).single())
        .unwrap_or_else(Utc::now);
    ctx.timestamp = when.to_rfc3339();

    if let Some(event) = event {
        ctx.system = event.system.to_string();
        ctx.operation = event.operation.to_string();
        ctx.timing = event.effective_timing().to_string();
        ctx.output_path = event.output_path.clone();
        ctx.metadata = event.metadata.clone().unwrap_or_default();
    } else {
        ctx.timing = TriggerTiming::After.to_string();
    }

    if let Some(vcs) = vcs {
        match vcs.current_branch().await {
            Ok(Some(branch)) => ctx.branch = branch,
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Could not read current branch"),
        }
        match vcs.user_name().await {
            Ok(Some(user)) => ctx.user = user,
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Could not read user name"),
        }
    }
    ctx.feature = feature_from_branch(&ctx.branch);

    ctx
}
