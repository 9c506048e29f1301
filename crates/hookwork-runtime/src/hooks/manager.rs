use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use super::hook::{Hook, HookUpdate, NewHook};
use super::migration::migrate_hook_value;
use super::validation::{validate_action, validate_name, validate_structure, HookValidator, ValidationReport};
use crate::error::{EntityKind, HookError, Result};
use crate::storage::StateStore;
use crate::trigger::{OperationType, TriggerSystem};

/// Key the hook collection is stored under
pub const HOOKS_STORAGE_KEY: &str = "hookwork.hooks";

/// Change notifications for the hook collection
#[derive(Debug, Clone)]
pub enum HookChange {
    Created(Hook),
    Updated(Hook),
    Deleted(String),
    Imported(usize),
}

/// Sole owner of the persisted hook collection
pub struct HookManager {
    hooks: RwLock<Vec<Hook>>,
    store: Arc<dyn StateStore>,
    validator: HookValidator,
    changes: broadcast::Sender<HookChange>,
}

impl HookManager {
    pub fn new(store: Arc<dyn StateStore>, validator: HookValidator) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            hooks: RwLock::new(Vec::new()),
            store,
            validator,
            changes,
        }
    }

    pub fn validator(&self) -> &HookValidator {
        &self.validator
    }

    /// Subscribe to create/update/delete/import notifications
    pub fn subscribe(&self) -> broadcast::Receiver<HookChange> {
        self.changes.subscribe()
    }

    /// Load the collection from the store. Entries that fail to decode or are
    /// structurally invalid are dropped with a warning. Returns the count loaded.
    pub async fn load(&self) -> Result<usize> {
        let stored = self
            .store
            .get(HOOKS_STORAGE_KEY)
            .await
            .map_err(|e| HookError::Persistence(e.to_string()))?;

        let entries = match stored {
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                warn!(kind = json_kind(&other), "Stored hooks are not a list; starting empty");
                Vec::new()
            }
            None => Vec::new(),
        };

        let mut loaded: Vec<Hook> = Vec::with_capacity(entries.len());
        for mut raw in entries {
            migrate_hook_value(&mut raw);
            let hook: Hook = match serde_json::from_value(raw) {
                Ok(h) => h,
                Err(e) => {
                    warn!(error = %e, "Dropping malformed stored hook");
                    continue;
                }
            };
            let mut problems = validate_structure(&hook);
            problems.extend(validate_name(&hook.name));
            if !problems.is_empty() {
                warn!(hook_id = %hook.id, errors = ?problems, "Dropping invalid stored hook");
                continue;
            }
            if loaded.iter().any(|h| h.id == hook.id) {
                warn!(hook_id = %hook.id, "Dropping stored hook with duplicate id");
                continue;
            }
            loaded.push(hook);
        }

        let count = loaded.len();
        *self.hooks.write().await = loaded;
        info!(count, "Hooks loaded");
        Ok(count)
    }

    pub async fn create_hook(&self, input: NewHook) -> Result<Hook> {
        if self.name_taken(&input.name, None).await {
            return Err(HookError::DuplicateName(input.name));
        }

        let now = Utc::now().timestamp_millis();
        let hook = Hook {
            id: uuid::Uuid::new_v4().to_string(),
            name: input.name,
            enabled: input.enabled,
            trigger: input.trigger,
            action: input.action,
            created_at: now,
            modified_at: now,
            last_executed_at: None,
            execution_count: 0,
        };

        self.validator.validate(&hook).await.into_result()?;

        {
            let mut hooks = self.hooks.write().await;
            // Another create may have claimed the name while validation was pending
            if hooks.iter().any(|h| h.name == hook.name) {
                return Err(HookError::DuplicateName(hook.name));
            }
            hooks.push(hook.clone());
            if let Err(e) = self.persist(&hooks).await {
                hooks.pop();
                return Err(e);
            }
        }

        info!(hook_id = %hook.id, hook = %hook.name, "Hook created");
        let _ = self.changes.send(HookChange::Created(hook.clone()));
        Ok(hook)
    }

    pub async fn update_hook(&self, id: &str, mut update: HookUpdate) -> Result<Hook> {
        if update.strip_immutable() {
            debug!(hook_id = id, "Ignoring attempt to change immutable hook fields");
        }

        let current = self
            .get_hook(id)
            .await
            .ok_or_else(|| HookError::not_found(EntityKind::Hook, id))?;

        let name_changed = update.name.as_ref().is_some_and(|n| *n != current.name);
        let mut merged = update.merged_into(&current);
        if name_changed && self.name_taken(&merged.name, Some(id)).await {
            return Err(HookError::DuplicateName(merged.name));
        }
        merged.modified_at = Utc::now().timestamp_millis().max(current.created_at);

        self.validator.validate(&merged).await.into_result()?;

        {
            let mut hooks = self.hooks.write().await;
            if name_changed && hooks.iter().any(|h| h.id != id && h.name == merged.name) {
                return Err(HookError::DuplicateName(merged.name));
            }
            let idx = hooks
                .iter()
                .position(|h| h.id == id)
                .ok_or_else(|| HookError::not_found(EntityKind::Hook, id))?;
            // Counters may have moved while validation was pending
            merged.execution_count = hooks[idx].execution_count;
            merged.last_executed_at = hooks[idx].last_executed_at;
            let previous = std::mem::replace(&mut hooks[idx], merged.clone());
            if let Err(e) = self.persist(&hooks).await {
                hooks[idx] = previous;
                return Err(e);
            }
        }

        info!(hook_id = id, "Hook updated");
        let _ = self.changes.send(HookChange::Updated(merged.clone()));
        Ok(merged)
    }

    /// Returns false if no hook has this id
    pub async fn delete_hook(&self, id: &str) -> Result<bool> {
        {
            let mut hooks = self.hooks.write().await;
            let Some(idx) = hooks.iter().position(|h| h.id == id) else {
                return Ok(false);
            };
            let removed = hooks.remove(idx);
            if let Err(e) = self.persist(&hooks).await {
                hooks.insert(idx, removed);
                return Err(e);
            }
        }

        info!(hook_id = id, "Hook deleted");
        let _ = self.changes.send(HookChange::Deleted(id.to_string()));
        Ok(true)
    }

    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<Hook> {
        self.update_hook(
            id,
            HookUpdate {
                enabled: Some(enabled),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn get_hook(&self, id: &str) -> Option<Hook> {
        self.hooks.read().await.iter().find(|h| h.id == id).cloned()
    }

    pub async fn get_all_hooks(&self) -> Vec<Hook> {
        self.hooks.read().await.clone()
    }

    /// Enabled hooks for a trigger, oldest first
    pub async fn get_enabled_hooks_for(
        &self,
        system: TriggerSystem,
        operation: OperationType,
    ) -> Vec<Hook> {
        let mut matching: Vec<Hook> = self
            .hooks
            .read()
            .await
            .iter()
            .filter(|h| h.enabled && h.matches(system, operation))
            .cloned()
            .collect();
        matching.sort_by_key(|h| h.created_at);
        matching
    }

    pub async fn validate_hook(&self, hook: &Hook) -> ValidationReport {
        self.validator.validate(hook).await
    }

    /// Bump the execution counter and last-run time. Unknown ids are ignored.
    pub async fn record_execution(&self, id: &str, at: i64) -> Result<()> {
        let mut hooks = self.hooks.write().await;
        let Some(hook) = hooks.iter_mut().find(|h| h.id == id) else {
            debug!(hook_id = id, "Execution recorded for unknown hook");
            return Ok(());
        };
        hook.execution_count += 1;
        hook.last_executed_at = Some(at);
        self.persist(&hooks).await
    }

    /// Pretty-printed JSON array of every hook
    pub async fn export_hooks(&self) -> Result<String> {
        let hooks = self.hooks.read().await;
        serde_json::to_string_pretty(&*hooks).map_err(|e| HookError::Persistence(e.to_string()))
    }

    /// Import a JSON array of hooks. Invalid entries and name collisions are
    /// skipped; every imported hook gets a fresh id. Returns the count imported.
    pub async fn import_hooks(&self, json: &str) -> Result<usize> {
        let parsed: Value = serde_json::from_str(json)
            .map_err(|e| HookError::field("import", format!("Invalid JSON: {}", e)))?;
        let Value::Array(entries) = parsed else {
            return Err(HookError::field("import", "Expected a JSON array of hooks"));
        };

        let mut hooks = self.hooks.write().await;
        let mut names: HashSet<String> = hooks.iter().map(|h| h.name.clone()).collect();
        let now = Utc::now().timestamp_millis();
        let mut imported = Vec::new();

        for (index, mut raw) in entries.into_iter().enumerate() {
            migrate_hook_value(&mut raw);
            // Imports may omit identity fields; they are regenerated anyway
            if let Some(obj) = raw.as_object_mut() {
                obj.entry("id").or_insert_with(|| Value::String(String::new()));
                obj.entry("createdAt").or_insert_with(|| Value::from(now));
                obj.entry("modifiedAt").or_insert_with(|| Value::from(now));
                obj.entry("enabled").or_insert(Value::Bool(true));
            }
            let mut hook: Hook = match serde_json::from_value(raw) {
                Ok(h) => h,
                Err(e) => {
                    warn!(index, error = %e, "Skipping malformed hook in import");
                    continue;
                }
            };

            hook.id = uuid::Uuid::new_v4().to_string();
            if hook.created_at <= 0 {
                hook.created_at = now;
            }
            hook.modified_at = hook.modified_at.max(hook.created_at);

            let mut problems = validate_structure(&hook);
            problems.extend(validate_name(&hook.name));
            problems.extend(validate_action(&hook.action));
            if !problems.is_empty() {
                warn!(index, errors = ?problems, "Skipping invalid hook in import");
                continue;
            }
            if !names.insert(hook.name.clone()) {
                warn!(index, hook = %hook.name, "Skipping imported hook with duplicate name");
                continue;
            }
            imported.push(hook);
        }

        let count = imported.len();
        if count == 0 {
            return Ok(0);
        }

        let before = hooks.len();
        hooks.extend(imported);
        if let Err(e) = self.persist(&hooks).await {
            hooks.truncate(before);
            return Err(e);
        }
        drop(hooks);

        info!(count, "Hooks imported");
        let _ = self.changes.send(HookChange::Imported(count));
        Ok(count)
    }

    async fn name_taken(&self, name: &str, excluding: Option<&str>) -> bool {
        self.hooks
            .read()
            .await
            .iter()
            .any(|h| h.name == name && Some(h.id.as_str()) != excluding)
    }

    async fn persist(&self, hooks: &[Hook]) -> Result<()> {
        let value = serde_json::to_value(hooks).map_err(|e| HookError::Persistence(e.to_string()))?;
        self.store
            .update(HOOKS_STORAGE_KEY, value)
            .await
            .map_err(|e| HookError::Persistence(e.to_string()))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
