//! Forward-compatible rewrites applied to stored/imported hook JSON before decoding.

use serde_json::Value;
use tracing::debug;

/// Upgrade one raw hook object in place. Returns true if anything changed.
pub fn migrate_hook_value(value: &mut Value) -> bool {
    let mut changed = false;

    // Hooks saved before timing existed ran after the operation
    if let Some(trigger) = value.get_mut("trigger").and_then(Value::as_object_mut) {
        if !trigger.contains_key("timing") {
            trigger.insert("timing".to_string(), Value::String("after".to_string()));
            changed = true;
        }
    }

    let is_custom = matches!(
        value.pointer("/action/type").and_then(Value::as_str),
        Some("custom" | "custom-agent")
    );
    if is_custom {
        if let Some(params) = value
            .pointer_mut("/action/parameters")
            .and_then(Value::as_object_mut)
        {
            if let Some(legacy) = params.remove("agentName") {
                if !params.contains_key("agentId") {
                    params.insert("agentId".to_string(), legacy);
                }
                changed = true;
            }
        }
    }

    if changed {
        let id = value.get("id").and_then(Value::as_str).unwrap_or("<unknown>");
        debug!(hook_id = id, "Migrated stored hook");
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_timing_defaults_to_after() {
        let mut v = json!({"trigger": {"system": "speckit", "operation": "plan"}});
        assert!(migrate_hook_value(&mut v));
        assert_eq!(v["trigger"]["timing"], "after");
        assert!(!migrate_hook_value(&mut v));
    }

    #[test]
    fn test_legacy_agent_name_renamed() {
        let mut v = json!({
            "trigger": {"system": "speckit", "operation": "plan", "timing": "after"},
            "action": {"type": "custom", "parameters": {"agentName": "reviewer"}}
        });
        assert!(migrate_hook_value(&mut v));
        assert_eq!(v["action"]["parameters"]["agentId"], "reviewer");
        assert!(v["action"]["parameters"].get("agentName").is_none());
    }

    #[test]
    fn test_agent_name_ignored_for_other_kinds() {
        let mut v = json!({
            "trigger": {"timing": "before"},
            "action": {"type": "agent-command", "parameters": {"agentName": "x"}}
        });
        assert!(!migrate_hook_value(&mut v));
    }
}
