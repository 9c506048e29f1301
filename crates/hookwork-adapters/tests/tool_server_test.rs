use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hookwork_adapters::mcp::truncate_output;
use hookwork_adapters::{ConcurrencyPool, ToolServerAdapter, ToolServerSettings};
use hookwork_runtime::hooks::{SelectedTool, ToolServerParams, TriggerCondition};
use hookwork_runtime::host::{ParameterCheck, ServerStatus, ToolCallResult, ToolInfo, ToolServerInfo};
use hookwork_runtime::{
    Action, ActionAdapter, ActionAdapters, ExecutionStatus, HookEngine, HookManager,
    HookValidator, MemoryStore, NewHook, OperationType, ToolCatalog, TriggerContext,
    TriggerSystem,
};
use serde_json::{json, Value};

/// What the next `execute_tool` call does
enum Step {
    Hang,
    Fail(&'static str),
    Reply(Value),
}

/// One server, one tool, and a queue of call outcomes
struct ScriptedCatalog {
    status: ServerStatus,
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl ScriptedCatalog {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            status: ServerStatus::Available,
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ToolCatalog for ScriptedCatalog {
    async fn discover_servers(&self, _force: bool) -> anyhow::Result<Vec<ToolServerInfo>> {
        Ok(Vec::new())
    }

    async fn get_server(&self, id: &str) -> anyhow::Result<Option<ToolServerInfo>> {
        Ok(Some(ToolServerInfo {
            id: id.to_string(),
            name: "Docs".into(),
            status: self.status,
            tools: Vec::new(),
        }))
    }

    async fn get_tool(&self, _server: &str, tool: &str) -> anyhow::Result<Option<ToolInfo>> {
        Ok(Some(ToolInfo {
            name: tool.to_string(),
            description: String::new(),
            input_schema: json!({"type": "object", "properties": {}}),
        }))
    }

    async fn validate_parameters(
        &self,
        _server: &str,
        _tool: &str,
        _args: &Value,
    ) -> anyhow::Result<ParameterCheck> {
        Ok(ParameterCheck {
            valid: true,
            errors: Vec::new(),
        })
    }

    async fn execute_tool(
        &self,
        _server: &str,
        _tool: &str,
        _args: Value,
        _timeout_ms: u64,
    ) -> anyhow::Result<ToolCallResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(ToolCallResult::default())
            }
            Some(Step::Fail(message)) => Ok(ToolCallResult {
                success: false,
                output: None,
                error: Some(message.to_string()),
            }),
            Some(Step::Reply(output)) => Ok(ToolCallResult {
                success: true,
                output: Some(output),
                error: None,
            }),
            None => Err(anyhow::anyhow!("no scripted reply left")),
        }
    }
}

fn settings(max_retries: u32, retry_delay_ms: u64, default_timeout_ms: u64) -> ToolServerSettings {
    ToolServerSettings {
        max_retries,
        retry_delay: Duration::from_millis(retry_delay_ms),
        default_timeout_ms,
        max_output_bytes: 1024,
    }
}

fn adapter(catalog: Arc<ScriptedCatalog>, settings: ToolServerSettings) -> ToolServerAdapter {
    ToolServerAdapter::new(catalog, Arc::new(ConcurrencyPool::new(2))).with_settings(settings)
}

fn single_tool(timeout: Option<u64>) -> ToolServerParams {
    ToolServerParams {
        server_id: Some("docs".into()),
        tool_name: Some("publish".into()),
        timeout,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_engine_leaves_room_for_retries() {
    let catalog = Arc::new(ScriptedCatalog::new(vec![Step::Hang, Step::Reply(json!("published"))]));
    let tools = adapter(catalog.clone(), settings(2, 10, 5_000));

    let manager = Arc::new(HookManager::new(Arc::new(MemoryStore::new()), HookValidator::new()));
    let hook = manager
        .create_hook(NewHook {
            name: "Publish docs".into(),
            enabled: true,
            trigger: TriggerCondition::after(TriggerSystem::Speckit, OperationType::Implement),
            action: Action::ToolServer(single_tool(Some(150))),
        })
        .await
        .unwrap();
    // Shorter than a single call; only the adapter's budget lets the retry happen
    let engine = HookEngine::new(manager, ActionAdapters::new().with_tool_server(Arc::new(tools)))
        .with_timeout(Duration::from_millis(100));
    assert_eq!(engine.timeout_for(&hook.action), Duration::from_millis(150 * 3 + 10 * 2));

    let result = engine.execute_hook(&hook, None).await;

    assert_eq!(result.status, ExecutionStatus::Success, "{:?}", result.error);
    assert_eq!(result.output.as_deref(), Some("published"));
    assert_eq!(catalog.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_budget_covers_every_selected_tool() {
    let catalog = Arc::new(ScriptedCatalog::new(Vec::new()));
    let tools = adapter(catalog, settings(1, 100, 1_000));
    let params = ToolServerParams {
        selected_tools: vec![
            SelectedTool {
                server_id: "docs".into(),
                tool_name: "lint".into(),
            },
            SelectedTool {
                server_id: "docs".into(),
                tool_name: "publish".into(),
            },
        ],
        ..Default::default()
    };

    assert_eq!(tools.time_budget(&params), Some(Duration::from_millis((1_000 * 2 + 100) * 2)));
    assert_eq!(
        tools.time_budget(&single_tool(Some(200))),
        Some(Duration::from_millis(200 * 2 + 100))
    );
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let catalog = Arc::new(ScriptedCatalog::new(vec![
        Step::Fail("invalid page id"),
        Step::Reply(json!("never")),
    ]));
    let tools = adapter(catalog.clone(), settings(3, 10, 1_000));

    let err = tools
        .execute(&single_tool(None), &TriggerContext::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "action_failed");
    assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unavailable_server_is_not_called() {
    let mut catalog = ScriptedCatalog::new(vec![Step::Reply(json!("never"))]);
    catalog.status = ServerStatus::Unavailable;
    let catalog = Arc::new(catalog);
    let tools = adapter(catalog.clone(), settings(0, 10, 1_000));

    let err = tools
        .execute(&single_tool(None), &TriggerContext::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "server_unavailable");
    assert_eq!(catalog.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_string_output_size_counts_json_escapes() {
    // 60 raw bytes, 122 once quoted and escaped
    let quotes = "\"".repeat(60);
    let out = truncate_output(Some(Value::String(quotes)), 100);
    assert!(out.truncated);
    let text = out.output.unwrap();
    assert!(text.starts_with(&"\"".repeat(50)));
    assert!(text.ends_with("[Output truncated: original size 122 bytes]"), "{}", text);

    let plain = "a".repeat(60);
    let out = truncate_output(Some(Value::String(plain.clone())), 100);
    assert!(!out.truncated);
    assert_eq!(out.output.as_deref(), Some(plain.as_str()));
}

#[test]
fn test_structured_output_is_serialized() {
    let out = truncate_output(Some(json!({"pages": 3})), 100);
    assert_eq!(out.output.as_deref(), Some(r#"{"pages":3}"#));
    assert!(truncate_output(Some(Value::Null), 100).output.is_none());
}
