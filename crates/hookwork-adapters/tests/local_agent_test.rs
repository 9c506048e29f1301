#![cfg(unix)]

use hookwork_adapters::local_agent::LOCAL_AGENT_GRACE;
use hookwork_adapters::LocalAgentAdapter;
use hookwork_runtime::hooks::{LocalAgentParams, TriggerCondition};
use hookwork_runtime::{
    Action, ActionAdapter, ActionAdapters, ExecutionStatus, HookEngine, HookError, HookManager,
    HookValidator, MemoryStore, NewHook, OperationType, TimeoutPhase, TriggerContext,
    TriggerSystem,
};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

const INIT_REPLY: &str = r#"printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":1}}'"#;
const SESSION_REPLY: &str =
    r#"printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"sessionId":"s1"}}'"#;
const STOP_REPLY: &str =
    r#"printf '%s\n' '{"jsonrpc":"2.0","id":3,"result":{"stopReason":"end_turn"}}'"#;

fn chunk(text: &str) -> String {
    format!(
        r#"printf '%s\n' '{{"jsonrpc":"2.0","method":"session/update","params":{{"sessionId":"s1","update":{{"sessionUpdate":"agent_message_chunk","content":{{"type":"text","text":"{}"}}}}}}}}'"#,
        text
    )
}

/// Write a fake agent script and return the command line that runs it
fn fake_agent(dir: &Path, body: &[&str]) -> String {
    let path = dir.join("agent.sh");
    let script = format!("#!/bin/sh\n{}\n", body.join("\n"));
    std::fs::write(&path, script).unwrap();
    format!("sh {}", path.display())
}

fn params(command: String) -> LocalAgentParams {
    LocalAgentParams {
        agent_command: command,
        task_instruction: "Summarize the plan".into(),
        cwd: None,
    }
}

async fn run(adapter: &LocalAgentAdapter, command: String) -> Result<String, HookError> {
    adapter
        .execute(&params(command), &TriggerContext::default())
        .await
        .map(|out| out.output.unwrap_or_default())
}

#[tokio::test]
async fn test_accumulates_streamed_reply() {
    let dir = tempfile::tempdir().unwrap();
    let hello = chunk("Hello ");
    let world = chunk("world");
    let command = fake_agent(
        dir.path(),
        &[
            "read line",
            "echo 'agent booting, not json'",
            INIT_REPLY,
            "read line",
            SESSION_REPLY,
            "read line",
            &hello,
            &world,
            STOP_REPLY,
        ],
    );

    let adapter = LocalAgentAdapter::new(Duration::from_secs(10)).with_default_cwd(dir.path());
    assert_eq!(run(&adapter, command).await.unwrap(), "Hello world");
}

#[tokio::test]
async fn test_non_utf8_output_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let hi = chunk("hi");
    let command = fake_agent(
        dir.path(),
        &[
            "read line",
            r"printf 'log \377\376 garbage\n'",
            INIT_REPLY,
            "read line",
            SESSION_REPLY,
            "read line",
            r"printf '\377\n'",
            &hi,
            STOP_REPLY,
        ],
    );

    let adapter = LocalAgentAdapter::new(Duration::from_secs(10)).with_default_cwd(dir.path());
    assert_eq!(run(&adapter, command).await.unwrap(), "hi");
}

#[tokio::test]
async fn test_partial_lines_are_buffered() {
    let dir = tempfile::tempdir().unwrap();
    let command = fake_agent(
        dir.path(),
        &[
            "read line",
            r#"printf '{"jsonrpc":"2.0","id":1,'"#,
            "sleep 0.2",
            r#"printf '"result":{}}\n'"#,
            "read line",
            SESSION_REPLY,
            "read line",
            &chunk("done"),
            STOP_REPLY,
        ],
    );

    let adapter = LocalAgentAdapter::new(Duration::from_secs(10)).with_default_cwd(dir.path());
    assert_eq!(run(&adapter, command).await.unwrap(), "done");
}

#[tokio::test]
async fn test_no_output_is_empty_response() {
    let dir = tempfile::tempdir().unwrap();
    let command = fake_agent(
        dir.path(),
        &["read line", INIT_REPLY, "read line", SESSION_REPLY, "read line", STOP_REPLY],
    );

    let adapter = LocalAgentAdapter::new(Duration::from_secs(10)).with_default_cwd(dir.path());
    let err = run(&adapter, command).await.unwrap_err();
    assert!(matches!(err, HookError::EmptyResponse));
}

#[tokio::test]
async fn test_missing_binary_is_spawn_failure() {
    let adapter = LocalAgentAdapter::default();
    let err = run(&adapter, "hookwork-no-such-agent --acp".to_string())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "spawn_failed");
    assert!(err.is_configuration_problem());
}

#[tokio::test]
async fn test_rejected_initialize_is_protocol_error() {
    let dir = tempfile::tempdir().unwrap();
    let command = fake_agent(
        dir.path(),
        &[
            "read line",
            r#"printf '%s\n' '{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"unsupported"}}'"#,
        ],
    );

    let adapter = LocalAgentAdapter::new(Duration::from_secs(10)).with_default_cwd(dir.path());
    let err = run(&adapter, command).await.unwrap_err();
    assert_eq!(err.kind(), "protocol");
}

#[tokio::test]
async fn test_silent_agent_times_out_in_handshake() {
    let dir = tempfile::tempdir().unwrap();
    let command = fake_agent(dir.path(), &["read line", "sleep 5"]);

    let adapter = LocalAgentAdapter::new(Duration::from_millis(300)).with_default_cwd(dir.path());
    let started = Instant::now();
    let err = run(&adapter, command).await.unwrap_err();

    assert!(matches!(
        err,
        HookError::Timeout {
            phase: TimeoutPhase::Handshake,
            ..
        }
    ));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_engine_reports_handshake_phase() {
    let dir = tempfile::tempdir().unwrap();
    let command = fake_agent(dir.path(), &["read line", "sleep 30"]);
    let agent_timeout = Duration::from_millis(300);

    let manager = Arc::new(HookManager::new(Arc::new(MemoryStore::new()), HookValidator::new()));
    let hook = manager
        .create_hook(NewHook {
            name: "Plan summary".into(),
            enabled: true,
            trigger: TriggerCondition::after(TriggerSystem::Speckit, OperationType::Plan),
            action: Action::LocalAgent(params(command)),
        })
        .await
        .unwrap();
    let adapter = LocalAgentAdapter::new(agent_timeout).with_default_cwd(dir.path());
    // Engine default matches the adapter; the adapter's budget must still win
    let engine = HookEngine::new(manager, ActionAdapters::new().with_local_agent(Arc::new(adapter)))
        .with_timeout(agent_timeout);
    assert_eq!(engine.timeout_for(&hook.action), agent_timeout + LOCAL_AGENT_GRACE);

    let started = Instant::now();
    let result = engine.execute_hook(&hook, None).await;

    assert_eq!(result.status, ExecutionStatus::Timeout);
    let error = result.error.unwrap();
    assert_eq!(error.kind, "timeout");
    assert!(error.message.contains("handshake"), "{}", error.message);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_stalled_prompt_times_out_in_session() {
    let dir = tempfile::tempdir().unwrap();
    let command = fake_agent(
        dir.path(),
        &["read line", INIT_REPLY, "read line", SESSION_REPLY, "read line", "sleep 5"],
    );

    let adapter = LocalAgentAdapter::new(Duration::from_millis(500)).with_default_cwd(dir.path());
    let err = run(&adapter, command).await.unwrap_err();
    assert!(matches!(
        err,
        HookError::Timeout {
            phase: TimeoutPhase::Session,
            ..
        }
    ));
}

#[tokio::test]
async fn test_permission_requests_are_declined() {
    let dir = tempfile::tempdir().unwrap();
    let command = fake_agent(
        dir.path(),
        &[
            "read line",
            INIT_REPLY,
            "read line",
            SESSION_REPLY,
            "read line",
            r#"printf '%s\n' '{"jsonrpc":"2.0","id":"p1","method":"session/request_permission","params":{}}'"#,
            "read reply",
            r#"case "$reply" in *cancelled*) ANSWER=declined ;; *) ANSWER=unexpected ;; esac"#,
            r#"printf '{"jsonrpc":"2.0","method":"session/update","params":{"update":{"sessionUpdate":"agent_message_chunk","content":{"type":"text","text":"%s"}}}}\n' "$ANSWER""#,
            STOP_REPLY,
        ],
    );

    let adapter = LocalAgentAdapter::new(Duration::from_secs(10)).with_default_cwd(dir.path());
    assert_eq!(run(&adapter, command).await.unwrap(), "declined");
}
