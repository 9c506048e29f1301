//! Local agent subprocess driven over the Agent Client Protocol: line-delimited
//! JSON-RPC 2.0 on the child's stdin/stdout.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use hookwork_runtime::error::{FieldError, TimeoutPhase};
use hookwork_runtime::hooks::LocalAgentParams;
use hookwork_runtime::{ActionAdapter, ActionOutput, HookError, TriggerContext};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::{timeout_at, Instant};
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, FramedRead};
use tracing::{debug, info, warn};

/// Default budget for one whole agent exchange
pub const DEFAULT_LOCAL_AGENT_TIMEOUT: Duration = Duration::from_secs(600);
/// Extra engine-side allowance so the adapter's own handshake/session timeout
/// and the process kill finish first
pub const LOCAL_AGENT_GRACE: Duration = Duration::from_secs(5);

const PROTOCOL_VERSION: u64 = 1;
/// Longest line read from an agent; longer lines are discarded
const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;
const METHOD_NOT_FOUND: i64 = -32601;

/// Runs a task instruction through a local ACP agent and returns its reply
pub struct LocalAgentAdapter {
    timeout: Duration,
    default_cwd: Option<PathBuf>,
}

impl LocalAgentAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            default_cwd: None,
        }
    }

    /// Working directory when the hook does not set one
    pub fn with_default_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.default_cwd = Some(cwd.into());
        self
    }

    fn working_dir(&self, params: &LocalAgentParams) -> Result<PathBuf, HookError> {
        if let Some(cwd) = params.cwd.as_deref().filter(|c| !c.is_empty()) {
            return Ok(PathBuf::from(cwd));
        }
        if let Some(cwd) = &self.default_cwd {
            return Ok(cwd.clone());
        }
        std::env::current_dir()
            .map_err(|e| HookError::ActionFailed(format!("Cannot determine working directory: {}", e)))
    }
}

impl Default for LocalAgentAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_LOCAL_AGENT_TIMEOUT)
    }
}

#[async_trait]
impl ActionAdapter<LocalAgentParams> for LocalAgentAdapter {
    fn time_budget(&self, _params: &LocalAgentParams) -> Option<Duration> {
        Some(self.timeout + LOCAL_AGENT_GRACE)
    }

    fn validate(&self, params: &LocalAgentParams) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if params.agent_command.trim().is_empty() {
            errors.push(FieldError::new("action.parameters.agentCommand", "Agent command is required"));
        }
        if params.task_instruction.trim().is_empty() {
            errors.push(FieldError::new(
                "action.parameters.taskInstruction",
                "Task instruction is required",
            ));
        }
        errors
    }

    async fn execute(
        &self,
        params: &LocalAgentParams,
        _ctx: &TriggerContext,
    ) -> Result<ActionOutput, HookError> {
        let cwd = self.working_dir(params)?;
        let mut session = AcpSession::spawn(&params.agent_command, &cwd)?;
        let deadline = Instant::now() + self.timeout;
        let after_ms = self.timeout.as_millis() as u64;

        let result = async {
            let session_id = match timeout_at(deadline, session.handshake(&cwd)).await {
                Ok(id) => id?,
                Err(_) => {
                    return Err(HookError::Timeout {
                        phase: TimeoutPhase::Handshake,
                        after_ms,
                    })
                }
            };
            match timeout_at(deadline, session.prompt(&session_id, &params.task_instruction)).await {
                Ok(stop_reason) => stop_reason,
                Err(_) => Err(HookError::Timeout {
                    phase: TimeoutPhase::Session,
                    after_ms,
                }),
            }
        }
        .await;

        session.shutdown().await;

        let stop_reason = result?;
        let output = session.output.trim();
        if output.is_empty() {
            return Err(HookError::EmptyResponse);
        }
        info!(stop_reason = %stop_reason, bytes = output.len(), "Local agent finished");
        Ok(ActionOutput::text(output))
    }
}

/// Newline-delimited raw lines. An oversized line comes out empty instead of
/// failing the stream, since `FramedRead` stops after any decoder error.
struct AgentLines {
    inner: AnyDelimiterCodec,
}

impl AgentLines {
    fn new() -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\n".to_vec(), MAX_LINE_BYTES),
        }
    }

    fn frame(
        result: Result<Option<impl AsRef<[u8]>>, AnyDelimiterCodecError>,
    ) -> Result<Option<Vec<u8>>, std::io::Error> {
        match result {
            Ok(line) => Ok(line.map(|l| l.as_ref().to_vec())),
            Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                warn!(limit = MAX_LINE_BYTES, "Discarding oversized agent output line");
                Ok(Some(Vec::new()))
            }
            Err(AnyDelimiterCodecError::Io(e)) => Err(e),
        }
    }
}

impl Decoder for AgentLines {
    type Item = Vec<u8>;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Vec<u8>>, std::io::Error> {
        Self::frame(self.inner.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Vec<u8>>, std::io::Error> {
        Self::frame(self.inner.decode_eof(buf))
    }
}

/// One spawned agent process and its JSON-RPC state
struct AcpSession {
    command: String,
    child: Child,
    stdin: ChildStdin,
    lines: FramedRead<ChildStdout, AgentLines>,
    next_id: u64,
    output: String,
}

impl AcpSession {
    fn spawn(command_line: &str, cwd: &std::path::Path) -> Result<Self, HookError> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next().ok_or_else(|| HookError::SpawnFailed {
            command: command_line.to_string(),
            reason: "empty command".to_string(),
        })?;

        let mut child = Command::new(program)
            .args(parts)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HookError::SpawnFailed {
                command: command_line.to_string(),
                reason: match e.kind() {
                    std::io::ErrorKind::NotFound => "command not found".to_string(),
                    std::io::ErrorKind::PermissionDenied => "command is not executable".to_string(),
                    _ => e.to_string(),
                },
            })?;

        let stdin = child.stdin.take().ok_or_else(|| HookError::SpawnFailed {
            command: command_line.to_string(),
            reason: "no stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| HookError::SpawnFailed {
            command: command_line.to_string(),
            reason: "no stdout".to_string(),
        })?;
        debug!(command = command_line, pid = ?child.id(), "Local agent spawned");

        Ok(Self {
            command: command_line.to_string(),
            child,
            stdin,
            lines: FramedRead::new(stdout, AgentLines::new()),
            next_id: 0,
            output: String::new(),
        })
    }

    /// initialize + session/new; returns the session id
    async fn handshake(&mut self, cwd: &std::path::Path) -> Result<String, HookError> {
        self.request(
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "clientCapabilities": {"fs": {"readTextFile": false, "writeTextFile": false}}
            }),
        )
        .await?;

        let session = self
            .request("session/new", json!({"cwd": cwd, "mcpServers": []}))
            .await?;
        session
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| HookError::Protocol("session/new response has no sessionId".to_string()))
    }

    /// session/prompt; returns the stop reason once the turn ends
    async fn prompt(&mut self, session_id: &str, instruction: &str) -> Result<String, HookError> {
        let result = self
            .request(
                "session/prompt",
                json!({
                    "sessionId": session_id,
                    "prompt": [{"type": "text", "text": instruction}]
                }),
            )
            .await?;
        result
            .get("stopReason")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| HookError::Protocol("session/prompt response has no stopReason".to_string()))
    }

    /// Send a request and read until its response, handling anything the agent sends meanwhile
    async fn request(&mut self, method: &str, params: Value) -> Result<Value, HookError> {
        self.next_id += 1;
        let id = self.next_id;
        self.send(&json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await?;

        loop {
            let raw = match self.lines.next().await {
                Some(Ok(raw)) => raw,
                Some(Err(e)) => {
                    return Err(HookError::Protocol(format!("Failed to read from agent: {}", e)))
                }
                None => {
                    return Err(HookError::Protocol(format!(
                        "Agent exited before answering {}",
                        method
                    )))
                }
            };

            // Stray bytes from process logging need not be UTF-8
            let line = String::from_utf8_lossy(&raw);
            let message: Value = match serde_json::from_str(line.trim()) {
                Ok(v @ Value::Object(_)) => v,
                _ => {
                    debug!(line = %line, "Ignoring non-JSON agent output");
                    continue;
                }
            };

            if let Some(incoming) = message.get("method").and_then(Value::as_str) {
                let incoming = incoming.to_string();
                self.handle_incoming(&incoming, &message).await?;
                continue;
            }

            if message.get("id").and_then(Value::as_u64) != Some(id) {
                debug!(?message, "Ignoring response for another request");
                continue;
            }
            if let Some(error) = message.get("error") {
                return Err(HookError::Protocol(format!("{} failed: {}", method, error)));
            }
            return Ok(message.get("result").cloned().unwrap_or(Value::Null));
        }
    }

    /// Notifications update the transcript; agent-initiated requests get an answer
    async fn handle_incoming(&mut self, method: &str, message: &Value) -> Result<(), HookError> {
        let request_id = message.get("id").cloned();

        match (method, request_id) {
            ("session/update", None) => {
                let update = message.pointer("/params/update");
                let kind = update
                    .and_then(|u| u.get("sessionUpdate"))
                    .and_then(Value::as_str);
                if kind == Some("agent_message_chunk") {
                    if let Some(text) = update
                        .and_then(|u| u.pointer("/content/text"))
                        .and_then(Value::as_str)
                    {
                        self.output.push_str(text);
                    }
                }
                Ok(())
            }
            (_, None) => {
                debug!(method, "Ignoring agent notification");
                Ok(())
            }
            ("session/request_permission", Some(id)) => {
                debug!("Declining agent permission request");
                self.send(&json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {"outcome": {"outcome": "cancelled"}}
                }))
                .await
            }
            (_, Some(id)) => {
                self.send(&json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": METHOD_NOT_FOUND, "message": format!("Method not found: {}", method)}
                }))
                .await
            }
        }
    }

    async fn send(&mut self, message: &Value) -> Result<(), HookError> {
        let line = message.to_string() + "\n";
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| HookError::Protocol(format!("Failed to write to agent: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| HookError::Protocol(format!("Failed to write to agent: {}", e)))
    }

    /// Terminate the process; agents do not exit on their own after a turn
    async fn shutdown(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(command = %self.command, error = %e, "Failed to kill local agent");
        } else {
            debug!(command = %self.command, "Local agent stopped");
        }
    }
}
