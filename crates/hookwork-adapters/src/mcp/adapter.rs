use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hookwork_runtime::config::ToolServerConfig;
use hookwork_runtime::error::{looks_transient, EntityKind, FieldError, TimeoutPhase};
use hookwork_runtime::hooks::{ToolServerParams, ToolTarget};
use hookwork_runtime::host::ServerStatus;
use hookwork_runtime::{ActionAdapter, ActionOutput, HookError, ToolCatalog, TriggerContext};
use serde_json::Value;
use tracing::{info, warn};

use super::pool::ConcurrencyPool;
use super::resolver::resolve_arguments;

/// Retry, timeout and output limits for tool-server calls
#[derive(Debug, Clone)]
pub struct ToolServerSettings {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub default_timeout_ms: u64,
    pub max_output_bytes: usize,
}

impl ToolServerSettings {
    /// Worst case for one tool call: every attempt times out and every retry
    /// waits out the delay
    pub fn call_budget(&self, timeout_ms: u64) -> Duration {
        let attempts = self.max_retries.saturating_add(1);
        Duration::from_millis(timeout_ms) * attempts + self.retry_delay * self.max_retries
    }
}

impl Default for ToolServerSettings {
    fn default() -> Self {
        Self::from(&ToolServerConfig::default())
    }
}

impl From<&ToolServerConfig> for ToolServerSettings {
    fn from(config: &ToolServerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            default_timeout_ms: config.default_timeout_ms,
            max_output_bytes: config.max_output_bytes,
        }
    }
}

/// Calls tools on external tool servers through the shared pool
pub struct ToolServerAdapter {
    catalog: Arc<dyn ToolCatalog>,
    pool: Arc<ConcurrencyPool>,
    settings: ToolServerSettings,
}

impl ToolServerAdapter {
    pub fn new(catalog: Arc<dyn ToolCatalog>, pool: Arc<ConcurrencyPool>) -> Self {
        Self {
            catalog,
            pool,
            settings: ToolServerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ToolServerSettings) -> Self {
        self.settings = settings;
        self
    }

    async fn call_target(
        &self,
        target: &ToolTarget,
        params: &ToolServerParams,
        ctx: &TriggerContext,
    ) -> Result<ActionOutput, HookError> {
        let server = self
            .catalog
            .get_server(&target.server_id)
            .await
            .map_err(|e| HookError::ServerUnavailable {
                server_id: target.server_id.clone(),
                reason: format!("discovery failed: {}", e),
            })?
            .ok_or_else(|| HookError::not_found(EntityKind::Server, &target.server_id))?;
        if server.status != ServerStatus::Available {
            return Err(HookError::ServerUnavailable {
                server_id: target.server_id.clone(),
                reason: format!("server status is {:?}", server.status).to_lowercase(),
            });
        }

        let tool = self
            .catalog
            .get_tool(&target.server_id, &target.tool_name)
            .await
            .map_err(|e| HookError::ServerUnavailable {
                server_id: target.server_id.clone(),
                reason: format!("tool lookup failed: {}", e),
            })?
            .ok_or_else(|| {
                HookError::not_found(
                    EntityKind::Tool,
                    format!("{}/{}", target.server_id, target.tool_name),
                )
            })?;

        let args = resolve_arguments(&params.parameter_mappings, ctx, &tool.input_schema);
        let check = self
            .catalog
            .validate_parameters(&target.server_id, &target.tool_name, &args)
            .await
            .map_err(|e| HookError::ActionFailed(format!("Parameter validation unavailable: {}", e)))?;
        if !check.valid {
            return Err(HookError::ParameterValidation {
                errors: check.errors,
            });
        }

        let timeout_ms = params.timeout.unwrap_or(self.settings.default_timeout_ms);
        let output = self.call_with_retry(target, args, timeout_ms).await?;
        Ok(truncate_output(output, self.settings.max_output_bytes))
    }

    /// Submit the call to the pool, retrying transient failures
    async fn call_with_retry(
        &self,
        target: &ToolTarget,
        args: Value,
        timeout_ms: u64,
    ) -> Result<Option<Value>, HookError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let call = self.catalog.execute_tool(
                &target.server_id,
                &target.tool_name,
                args.clone(),
                timeout_ms,
            );
            let timed = tokio::time::timeout(Duration::from_millis(timeout_ms), call);

            let (error, transient) = match self.pool.run(timed).await? {
                Ok(Ok(result)) if result.success => return Ok(result.output),
                Ok(Ok(result)) => {
                    let message = result
                        .error
                        .unwrap_or_else(|| "Tool call failed without an error message".to_string());
                    let transient = looks_transient(&message);
                    (HookError::ActionFailed(message), transient)
                }
                // Transport-level failures from the client
                Ok(Err(e)) => (HookError::ActionFailed(format!("{:#}", e)), true),
                Err(_) => (
                    HookError::Timeout {
                        phase: TimeoutPhase::Action,
                        after_ms: timeout_ms,
                    },
                    true,
                ),
            };

            if !transient || attempt > self.settings.max_retries {
                return Err(error);
            }
            warn!(
                server_id = %target.server_id,
                tool = %target.tool_name,
                attempt,
                error = %error,
                "Transient tool-server failure; retrying"
            );
            tokio::time::sleep(self.settings.retry_delay).await;
        }
    }
}

#[async_trait]
impl ActionAdapter<ToolServerParams> for ToolServerAdapter {
    /// Targets run one after another, each with its own retries
    fn time_budget(&self, params: &ToolServerParams) -> Option<Duration> {
        let timeout_ms = params.timeout.unwrap_or(self.settings.default_timeout_ms);
        let targets = params.targets().len().max(1) as u32;
        Some(self.settings.call_budget(timeout_ms) * targets)
    }

    fn validate(&self, params: &ToolServerParams) -> Vec<FieldError> {
        let targets = params.targets();
        if targets.is_empty() {
            return vec![FieldError::new(
                "action.parameters.selectedTools",
                "Select at least one tool",
            )];
        }
        let mut errors = Vec::new();
        for target in targets {
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
        errors
    }

    /// Targets run in order; the first failure stops the rest
    async fn execute(
        &self,
        params: &ToolServerParams,
        ctx: &TriggerContext,
    ) -> Result<ActionOutput, HookError> {
        let targets = params.targets();
        let mut outputs = Vec::with_capacity(targets.len());
        let mut truncated = false;

        for target in &targets {
            info!(server_id = %target.server_id, tool = %target.tool_name, "Calling tool");
            let out = self.call_target(target, params, ctx).await?;
            truncated |= out.truncated;
            if let Some(text) = out.output {
                outputs.push(text);
            }
        }

        Ok(ActionOutput {
            output: (!outputs.is_empty()).then(|| outputs.join("\n")),
            truncated,
        })
    }
}

/// Serialize tool output; anything whose JSON form exceeds `max_bytes` is cut
/// to about half and marked. Strings are returned unquoted.
pub fn truncate_output(output: Option<Value>, max_bytes: usize) -> ActionOutput {
    let (text, serialized_len) = match output {
        None | Some(Value::Null) => return ActionOutput::default(),
        Some(Value::String(s)) => {
            let len = serde_json::to_string(&s).map(|json| json.len()).unwrap_or(s.len());
            (s, len)
        }
        Some(other) => {
            let json = other.to_string();
            let len = json.len();
            (json, len)
        }
    };
    if serialized_len <= max_bytes {
        return ActionOutput::text(text);
    }

    let mut cut = (max_bytes / 2).min(text.len());
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    warn!(original_bytes = serialized_len, kept_bytes = cut, "Tool output truncated");
    ActionOutput {
        output: Some(format!(
            "{}\n\n[Output truncated: original size {} bytes]",
            &text[..cut],
            serialized_len
        )),
        truncated: true,
    }
}
