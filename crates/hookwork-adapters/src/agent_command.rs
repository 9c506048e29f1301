use std::sync::Arc;

use async_trait::async_trait;
use hookwork_runtime::error::FieldError;
use hookwork_runtime::hooks::AgentCommandParams;
use hookwork_runtime::{ActionAdapter, ActionOutput, ChatHost, HookError, TriggerContext};
use tracing::info;

/// Sends a slash-style command to the chat host
pub struct AgentCommandAdapter {
    host: Arc<dyn ChatHost>,
}

impl AgentCommandAdapter {
    pub fn new(host: Arc<dyn ChatHost>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl ActionAdapter<AgentCommandParams> for AgentCommandAdapter {
    fn validate(&self, params: &AgentCommandParams) -> Vec<FieldError> {
        if params.command.trim().is_empty() {
            vec![FieldError::new("action.parameters.command", "Command is required")]
        } else {
            Vec::new()
        }
    }

    async fn execute(
        &self,
        params: &AgentCommandParams,
        _ctx: &TriggerContext,
    ) -> Result<ActionOutput, HookError> {
        let command = params.command.trim();
        info!(command, "Sending agent command");

        self.host
            .send_prompt(command)
            .await
            .map_err(|e| HookError::ActionFailed(format!("Failed to send command: {}", e)))?;

        Ok(ActionOutput::text(format!("Sent {}", command)))
    }
}
