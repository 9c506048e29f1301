use anyhow::{anyhow, Result};
use hookwork_runtime::{
    ExecutionStatus, HookworkConfig, OperationType, TriggerEvent, TriggerOutput, TriggerRegistry,
    TriggerSystem, TriggerTiming,
};
use std::path::Path;
use tokio::sync::mpsc;

use super::Workspace;

pub struct FireRequest {
    pub system: String,
    pub operation: String,
    pub timing: Option<String>,
    pub output_path: Option<String>,
}

impl FireRequest {
    fn to_event(&self) -> Result<TriggerEvent> {
        let system: TriggerSystem = self.system.parse().map_err(|e: String| anyhow!(e))?;
        let operation: OperationType = self.operation.parse().map_err(|e: String| anyhow!(e))?;
        let mut event = TriggerEvent::new(system, operation);
        if let Some(timing) = &self.timing {
            event = event.with_timing(timing.parse::<TriggerTiming>().map_err(|e| anyhow!(e))?);
        }
        if let Some(path) = &self.output_path {
            event = event.with_output(TriggerOutput {
                output_path: Some(path.clone()),
                ..Default::default()
            });
        }
        Ok(event)
    }
}

/// Publish one trigger, run the hooks it matches and print their results as JSON
pub async fn execute(request: FireRequest, config: &HookworkConfig, root: &Path) -> Result<()> {
    let event = request.to_event()?;
    let workspace = Workspace::open(config, root).await?;
    let engine = workspace.engine(config);

    // Run through the registry so listeners see the same event stream a host would
    let triggers = TriggerRegistry::with_history_capacity(config.triggers.history_capacity);
    let (tx, mut rx) = mpsc::unbounded_channel();
    triggers.subscribe_fn("hookwork-cli", move |event| {
        tx.send(event.clone())
            .map_err(|_| anyhow!("Trigger receiver closed"))
    });
    if !triggers.fire_trigger_with_context(event) {
        anyhow::bail!("Trigger {}/{} was rejected", request.system, request.operation);
    }
    drop(triggers);

    let mut results = Vec::new();
    while let Some(event) = rx.recv().await {
        results.extend(engine.execute_hooks_for_trigger(&event).await);
    }

    println!("{}", serde_json::to_string_pretty(&results)?);

    let failed = results
        .iter()
        .filter(|r| matches!(r.status, ExecutionStatus::Failure | ExecutionStatus::Timeout))
        .count();
    if failed > 0 {
        anyhow::bail!("{} of {} hooks failed", failed, results.len());
    }
    Ok(())
}
