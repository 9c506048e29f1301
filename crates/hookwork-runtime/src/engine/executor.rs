use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::adapter::{ActionAdapters, ActionOutcome};
use super::log::{ExecutionLog, ExecutionResult, ExecutionStatus, DEFAULT_LOG_CAPACITY};
use crate::context::{build_trigger_context, ExecutionContext, TriggerContext, MAX_CHAIN_DEPTH};
use crate::error::{ExecutionError, HookError, TimeoutPhase};
use crate::hooks::{Action, ActionKind, Hook, HookManager};
use crate::host::{LogNotifier, Notifier, RecoveryChoice, VersionControl};
use crate::trigger::{SubscriptionId, TriggerEvent, TriggerRegistry};

/// Default per-action timeout
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Hook lifecycle notifications
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Started {
        hook_id: String,
        execution_id: String,
        chain_depth: u32,
    },
    Completed(ExecutionResult),
    Failed(ExecutionResult),
    Skipped(ExecutionResult),
}

/// Runs hooks matched by triggers through the cycle/depth guards and the action adapters
pub struct HookEngine {
    hooks: Arc<HookManager>,
    adapters: ActionAdapters,
    notifier: Arc<dyn Notifier>,
    vcs: Option<Arc<dyn VersionControl>>,
    timeout: Duration,
    kind_timeouts: DashMap<ActionKind, Duration>,
    log: ExecutionLog,
    events: broadcast::Sender<EngineEvent>,
}

impl HookEngine {
    pub fn new(hooks: Arc<HookManager>, adapters: ActionAdapters) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            hooks,
            adapters,
            notifier: Arc::new(LogNotifier),
            vcs: None,
            timeout: DEFAULT_ACTION_TIMEOUT,
            kind_timeouts: DashMap::new(),
            log: ExecutionLog::new(DEFAULT_LOG_CAPACITY),
            events,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Source of branch/user values for templates
    pub fn with_version_control(mut self, vcs: Arc<dyn VersionControl>) -> Self {
        self.vcs = Some(vcs);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the timeout for one action kind
    pub fn configure_timeout(&self, kind: ActionKind, timeout: Duration) {
        self.kind_timeouts.insert(kind, timeout);
    }

    /// Timeout for an action kind (override or default)
    pub fn get_timeout(&self, kind: ActionKind) -> Duration {
        self.kind_timeouts
            .get(&kind)
            .map(|t| *t)
            .unwrap_or(self.timeout)
    }

    /// Timeout for one action: a kind override wins, then the adapter's own
    /// budget, then the engine default
    pub fn timeout_for(&self, action: &Action) -> Duration {
        if let Some(t) = self.kind_timeouts.get(&action.kind()) {
            return *t;
        }
        self.adapters
            .time_budget(action)
            .unwrap_or(self.timeout)
    }

    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log = ExecutionLog::new(capacity);
        self
    }

    pub fn hooks(&self) -> &Arc<HookManager> {
        &self.hooks
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Subscribe to `triggers`. Each event is queued to a worker that runs
    /// the batch in its own task, so firing never blocks on hook execution.
    /// Must be called inside a Tokio runtime.
    pub fn attach(self: &Arc<Self>, triggers: &TriggerRegistry) -> SubscriptionId {
        let (tx, mut rx) = mpsc::unbounded_channel::<TriggerEvent>();

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    engine.execute_hooks_for_trigger(&event).await;
                });
            }
            debug!("Hook engine worker stopped");
        });

        triggers.subscribe_fn("hook-engine", move |event| {
            tx.send(event.clone())
                .map_err(|_| anyhow!("Hook engine worker is gone"))
        })
    }

    /// Run every enabled hook matching the event, oldest first, sequentially
    /// against one shared execution context.
    pub async fn execute_hooks_for_trigger(&self, event: &TriggerEvent) -> Vec<ExecutionResult> {
        let hooks = self
            .hooks
            .get_enabled_hooks_for(event.system, event.operation)
            .await;
        if hooks.is_empty() {
            debug!(system = %event.system, operation = %event.operation, "No hooks for trigger");
            return Vec::new();
        }

        info!(
            system = %event.system,
            operation = %event.operation,
            count = hooks.len(),
            "Executing hooks for trigger"
        );

        let mut ctx = ExecutionContext::new();
        let mut results = Vec::with_capacity(hooks.len());
        for hook in &hooks {
            results.push(self.execute_hook_in(hook, &mut ctx, Some(event)).await);
        }
        results
    }

    /// Run one hook in a fresh execution context
    pub async fn execute_hook(&self, hook: &Hook, event: Option<&TriggerEvent>) -> ExecutionResult {
        let mut ctx = ExecutionContext::new();
        self.execute_hook_in(hook, &mut ctx, event).await
    }

    /// Run one hook within a caller-supplied context, for chained executions.
    /// Never fails; every outcome is reported in the result.
    pub async fn execute_hook_in(
        &self,
        hook: &Hook,
        ctx: &mut ExecutionContext,
        event: Option<&TriggerEvent>,
    ) -> ExecutionResult {
        let triggered_at = Utc::now().timestamp_millis();
        let started = Instant::now();

        if !hook.enabled {
            debug!(hook_id = %hook.id, "Hook disabled; skipping");
            let result = self.finish(hook, ctx, triggered_at, started, Attempt::skipped(None), None);
            return self.record(hook, result, false).await;
        }

        if hook.action.requires_reference_check() {
            let problems = self.hooks.validator().validate_references(&hook.action).await;
            if !problems.is_empty() {
                let err = HookError::Validation { errors: problems };
                warn!(hook_id = %hook.id, error = %err, "Hook references are no longer valid");
                self.notifier
                    .configuration_problem(hook, &err, &RecoveryChoice::ALL)
                    .await;
                let result =
                    self.finish(hook, ctx, triggered_at, started, Attempt::skipped(Some(err)), None);
                return self.record(hook, result, false).await;
            }
        }

        if ctx.has_executed(&hook.id) {
            let err = HookError::CircularDependency {
                hook_id: hook.id.clone(),
            };
            warn!(hook_id = %hook.id, execution_id = %ctx.execution_id, "Circular hook execution rejected");
            let result = self.finish(hook, ctx, triggered_at, started, Attempt::failed(err), None);
            return self.record(hook, result, false).await;
        }

        if ctx.chain_depth >= MAX_CHAIN_DEPTH {
            let err = HookError::MaxDepthExceeded {
                depth: ctx.chain_depth,
                max: MAX_CHAIN_DEPTH,
            };
            warn!(hook_id = %hook.id, depth = ctx.chain_depth, "Hook chain too deep");
            let result = self.finish(hook, ctx, triggered_at, started, Attempt::failed(err), None);
            return self.record(hook, result, false).await;
        }

        ctx.enter(&hook.id);
        let _ = self.events.send(EngineEvent::Started {
            hook_id: hook.id.clone(),
            execution_id: ctx.execution_id.clone(),
            chain_depth: ctx.chain_depth,
        });

        let snapshot = build_trigger_context(event, self.vcs.as_deref()).await;
        let action = hook.action.expand_templates(&snapshot);

        info!(
            hook_id = %hook.id,
            hook = %hook.name,
            action = %action.kind(),
            depth = ctx.chain_depth,
            "Dispatching hook"
        );

        let timeout = self.timeout_for(&action);
        let attempt = match tokio::time::timeout(timeout, self.adapters.dispatch(&action, &snapshot)).await {
            Ok(outcome) => Attempt::from(outcome),
            Err(_) => Attempt {
                status: ExecutionStatus::Timeout,
                error: Some(HookError::Timeout {
                    phase: TimeoutPhase::Action,
                    after_ms: timeout.as_millis() as u64,
                }),
                output: None,
                truncated: false,
            },
        };

        if let Some(err) = &attempt.error {
            if err.is_configuration_problem() {
                self.notifier
                    .configuration_problem(hook, err, &RecoveryChoice::ALL)
                    .await;
            } else {
                self.notifier.runtime_failure(hook, err).await;
            }
        }

        let result = self.finish(hook, ctx, triggered_at, started, attempt, Some(snapshot));
        self.record(hook, result, true).await
    }

    fn finish(
        &self,
        hook: &Hook,
        ctx: &ExecutionContext,
        triggered_at: i64,
        started: Instant,
        attempt: Attempt,
        snapshot: Option<TriggerContext>,
    ) -> ExecutionResult {
        ExecutionResult {
            id: uuid::Uuid::new_v4().to_string(),
            hook_id: hook.id.clone(),
            hook_name: hook.name.clone(),
            execution_id: ctx.execution_id.clone(),
            chain_depth: ctx.chain_depth,
            triggered_at,
            completed_at: Utc::now().timestamp_millis(),
            duration_ms: started.elapsed().as_millis() as u64,
            status: attempt.status,
            error: attempt.error.as_ref().map(ExecutionError::from),
            output: attempt.output,
            truncated: attempt.truncated,
            context_snapshot: snapshot,
        }
    }

    /// Append to the log, bump counters for dispatched attempts, and announce
    async fn record(&self, hook: &Hook, result: ExecutionResult, dispatched: bool) -> ExecutionResult {
        self.log.append(result.clone());

        if dispatched {
            if let Err(e) = self.hooks.record_execution(&hook.id, result.completed_at).await {
                warn!(hook_id = %hook.id, error = %e, "Failed to record hook execution");
            }
        }

        match result.status {
            ExecutionStatus::Success => {
                info!(hook_id = %hook.id, duration_ms = result.duration_ms, "Hook completed");
                let _ = self.events.send(EngineEvent::Completed(result.clone()));
            }
            ExecutionStatus::Skipped => {
                let _ = self.events.send(EngineEvent::Skipped(result.clone()));
            }
            ExecutionStatus::Failure | ExecutionStatus::Timeout => {
                let message = result.error.as_ref().map(|e| e.message.as_str()).unwrap_or("");
                warn!(hook_id = %hook.id, status = ?result.status, error = message, "Hook failed");
                let _ = self.events.send(EngineEvent::Failed(result.clone()));
            }
        }
        result
    }
}

struct Attempt {
    status: ExecutionStatus,
    error: Option<HookError>,
    output: Option<String>,
    truncated: bool,
}

impl Attempt {
    fn skipped(error: Option<HookError>) -> Self {
        Self {
            status: ExecutionStatus::Skipped,
            error,
            output: None,
            truncated: false,
        }
    }

    fn failed(error: HookError) -> Self {
        Self {
            status: ExecutionStatus::Failure,
            error: Some(error),
            output: None,
            truncated: false,
        }
    }
}

impl From<ActionOutcome> for Attempt {
    fn from(outcome: ActionOutcome) -> Self {
        let status = match (&outcome.error, outcome.success) {
            (_, true) => ExecutionStatus::Success,
            (Some(HookError::Timeout { .. }), false) => ExecutionStatus::Timeout,
            _ => ExecutionStatus::Failure,
        };
        Self {
            status,
            error: outcome.error,
            output: outcome.output,
            truncated: outcome.truncated,
        }
    }
}
