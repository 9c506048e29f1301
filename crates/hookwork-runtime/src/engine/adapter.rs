use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use tracing::error;

use crate::context::TriggerContext;
use crate::error::{FieldError, HookError};
use crate::hooks::{
    Action, ActionKind, AgentCommandParams, CustomAgentParams, IssueTrackerParams,
    LocalAgentParams, ToolServerParams, VersionControlParams,
};

/// Successful adapter output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutput {
    pub output: Option<String>,
    /// Output was cut down to the size limit
    pub truncated: bool,
}

impl ActionOutput {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            truncated: false,
        }
    }
}

/// Uniform result every adapter reports
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub success: bool,
    pub output: Option<String>,
    pub truncated: bool,
    pub error: Option<HookError>,
    pub duration: Duration,
}

impl ActionOutcome {
    pub fn from_result(result: Result<ActionOutput, HookError>, duration: Duration) -> Self {
        match result {
            Ok(out) => Self {
                success: true,
                output: out.output,
                truncated: out.truncated,
                error: None,
                duration,
            },
            Err(e) => Self::failed(e, duration),
        }
    }

    pub fn failed(error: HookError, duration: Duration) -> Self {
        Self {
            success: false,
            output: None,
            truncated: false,
            error: Some(error),
            duration,
        }
    }
}

/// Performs one kind of action. `P` is the kind's parameter struct.
#[async_trait]
pub trait ActionAdapter<P: Send + Sync>: Send + Sync {
    /// Adapter-side parameter checks, run before any side effect
    fn validate(&self, _params: &P) -> Vec<FieldError> {
        Vec::new()
    }

    /// Longest this action may legitimately take, including the adapter's
    /// own timeouts and retries. `None` leaves it to the engine default.
    fn time_budget(&self, _params: &P) -> Option<Duration> {
        None
    }

    /// Run the action. Templates in `params` are already expanded.
    async fn execute(&self, params: &P, ctx: &TriggerContext) -> Result<ActionOutput, HookError>;
}

/// One optional adapter per action kind
#[derive(Default, Clone)]
pub struct ActionAdapters {
    pub agent_command: Option<Arc<dyn ActionAdapter<AgentCommandParams>>>,
    pub version_control: Option<Arc<dyn ActionAdapter<VersionControlParams>>>,
    pub issue_tracker: Option<Arc<dyn ActionAdapter<IssueTrackerParams>>>,
    pub tool_server: Option<Arc<dyn ActionAdapter<ToolServerParams>>>,
    pub custom_agent: Option<Arc<dyn ActionAdapter<CustomAgentParams>>>,
    pub local_agent: Option<Arc<dyn ActionAdapter<LocalAgentParams>>>,
}

impl ActionAdapters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent_command(mut self, a: Arc<dyn ActionAdapter<AgentCommandParams>>) -> Self {
        self.agent_command = Some(a);
        self
    }

    pub fn with_version_control(mut self, a: Arc<dyn ActionAdapter<VersionControlParams>>) -> Self {
        self.version_control = Some(a);
        self
    }

    pub fn with_issue_tracker(mut self, a: Arc<dyn ActionAdapter<IssueTrackerParams>>) -> Self {
        self.issue_tracker = Some(a);
        self
    }

    pub fn with_tool_server(mut self, a: Arc<dyn ActionAdapter<ToolServerParams>>) -> Self {
        self.tool_server = Some(a);
        self
    }

    pub fn with_custom_agent(mut self, a: Arc<dyn ActionAdapter<CustomAgentParams>>) -> Self {
        self.custom_agent = Some(a);
        self
    }

    pub fn with_local_agent(mut self, a: Arc<dyn ActionAdapter<LocalAgentParams>>) -> Self {
        self.local_agent = Some(a);
        self
    }

    /// Time budget the configured adapter declares for this action
    pub fn time_budget(&self, action: &Action) -> Option<Duration> {
        match action {
            Action::AgentCommand(p) => self.agent_command.as_ref()?.time_budget(p),
            Action::VersionControl(p) => self.version_control.as_ref()?.time_budget(p),
            Action::IssueTracker(p) => self.issue_tracker.as_ref()?.time_budget(p),
            Action::ToolServer(p) => self.tool_server.as_ref()?.time_budget(p),
            Action::CustomAgent(p) => self.custom_agent.as_ref()?.time_budget(p),
            Action::LocalAgent(p) => self.local_agent.as_ref()?.time_budget(p),
        }
    }

    /// Route an action to the adapter for its kind
    pub async fn dispatch(&self, action: &Action, ctx: &TriggerContext) -> ActionOutcome {
        match action {
            Action::AgentCommand(p) => run(self.agent_command.as_deref(), p, ctx, action.kind()).await,
            Action::VersionControl(p) => {
                run(self.version_control.as_deref(), p, ctx, action.kind()).await
            }
            Action::IssueTracker(p) => run(self.issue_tracker.as_deref(), p, ctx, action.kind()).await,
            Action::ToolServer(p) => run(self.tool_server.as_deref(), p, ctx, action.kind()).await,
            Action::CustomAgent(p) => run(self.custom_agent.as_deref(), p, ctx, action.kind()).await,
            Action::LocalAgent(p) => run(self.local_agent.as_deref(), p, ctx, action.kind()).await,
        }
    }
}

async fn run<P: Send + Sync>(
    adapter: Option<&dyn ActionAdapter<P>>,
    params: &P,
    ctx: &TriggerContext,
    kind: ActionKind,
) -> ActionOutcome {
    let started = Instant::now();
    let Some(adapter) = adapter else {
        return ActionOutcome::failed(
            HookError::ActionFailed(format!("No adapter configured for {} actions", kind)),
            started.elapsed(),
        );
    };

    let problems = adapter.validate(params);
    if !problems.is_empty() {
        return ActionOutcome::failed(HookError::Validation { errors: problems }, started.elapsed());
    }

    match AssertUnwindSafe(adapter.execute(params, ctx)).catch_unwind().await {
        Ok(result) => ActionOutcome::from_result(result, started.elapsed()),
        Err(_) => {
            error!(action = %kind, "Action adapter panicked");
            ActionOutcome::failed(
                HookError::ActionFailed(format!("{} adapter panicked", kind)),
                started.elapsed(),
            )
        }
    }
}
