pub mod agent_command;
pub mod custom_agent;
pub mod issue_tracker;
pub mod local_agent;
pub mod mcp;
pub mod version_control;

pub use agent_command::AgentCommandAdapter;
pub use custom_agent::{CustomAgentAdapter, FileAgentRegistry};
pub use issue_tracker::{parse_github_repository, GitHubIssues, IssueTrackerAdapter};
pub use local_agent::LocalAgentAdapter;
pub use mcp::{ConcurrencyPool, ToolServerAdapter, ToolServerSettings};
pub use version_control::{GitCli, VersionControlAdapter};

use std::sync::Arc;

use hookwork_runtime::{
    ActionAdapters, AgentRegistry, ChatHost, HookworkConfig, IssueTracker, ToolCatalog,
    VersionControl,
};

/// External systems the adapters act on
#[derive(Clone)]
pub struct HostServices {
    pub chat: Arc<dyn ChatHost>,
    pub vcs: Arc<dyn VersionControl>,
    pub issues: Arc<dyn IssueTracker>,
    pub agents: Arc<dyn AgentRegistry>,
    /// Without a catalog, tool-server actions have no adapter
    pub tools: Option<Arc<dyn ToolCatalog>>,
}

/// One adapter per action kind, configured from `config`
pub fn build_adapters(config: &HookworkConfig, services: &HostServices) -> ActionAdapters {
    let mut adapters = ActionAdapters::new()
        .with_agent_command(Arc::new(AgentCommandAdapter::new(services.chat.clone())))
        .with_version_control(Arc::new(VersionControlAdapter::new(services.vcs.clone())))
        .with_issue_tracker(Arc::new(IssueTrackerAdapter::new(services.issues.clone())))
        .with_custom_agent(Arc::new(CustomAgentAdapter::new(
            services.agents.clone(),
            services.chat.clone(),
        )))
        .with_local_agent(Arc::new(LocalAgentAdapter::new(config.local_agent.timeout())));

    if let Some(tools) = &services.tools {
        let pool = Arc::new(ConcurrencyPool::new(config.tool_server.max_concurrent));
        adapters = adapters.with_tool_server(Arc::new(
            ToolServerAdapter::new(tools.clone(), pool)
                .with_settings(ToolServerSettings::from(&config.tool_server)),
        ));
    }
    adapters
}
