pub mod fire;
pub mod hooks;
pub mod init;

mod console;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use hookwork_adapters::{build_adapters, FileAgentRegistry, GitCli, GitHubIssues, HostServices};
use hookwork_runtime::{
    AgentRegistry, HookEngine, HookManager, HookValidator, HookworkConfig, Storage,
    VersionControl,
};
use tracing::debug;

/// Hook store and host services for one workspace
pub struct Workspace {
    pub manager: Arc<HookManager>,
    pub services: HostServices,
}

impl Workspace {
    /// Open the hook store and load the persisted hooks
    pub async fn open(config: &HookworkConfig, root: &Path) -> Result<Self> {
        let db_path = resolve_path(root, &config.storage.path);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let store = Arc::new(Storage::open(&db_path)?);

        let agents: Arc<dyn AgentRegistry> =
            Arc::new(FileAgentRegistry::new(resolve_path(root, &config.agents.directory)));
        let vcs: Arc<dyn VersionControl> = Arc::new(GitCli::new(root));
        let issues = GitHubIssues::from_env(&config.github.api_base, &config.github.token_env)?
            .with_version_control(vcs.clone());

        let manager = Arc::new(HookManager::new(
            store,
            HookValidator::new().with_agent_registry(agents.clone()),
        ));
        let count = manager.load().await?;
        debug!(count, db = ?db_path, "Hooks loaded");

        Ok(Self {
            manager,
            services: HostServices {
                chat: Arc::new(console::ConsoleChat),
                vcs,
                issues: Arc::new(issues),
                agents,
                tools: None,
            },
        })
    }

    /// Engine wired with every adapter the config enables
    /// Local-agent and tool-server actions get the time budget their adapter
    /// declares; everything else uses the engine timeout.
    pub fn engine(&self, config: &HookworkConfig) -> HookEngine {
        let adapters = build_adapters(config, &self.services);
        HookEngine::new(self.manager.clone(), adapters)
            .with_timeout(config.engine.timeout())
            .with_log_capacity(config.engine.log_capacity)
            .with_version_control(self.services.vcs.clone())
    }
}

/// Expand `~` and anchor relative paths at the workspace root
fn resolve_path(root: &Path, raw: &str) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(raw).as_ref());
    if expanded.is_absolute() {
        expanded
    } else {
        root.join(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookwork_adapters::local_agent::LOCAL_AGENT_GRACE;
    use hookwork_runtime::hooks::{AgentCommandParams, LocalAgentParams};
    use hookwork_runtime::Action;

    #[test]
    fn test_relative_paths_anchor_at_workspace() {
        let root = Path::new("/work/repo");
        assert_eq!(
            resolve_path(root, "./hookwork.db"),
            PathBuf::from("/work/repo/./hookwork.db")
        );
        assert_eq!(resolve_path(root, "/var/hooks.db"), PathBuf::from("/var/hooks.db"));
    }

    #[tokio::test]
    async fn test_local_agent_outlives_its_adapter_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let config = HookworkConfig::default();
        let workspace = Workspace::open(&config, dir.path()).await.unwrap();
        let engine = workspace.engine(&config);

        let local = Action::LocalAgent(LocalAgentParams::default());
        assert_eq!(
            engine.timeout_for(&local),
            config.local_agent.timeout() + LOCAL_AGENT_GRACE
        );
        let command = Action::AgentCommand(AgentCommandParams {
            command: "/speckit.clarify".into(),
        });
        assert_eq!(engine.timeout_for(&command), config.engine.timeout());
    }
}
