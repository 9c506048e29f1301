use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use hookwork_runtime::error::{EntityKind, FieldError};
use hookwork_runtime::hooks::{AgentType, CustomAgentParams};
use hookwork_runtime::host::{AgentAvailability, AgentInfo};
use hookwork_runtime::{ActionAdapter, ActionOutput, AgentRegistry, ChatHost, HookError, TriggerContext};
use serde::Deserialize;
use tracing::{debug, info, warn};

const AGENT_FILE_SUFFIX: &str = ".agent.md";

/// Invokes a registered custom agent through the chat host
pub struct CustomAgentAdapter {
    registry: Arc<dyn AgentRegistry>,
    host: Arc<dyn ChatHost>,
}

impl CustomAgentAdapter {
    pub fn new(registry: Arc<dyn AgentRegistry>, host: Arc<dyn ChatHost>) -> Self {
        Self { registry, host }
    }
}

#[async_trait]
impl ActionAdapter<CustomAgentParams> for CustomAgentAdapter {
    fn validate(&self, params: &CustomAgentParams) -> Vec<FieldError> {
        if params.agent_id.trim().is_empty() {
            return vec![FieldError::new("action.parameters.agentId", "Agent is required")];
        }
        Vec::new()
    }

    async fn execute(
        &self,
        params: &CustomAgentParams,
        _ctx: &TriggerContext,
    ) -> Result<ActionOutput, HookError> {
        let agent = self
            .registry
            .get_agent_by_id(&params.agent_id)
            .await
            .map_err(|e| HookError::ActionFailed(format!("Agent registry unavailable: {}", e)))?
            .ok_or_else(|| HookError::not_found(EntityKind::Agent, &params.agent_id))?;

        let availability = self
            .registry
            .check_agent_availability(&agent.id)
            .await
            .map_err(|e| HookError::ActionFailed(format!("Agent registry unavailable: {}", e)))?;
        if !availability.available {
            return Err(HookError::ActionFailed(format!(
                "Agent '{}' is unavailable: {}",
                agent.id,
                availability.reason.unwrap_or_else(|| "no reason given".to_string())
            )));
        }

        let background = params.agent_type == Some(AgentType::Background);
        info!(agent = %agent.id, background, "Invoking custom agent");
        self.host
            .invoke_agent(&agent, params.arguments.as_deref().filter(|a| !a.is_empty()))
            .await
            .map_err(|e| HookError::ActionFailed(format!("Failed to invoke agent: {}", e)))?;

        Ok(ActionOutput::text(format!("Invoked agent {}", agent.name)))
    }
}

/// Agents defined as `<id>.agent.md` files in one directory
pub struct FileAgentRegistry {
    dir: PathBuf,
}

impl FileAgentRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Every agent in the directory. A missing directory has no agents.
    pub async fn list_agents(&self) -> Result<Vec<AgentInfo>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = ?self.dir, "Agent directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e).context(format!("Failed to read {:?}", self.dir)),
        };

        let mut agents = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(id) = agent_id(&path) else {
                continue;
            };
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => match parse_agent(&id, &path, &content) {
                    Ok(agent) => agents.push(agent),
                    Err(e) => warn!(path = ?path, error = %format!("{:#}", e), "Skipping agent file"),
                },
                Err(e) => warn!(path = ?path, error = %e, "Skipping unreadable agent file"),
            }
        }
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(agents)
    }
}

fn agent_id(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let id = name.strip_suffix(AGENT_FILE_SUFFIX)?;
    (!id.is_empty()).then(|| id.to_string())
}

#[derive(Debug, Default, Deserialize)]
struct AgentFrontMatter {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// YAML between the leading `---` markers, if the file has any
fn front_matter(content: &str) -> Option<&str> {
    let rest = content.trim_start().strip_prefix("---")?;
    let end = rest.find("\n---")?;
    Some(&rest[..end])
}

/// Agent described by one file. Files without front matter use the id as
/// name; malformed YAML is an error.
fn parse_agent(id: &str, path: &Path, content: &str) -> Result<AgentInfo> {
    let meta: AgentFrontMatter = match front_matter(content) {
        Some(yaml) if !yaml.trim().is_empty() => {
            serde_yaml::from_str(yaml).context("Invalid YAML front matter")?
        }
        _ => AgentFrontMatter::default(),
    };

    let name = meta
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| id.to_string());
    Ok(AgentInfo {
        id: id.to_string(),
        name,
        description: meta.description.unwrap_or_default().trim().to_string(),
        source_path: Some(path.to_path_buf()),
    })
}

#[async_trait]
impl AgentRegistry for FileAgentRegistry {
    async fn get_agent_by_id(&self, id: &str) -> Result<Option<AgentInfo>> {
        Ok(self.list_agents().await?.into_iter().find(|a| a.id == id))
    }

    async fn check_agent_availability(&self, id: &str) -> Result<AgentAvailability> {
        Ok(match self.get_agent_by_id(id).await? {
            Some(_) => AgentAvailability {
                available: true,
                reason: None,
            },
            None => AgentAvailability {
                available: false,
                reason: Some(format!("No {}{} in {:?}", id, AGENT_FILE_SUFFIX, self.dir)),
            },
        })
    }
}
