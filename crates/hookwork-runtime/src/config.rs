use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level `hookwork.toml`. Every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct HookworkConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub triggers: TriggersConfig,

    #[serde(default)]
    pub tool_server: ToolServerConfig,

    #[serde(default)]
    pub local_agent: LocalAgentConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub agents: AgentsConfig,

    #[serde(default)]
    pub github: GithubConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TriggersConfig {
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ToolServerConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_tool_timeout_ms")]
    pub default_timeout_ms: u64,

    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LocalAgentConfig {
    #[serde(default = "default_local_agent_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AgentsConfig {
    /// Directory scanned for `*.agent.md` definitions
    #[serde(default = "default_agents_dir")]
    pub directory: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GithubConfig {
    /// Environment variable holding the API token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_engine_timeout() -> u64 {
    30
}

fn default_log_capacity() -> usize {
    crate::engine::DEFAULT_LOG_CAPACITY
}

fn default_history_capacity() -> usize {
    crate::trigger::DEFAULT_HISTORY_CAPACITY
}

fn default_max_concurrent() -> usize {
    5
}

fn default_max_retries() -> u32 {
    1
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_tool_timeout_ms() -> u64 {
    30_000
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

fn default_local_agent_timeout() -> u64 {
    600
}

fn default_storage_path() -> String {
    "./hookwork.db".to_string()
}

fn default_agents_dir() -> String {
    ".github/agents".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_engine_timeout(),
            log_capacity: default_log_capacity(),
        }
    }
}

impl Default for TriggersConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
        }
    }
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            default_timeout_ms: default_tool_timeout_ms(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl Default for LocalAgentConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_local_agent_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            directory: default_agents_dir(),
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            api_base: default_api_base(),
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ToolServerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl LocalAgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Load config from file, or defaults when no path is given or the file does not exist
pub fn load_config(path: Option<&Path>) -> Result<HookworkConfig> {
    match path {
        Some(path) if path.exists() => {
            let content = fs::read_to_string(path)
                .context(format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")
        }
        _ => Ok(HookworkConfig::default()),
    }
}

/// Serialize the config as TOML, for `hookwork init`
pub fn render_config(config: &HookworkConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize config")
}
