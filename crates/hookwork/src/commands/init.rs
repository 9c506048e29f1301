use anyhow::Result;
use hookwork_runtime::config::render_config;
use hookwork_runtime::HookworkConfig;
use std::path::Path;

/// Write a config file holding every default
pub fn run_init(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Config already exists at {:?}", path);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = format!("# Hookwork configuration\n{}", render_config(&HookworkConfig::default())?);
    std::fs::write(path, content)?;
    println!("Created config at {:?}", path);
    Ok(())
}
