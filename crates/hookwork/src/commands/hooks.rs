use anyhow::{anyhow, Context, Result};
use hookwork_runtime::HookworkConfig;
use std::path::Path;

use super::Workspace;
use crate::cli::HookCommands;

pub async fn execute(action: HookCommands, config: &HookworkConfig, root: &Path) -> Result<()> {
    let workspace = Workspace::open(config, root).await?;
    let manager = &workspace.manager;

    match action {
        HookCommands::List => {
            let hooks = manager.get_all_hooks().await;
            if hooks.is_empty() {
                println!("No hooks configured");
            }
            for hook in hooks {
                println!(
                    "{}\t{}\t{}\t{}/{}\t{}",
                    hook.id,
                    if hook.enabled { "enabled" } else { "disabled" },
                    hook.name,
                    hook.trigger.system,
                    hook.trigger.operation,
                    hook.action.kind()
                );
            }
        }
        HookCommands::Show { id } => {
            let hook = manager
                .get_hook(&id)
                .await
                .ok_or_else(|| anyhow!("Hook not found: {}", id))?;
            println!("{}", serde_json::to_string_pretty(&hook)?);
        }
        HookCommands::Enable { id } => {
            let hook = manager.set_enabled(&id, true).await?;
            println!("Enabled {}", hook.name);
        }
        HookCommands::Disable { id } => {
            let hook = manager.set_enabled(&id, false).await?;
            println!("Disabled {}", hook.name);
        }
        HookCommands::Delete { id } => {
            if !manager.delete_hook(&id).await? {
                anyhow::bail!("Hook not found: {}", id);
            }
            println!("Deleted {}", id);
        }
        HookCommands::Import { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let count = manager.import_hooks(&json).await?;
            println!("Imported {} hooks", count);
        }
        HookCommands::Export { file } => {
            let json = manager.export_hooks().await?;
            std::fs::write(&file, json).with_context(|| format!("Failed to write {:?}", file))?;
            println!("Exported hooks to {:?}", file);
        }
    }

    Ok(())
}
