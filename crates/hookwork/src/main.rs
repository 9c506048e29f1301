mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    hookwork_runtime::init_logging();

    let cli = Cli::parse();

    // Init runs before any config exists
    if let Commands::Init { path } = &cli.command {
        return commands::init::run_init(path);
    }

    let config = hookwork_runtime::load_config(Some(&cli.config))?;

    match cli.command {
        Commands::Init { .. } => unreachable!(),
        Commands::Hooks { action } => {
            commands::hooks::execute(action, &config, &cli.workspace).await?;
        }
        Commands::Fire {
            system,
            operation,
            timing,
            output_path,
        } => {
            let request = commands::fire::FireRequest {
                system,
                operation,
                timing,
                output_path,
            };
            commands::fire::execute(request, &config, &cli.workspace).await?;
        }
    }

    Ok(())
}
