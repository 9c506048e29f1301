use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum HookCommands {
    /// List configured hooks
    List,
    /// Print one hook as JSON
    Show {
        /// Hook id
        id: String,
    },
    /// Enable a hook
    Enable { id: String },
    /// Disable a hook without deleting it
    Disable { id: String },
    /// Delete a hook
    Delete { id: String },
    /// Import hooks from a JSON array file
    Import {
        /// File produced by `hooks export` or written by hand
        file: PathBuf,
    },
    /// Export all hooks to a JSON file
    Export { file: PathBuf },
}

#[derive(Parser)]
#[command(name = "hookwork")]
#[command(about = "Hookwork - run automation hooks after workflow operations", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file
    #[arg(long, default_value = "hookwork.toml")]
    pub config: PathBuf,

    /// Workspace the hooks act on (repository root)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new config file
    Init {
        /// Path for new config file
        #[arg(default_value = "hookwork.toml")]
        path: PathBuf,
    },
    /// Manage hooks
    Hooks {
        #[command(subcommand)]
        action: HookCommands,
    },
    /// Publish a trigger and run the hooks it matches
    Fire {
        /// Upstream system (speckit, openspec, gatomia, devspark)
        #[arg(long)]
        system: String,
        /// Operation that just ran, e.g. specify or plan
        #[arg(long)]
        operation: String,
        /// before or after (defaults to after)
        #[arg(long)]
        timing: Option<String>,
        /// Document the operation produced
        #[arg(long)]
        output_path: Option<String>,
    },
}
