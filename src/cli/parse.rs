//! CLI parse: clap types for aiya. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// aiya - Stable Diffusion chat-bot job dispatch engine
#[derive(Parser)]
#[command(name = "aiya")]
#[command(about = "Job dispatch engine for a Stable Diffusion chat bot")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (searched for config/config.toml)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path, layered above the workspace files
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the engine, reading host events from stdin and writing replies to stdout
    Serve {
        /// Accept events but never start the workers
        #[arg(long)]
        hold_workers: bool,
    },
    /// Validate the configuration and print the effective values as TOML
    CheckConfig,
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Serve { .. } => "serve",
            Commands::CheckConfig => "check-config",
        }
    }
}
