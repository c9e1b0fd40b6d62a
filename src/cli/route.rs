//! CLI route: run context and the command table.

use crate::backend::{InferenceBackend, WebUiBackend};
use crate::cli::host::{write_outputs, Host};
use crate::cli::parse::Commands;
use crate::config::{BotConfig, ConfigLoader};
use crate::error::BotError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Runtime context for CLI execution: workspace, config path and the loaded configuration.
pub struct RunContext {
    workspace_root: PathBuf,
    config_path: Option<PathBuf>,
    config: BotConfig,
}

impl RunContext {
    /// Load the layered configuration for `workspace_root`.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, BotError> {
        let config = ConfigLoader::load_with(&workspace_root, config_path.as_deref())?;
        Ok(Self {
            workspace_root,
            config_path,
            config,
        })
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Execute a command; the returned text goes to stdout.
    pub async fn execute(&self, command: &Commands) -> Result<String, BotError> {
        let started = Instant::now();
        let result = match command {
            Commands::Serve { hold_workers } => self.serve(*hold_workers).await,
            Commands::CheckConfig => self.check_config(),
        };
        info!(
            command = command.name(),
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    fn check_config(&self) -> Result<String, BotError> {
        self.config.ensure_valid()?;
        self.config.to_toml()
    }

    async fn serve(&self, hold_workers: bool) -> Result<String, BotError> {
        self.config.ensure_valid()?;
        let backend: Arc<dyn InferenceBackend> = Arc::new(WebUiBackend::new(&self.config.backend)?);

        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_outputs(rx, tokio::io::stdout()));
        let host = Host::new(&self.config, backend, tx);

        if self.config.dispatch.start_workers && !hold_workers {
            host.dispatch().start()?;
        }
        info!(
            workspace_root = %self.workspace_root.display(),
            config_path = ?self.config_path,
            backend = %self.config.backend.url,
            workers = host.dispatch().is_running(),
            "Serving host events on stdin"
        );

        let served = host.run(BufReader::new(tokio::io::stdin())).await;
        let dispatch = Arc::clone(host.dispatch());
        host.shutdown().await?;
        let stats = dispatch.stats();
        drop(dispatch);

        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Output stream failed"),
            Err(e) => warn!(error = %e, "Output writer task failed"),
        }
        served?;

        info!(
            admitted = stats.admitted,
            rejected = stats.rejected,
            completed = stats.completed,
            failed = stats.failed,
            posted = stats.posted,
            post_failures = stats.post_failures,
            "Host session ended"
        );
        // stdout carries the JSON lines; nothing else is printed
        Ok(String::new())
    }
}
