//! Config loading facade: assembles the sources in precedence order and deserializes.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::BotConfig;
use crate::error::BotError;
use config::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads [`BotConfig`] from layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from every source: defaults, global file, workspace files, environment.
    pub fn load(workspace_root: &Path) -> Result<BotConfig, BotError> {
        Self::load_with(workspace_root, None)
    }

    /// Load like [`ConfigLoader::load`], with `explicit` layered above the workspace files.
    /// The explicit file must exist.
    pub fn load_with(
        workspace_root: &Path,
        explicit: Option<&Path>,
    ) -> Result<BotConfig, BotError> {
        let mut builder = merge_policy::builder_with_defaults()?;
        builder = global_file::add_to_builder(builder)?;
        builder = workspace_file::add_to_builder(builder, workspace_root)?;
        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(merge_policy::environment());

        let config: BotConfig = builder.build()?.try_deserialize()?;
        debug!(
            workspace_root = %workspace_root.display(),
            explicit = ?explicit,
            backend = %config.backend.url,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load defaults, one file and the environment, ignoring global and workspace files.
    pub fn load_from_file(path: &Path) -> Result<BotConfig, BotError> {
        let config = merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .add_source(merge_policy::environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Location of the user-level config file, if a home directory is known.
    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
