//! Merge rules: defaults, override order, conflict handling.
//!
//! Later sources override earlier ones key by key; tables are merged, arrays replaced.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Prefix of environment overrides, e.g. `AIYA__BACKEND__URL`.
pub const ENV_PREFIX: &str = "AIYA";

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("backend.url", "http://127.0.0.1:7860")?
        .set_default("backend.connect_timeout_secs", 10)?
        .set_default("dispatch.start_workers", true)?
        .set_default("dispatch.idle_poll_ms", 100)?
        .set_default("dispatch.stop_grace_ms", 30_000)?
        .set_default("logging.level", "info")
}

/// Environment overrides, always the last source.
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
