//! Configuration System
//!
//! Layered configuration for the bot: built-in defaults, a user-level file, workspace files,
//! an explicit `--config` file and `AIYA__SECTION__KEY` environment overrides, merged with
//! the `config` crate and deserialized into [`BotConfig`].

use crate::error::BotError;
use crate::logging::LoggingConfig;
use crate::settings::{Catalogs, GuildDefaults, MAX_CLIP_SKIP, MIN_CLIP_SKIP};
use crate::validation::{MAX_GUIDANCE_SCALE, MIN_GUIDANCE_SCALE};
use serde::{Deserialize, Serialize};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Inference backend connection
    #[serde(default)]
    pub backend: BackendConfig,

    /// Worker behaviour
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Fallback guild defaults and backend catalogs
    #[serde(default)]
    pub settings: SettingsConfig,

    /// Flavour lines for queue notices
    #[serde(default = "default_messages")]
    pub messages: Vec<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_messages() -> Vec<String> {
    [
        "I'm imagining it!",
        "Give me a moment to paint this.",
        "Warming up the brushes!",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            dispatch: DispatchConfig::default(),
            settings: SettingsConfig::default(),
            messages: default_messages(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Web UI backend connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,
    /// HTTP basic auth for the API
    #[serde(default)]
    pub api_user: Option<String>,
    #[serde(default)]
    pub api_pass: Option<String>,
    /// Form login at `/login`, when the web UI is password protected
    #[serde(default)]
    pub gradio_user: Option<String>,
    #[serde(default)]
    pub gradio_pass: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_backend_url() -> String {
    "http://127.0.0.1:7860".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            api_user: None,
            api_pass: None,
            gradio_user: None,
            gradio_pass: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl BackendConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(format!("url must start with http:// or https://, got '{}'", self.url));
        }
        if self.connect_timeout_secs == 0 {
            return Err("connect_timeout_secs must be greater than 0".to_string());
        }
        if self.api_user.is_some() != self.api_pass.is_some() {
            return Err("api_user and api_pass must be set together".to_string());
        }
        if self.gradio_user.is_some() != self.gradio_pass.is_some() {
            return Err("gradio_user and gradio_pass must be set together".to_string());
        }
        Ok(())
    }
}

/// Worker behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Start the generation and post workers when serving
    #[serde(default = "default_true")]
    pub start_workers: bool,
    /// Fallback wake-up interval of idle workers
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    /// How long `stop` waits for in-flight work before aborting the workers
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_idle_poll_ms() -> u64 {
    100
}

fn default_stop_grace_ms() -> u64 {
    30_000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            start_workers: true,
            idle_poll_ms: default_idle_poll_ms(),
            stop_grace_ms: default_stop_grace_ms(),
        }
    }
}

/// Fallback guild defaults and the catalogs requests are checked against
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default)]
    pub defaults: GuildDefaults,
    #[serde(default)]
    pub catalogs: Catalogs,
}

impl SettingsConfig {
    pub fn validate(&self) -> Result<(), String> {
        let defaults = &self.defaults;
        let catalogs = &self.catalogs;
        if catalogs.sizes.is_empty() {
            return Err("catalogs.sizes cannot be empty".to_string());
        }
        if defaults.default_steps == 0 || defaults.default_steps > defaults.max_steps {
            return Err(format!(
                "default_steps must be in 1..={}, got {}",
                defaults.max_steps, defaults.default_steps
            ));
        }
        if defaults.default_count == 0 || defaults.default_count > defaults.max_count {
            return Err(format!(
                "default_count must be in 1..={}, got {}",
                defaults.max_count, defaults.default_count
            ));
        }
        for size in [defaults.default_width, defaults.default_height] {
            if !catalogs.has_size(size) {
                return Err(format!("default size {} is not in catalogs.sizes", size));
            }
        }
        if !catalogs.has_sampler(&defaults.sampler) {
            return Err(format!("sampler '{}' is not in catalogs.samplers", defaults.sampler));
        }
        if !(MIN_CLIP_SKIP..=MAX_CLIP_SKIP).contains(&defaults.clip_skip) {
            return Err(format!(
                "clip_skip must be in {}..={}, got {}",
                MIN_CLIP_SKIP, MAX_CLIP_SKIP, defaults.clip_skip
            ));
        }
        if !(MIN_GUIDANCE_SCALE..=MAX_GUIDANCE_SCALE).contains(&defaults.guidance_scale) {
            return Err(format!(
                "guidance_scale must be in {}..={}, got {}",
                MIN_GUIDANCE_SCALE, MAX_GUIDANCE_SCALE, defaults.guidance_scale
            ));
        }
        if !defaults.data_model.is_empty() && catalogs.find_model(&defaults.data_model).is_none() {
            return Err(format!(
                "data_model '{}' is not in catalogs.models",
                defaults.data_model
            ));
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Backend(String),
    Dispatch(String),
    Settings(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Backend(msg) => write!(f, "Backend: {}", msg),
            ValidationError::Dispatch(msg) => write!(f, "Dispatch: {}", msg),
            ValidationError::Settings(msg) => write!(f, "Settings: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

impl BotConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.backend.validate() {
            errors.push(ValidationError::Backend(e));
        }

        if self.dispatch.idle_poll_ms == 0 {
            errors.push(ValidationError::Dispatch(
                "idle_poll_ms must be greater than 0".to_string(),
            ));
        }

        if let Err(e) = self.settings.validate() {
            errors.push(ValidationError::Settings(e));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError::Logging(format!(
                "unknown level '{}'",
                self.logging.level
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold every problem into one `BotError`.
    pub fn ensure_valid(&self) -> Result<(), BotError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            BotError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })
    }

    /// The effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, BotError> {
        toml::to_string_pretty(self)
            .map_err(|e| BotError::ConfigError(format!("Failed to render config: {}", e)))
    }
}
