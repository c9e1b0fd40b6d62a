//! Settings
//!
//! Per-guild defaults and the backend catalogs. The engine only reads settings; the one
//! write path is `update_defaults`, used by the settings command of the platform layer.

use crate::error::{BotError, FieldError};
use crate::types::GuildId;
use serde::{Deserialize, Serialize};

pub mod catalog;
pub mod store;

pub use catalog::{strip_folders, Catalogs, ModelEntry, MAX_CLIP_SKIP, MIN_CLIP_SKIP};
pub use store::InMemorySettings;

/// Defaults applied to requests from one guild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildDefaults {
    #[serde(default)]
    pub negative_prompt: String,
    /// Display name of the default model; empty means the first catalog entry
    #[serde(default)]
    pub data_model: String,
    #[serde(default = "default_steps")]
    pub default_steps: u32,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_size")]
    pub default_width: u32,
    #[serde(default = "default_size")]
    pub default_height: u32,
    #[serde(default = "default_sampler")]
    pub sampler: String,
    #[serde(default = "default_count")]
    pub default_count: u32,
    #[serde(default = "default_max_count")]
    pub max_count: u32,
    #[serde(default = "default_clip_skip")]
    pub clip_skip: u32,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f64,
}

fn default_steps() -> u32 {
    30
}

fn default_max_steps() -> u32 {
    50
}

fn default_size() -> u32 {
    512
}

fn default_sampler() -> String {
    "Euler a".to_string()
}

fn default_count() -> u32 {
    1
}

fn default_max_count() -> u32 {
    1
}

fn default_clip_skip() -> u32 {
    1
}

fn default_guidance_scale() -> f64 {
    7.0
}

impl Default for GuildDefaults {
    fn default() -> Self {
        Self {
            negative_prompt: String::new(),
            data_model: String::new(),
            default_steps: default_steps(),
            max_steps: default_max_steps(),
            default_width: default_size(),
            default_height: default_size(),
            sampler: default_sampler(),
            default_count: default_count(),
            max_count: default_max_count(),
            clip_skip: default_clip_skip(),
            guidance_scale: default_guidance_scale(),
        }
    }
}

/// Requested changes to a guild's defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultsUpdate {
    pub negative_prompt: Option<String>,
    pub data_model: Option<String>,
    pub steps: Option<u32>,
    pub max_steps: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sampler: Option<String>,
    pub count: Option<u32>,
    pub max_count: Option<u32>,
    pub clip_skip: Option<u32>,
}

impl DefaultsUpdate {
    /// Apply to `defaults`, returning one report line per change or refusal.
    ///
    /// Ceilings are applied before the values they bound, so a request that sets both
    /// `max_steps` and `steps` is judged against the new ceiling.
    pub fn apply(
        &self,
        defaults: &mut GuildDefaults,
        catalogs: &Catalogs,
    ) -> Result<Vec<String>, BotError> {
        let mut errors = Vec::new();
        if let Some(model) = &self.data_model {
            if catalogs.find_model(model).is_none() {
                errors.push(FieldError::new("model", format!("unknown model '{}'", model)));
            }
        }
        for (name, value) in [("width", self.width), ("height", self.height)] {
            if let Some(size) = value {
                if !catalogs.has_size(size) {
                    errors.push(FieldError::new(name, format!("{} is not an allowed size", size)));
                }
            }
        }
        if let Some(sampler) = &self.sampler {
            if !catalogs.has_sampler(sampler) {
                errors.push(FieldError::new(
                    "sampler",
                    format!("unknown sampler '{}'", sampler),
                ));
            }
        }
        if let Some(clip_skip) = self.clip_skip {
            if !(MIN_CLIP_SKIP..=MAX_CLIP_SKIP).contains(&clip_skip) {
                errors.push(FieldError::new(
                    "clip_skip",
                    format!("must be between {} and {}", MIN_CLIP_SKIP, MAX_CLIP_SKIP),
                ));
            }
        }
        for (name, value) in [
            ("steps", self.steps),
            ("max_steps", self.max_steps),
            ("count", self.count),
            ("max_count", self.max_count),
        ] {
            if value == Some(0) {
                errors.push(FieldError::new(name, "must be at least 1"));
            }
        }
        if !errors.is_empty() {
            return Err(BotError::ValidationFailed(errors));
        }

        let mut report = Vec::new();
        if let Some(negative_prompt) = &self.negative_prompt {
            defaults.negative_prompt = negative_prompt.clone();
            report.push(format!("Negative prompts: ``\"{}\"``", negative_prompt));
        }
        if let Some(model) = &self.data_model {
            defaults.data_model = model.clone();
            report.push(format!("Data model: ``\"{}\"``", model));
        }
        if let Some(max_steps) = self.max_steps {
            defaults.max_steps = max_steps;
            report.push(format!("Max steps: ``{}``", max_steps));
            if max_steps < defaults.default_steps {
                defaults.default_steps = max_steps;
                report.push(format!(
                    "Default steps is too high! Lowering to ``{}``.",
                    max_steps
                ));
            }
        }
        if let Some(width) = self.width {
            defaults.default_width = width;
            report.push(format!("Width: ``\"{}\"``", width));
        }
        if let Some(height) = self.height {
            defaults.default_height = height;
            report.push(format!("Height: ``\"{}\"``", height));
        }
        if let Some(sampler) = &self.sampler {
            defaults.sampler = sampler.clone();
            report.push(format!("Sampler: ``\"{}\"``", sampler));
        }
        if let Some(max_count) = self.max_count {
            defaults.max_count = max_count;
            report.push(format!("Max count: ``{}``", max_count));
            if max_count < defaults.default_count {
                defaults.default_count = max_count;
                report.push(format!(
                    "Default count is too high! Lowering to ``{}``.",
                    max_count
                ));
            }
        }
        if let Some(clip_skip) = self.clip_skip {
            defaults.clip_skip = clip_skip;
            report.push(format!("CLIP skip: ``{}``", clip_skip));
        }
        if let Some(steps) = self.steps {
            if steps > defaults.max_steps {
                report.push(format!(
                    "Max steps is ``{}``! You can't go beyond it!",
                    defaults.max_steps
                ));
            } else {
                defaults.default_steps = steps;
                report.push(format!("Steps: ``{}``", steps));
            }
        }
        if let Some(count) = self.count {
            if count > defaults.max_count {
                report.push(format!(
                    "Max count is ``{}``! You can't go beyond it!",
                    defaults.max_count
                ));
            } else {
                defaults.default_count = count;
                report.push(format!("Count: ``{}``", count));
            }
        }
        Ok(report)
    }
}

/// Read access to defaults and catalogs, plus the defaults update path.
pub trait SettingsStore: Send + Sync {
    /// Defaults for a guild, falling back to the global defaults.
    fn defaults(&self, guild: Option<GuildId>) -> GuildDefaults;

    /// Current catalogs.
    fn catalogs(&self) -> Catalogs;

    /// Change a guild's defaults.
    fn update_defaults(
        &self,
        guild: GuildId,
        update: &DefaultsUpdate,
    ) -> Result<Vec<String>, BotError>;
}
