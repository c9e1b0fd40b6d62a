//! Kind-specific job parameters.

use serde::{Deserialize, Serialize};

pub const DEFAULT_STRENGTH: f64 = 0.75;
pub const DEFAULT_COUNT: u32 = 1;
pub const DEFAULT_CLIP_SKIP: u32 = 1;

/// A fresh random 32-bit seed.
pub fn random_seed() -> u32 {
    rand::random::<u32>()
}

/// Build the full prompt from the model's activator token and the user's prompt.
///
/// The token is prepended, so the raw prompt is always the tail of the result.
pub fn compose_prompt(activator_token: Option<&str>, raw_prompt: &str) -> String {
    match activator_token.map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) => format!("{} {}", token, raw_prompt),
        None => raw_prompt.to_string(),
    }
}

/// Swap `old_raw` for `new_raw` inside a full prompt, keeping any activator prefix.
pub fn replace_raw_prompt(prompt: &str, old_raw: &str, new_raw: &str) -> String {
    if old_raw.is_empty() {
        return new_raw.to_string();
    }
    let position = if prompt.ends_with(old_raw) {
        Some(prompt.len() - old_raw.len())
    } else {
        prompt.rfind(old_raw)
    };
    match position {
        Some(pos) => {
            let mut out = String::with_capacity(prompt.len() - old_raw.len() + new_raw.len());
            out.push_str(&prompt[..pos]);
            out.push_str(new_raw);
            out.push_str(&prompt[pos + old_raw.len()..]);
            out
        }
        // A prompt that lost its raw segment cannot be patched; start over from the raw text.
        None => new_raw.to_string(),
    }
}

/// Reference to an image the backend should work on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    pub url: String,
}

impl ImageSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Parameters of a draw (txt2img / img2img) job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawParams {
    /// Full prompt sent to the backend (activator token + raw prompt)
    pub prompt: String,
    pub negative_prompt: String,
    /// Model full name (checkpoint title)
    pub data_model: String,
    pub steps: u32,
    pub width: u32,
    pub height: u32,
    pub guidance_scale: f64,
    pub sampler: String,
    pub seed: u32,
    /// Denoising strength, only used with an init image
    pub strength: f64,
    pub init_image: Option<ImageSource>,
    pub count: u32,
    pub style: Option<String>,
    pub facefix: Option<String>,
    pub highres_fix: bool,
    pub clip_skip: u32,
    /// Prompt exactly as the user typed it
    pub raw_prompt: String,
    /// Position of the model in the settings model catalog
    pub model_index: usize,
    pub hypernetwork: Option<String>,
}

impl DrawParams {
    /// Whether the prompt still carries the raw prompt.
    pub fn prompt_is_consistent(&self) -> bool {
        self.prompt.contains(&self.raw_prompt)
    }

    /// Copy with a new raw prompt patched into the full prompt.
    pub fn with_raw_prompt(&self, new_raw: &str) -> DrawParams {
        let mut next = self.clone();
        next.prompt = replace_raw_prompt(&self.prompt, &self.raw_prompt, new_raw);
        next.raw_prompt = new_raw.to_string();
        next
    }

    /// Copy with a different seed and nothing else changed.
    pub fn with_seed(&self, seed: u32) -> DrawParams {
        DrawParams {
            seed,
            ..self.clone()
        }
    }
}

/// Parameters of an upscale job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpscaleParams {
    pub image: ImageSource,
    /// Resize factor
    pub resize: f64,
    pub upscaler_1: String,
    #[serde(default)]
    pub upscaler_2: Option<String>,
    #[serde(default)]
    pub upscaler_2_strength: f64,
}

/// How an identified image gets described
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phrasing {
    #[default]
    Normal,
    Tags,
}

impl Phrasing {
    /// Interrogation model understood by the backend.
    pub fn backend_model(self) -> &'static str {
        match self {
            Phrasing::Normal => "clip",
            Phrasing::Tags => "deepdanbooru",
        }
    }
}

/// Parameters of an identify (interrogate) job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifyParams {
    pub image: ImageSource,
    #[serde(default)]
    pub phrasing: Phrasing,
}
