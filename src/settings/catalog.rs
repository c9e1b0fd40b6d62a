//! Catalogs of the choices the backend offers.

use serde::{Deserialize, Serialize};

pub const MIN_CLIP_SKIP: u32 = 1;
pub const MAX_CLIP_SKIP: u32 = 12;

/// A checkpoint the backend can load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Name users pick from
    pub display_name: String,
    /// Checkpoint title sent to the backend (may include folders)
    pub full_name: String,
    /// Token prepended to prompts drawn with this model
    #[serde(default)]
    pub activator_token: Option<String>,
}

impl ModelEntry {
    /// Full name with any folder prefix removed.
    pub fn short_name(&self) -> &str {
        strip_folders(&self.full_name)
    }

    pub fn activator(&self) -> Option<&str> {
        self.activator_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

pub fn strip_folders(name: &str) -> &str {
    let name = name.rsplit('/').next().unwrap_or(name);
    name.rsplit('\\').next().unwrap_or(name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalogs {
    #[serde(default)]
    pub models: Vec<ModelEntry>,
    #[serde(default = "default_samplers")]
    pub samplers: Vec<String>,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default = "default_facefix")]
    pub facefix: Vec<String>,
    #[serde(default)]
    pub hypernetworks: Vec<String>,
    #[serde(default = "default_upscalers")]
    pub upscalers: Vec<String>,
    /// Allowed widths and heights
    #[serde(default = "default_sizes")]
    pub sizes: Vec<u32>,
}

fn default_samplers() -> Vec<String> {
    [
        "Euler a",
        "Euler",
        "LMS",
        "Heun",
        "DPM2",
        "DPM2 a",
        "DPM++ 2S a",
        "DPM++ 2M",
        "DPM++ SDE",
        "DPM fast",
        "DPM adaptive",
        "LMS Karras",
        "DPM2 Karras",
        "DPM2 a Karras",
        "DPM++ 2S a Karras",
        "DPM++ 2M Karras",
        "DPM++ SDE Karras",
        "DDIM",
        "PLMS",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_facefix() -> Vec<String> {
    vec!["GFPGAN".to_string(), "CodeFormer".to_string()]
}

fn default_upscalers() -> Vec<String> {
    [
        "None",
        "Lanczos",
        "Nearest",
        "LDSR",
        "SwinIR 4x",
        "ESRGAN_4x",
        "R-ESRGAN 4x+",
        "R-ESRGAN 4x+ Anime6B",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_sizes() -> Vec<u32> {
    (192..=1024).step_by(64).collect()
}

impl Default for Catalogs {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            samplers: default_samplers(),
            styles: Vec::new(),
            facefix: default_facefix(),
            hypernetworks: Vec::new(),
            upscalers: default_upscalers(),
            sizes: default_sizes(),
        }
    }
}

impl Catalogs {
    /// Find a model by display name (case-insensitive) or full name.
    pub fn find_model(&self, name: &str) -> Option<(usize, &ModelEntry)> {
        let name = name.trim();
        self.models.iter().enumerate().find(|(_, m)| {
            m.display_name.eq_ignore_ascii_case(name)
                || m.full_name == name
                || m.short_name() == name
        })
    }

    pub fn model_at(&self, index: usize) -> Option<&ModelEntry> {
        self.models.get(index)
    }

    pub fn has_sampler(&self, name: &str) -> bool {
        self.samplers.iter().any(|s| s == name)
    }

    pub fn has_style(&self, name: &str) -> bool {
        self.styles.iter().any(|s| s == name)
    }

    pub fn has_facefix(&self, name: &str) -> bool {
        self.facefix.iter().any(|s| s == name)
    }

    pub fn has_hypernetwork(&self, name: &str) -> bool {
        self.hypernetworks.iter().any(|s| s == name)
    }

    pub fn has_upscaler(&self, name: &str) -> bool {
        self.upscalers.iter().any(|s| s == name)
    }

    pub fn has_size(&self, size: u32) -> bool {
        self.sizes.contains(&size)
    }
}
