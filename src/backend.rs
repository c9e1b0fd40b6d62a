//! Inference Backend
//!
//! The contract the generation worker uses to reach the Stable Diffusion web UI, plus the
//! payload builders that turn job parameters into backend requests. Only the generation
//! worker holds a backend, so implementations may assume calls never overlap.

use crate::error::BackendError;
use crate::job::{DrawParams, IdentifyParams, UpscaleParams};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub mod webui;

pub use webui::WebUiBackend;

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// One backend call: the JSON payload plus the model it must run on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendRequest {
    pub payload: Value,
    /// Checkpoint to load before running, when the call depends on one
    pub selected_model: Option<String>,
}

impl BackendRequest {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            selected_model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.selected_model = if model.is_empty() { None } else { Some(model) };
        self
    }

    /// Whether the payload carries init images (img2img).
    pub fn is_img2img(&self) -> bool {
        self.payload
            .get("init_images")
            .and_then(Value::as_array)
            .is_some_and(|images| !images.is_empty())
    }
}

/// Images returned by a generate call, already decoded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedImages {
    pub images: Vec<Vec<u8>>,
    /// Backend generation info, passed through untouched
    pub info: Option<String>,
}

/// Stable Diffusion backend
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// txt2img, or img2img when the payload carries init images
    async fn generate(&self, request: BackendRequest) -> Result<GeneratedImages, BackendError>;

    /// Upscale a single image
    async fn upscale(&self, request: BackendRequest) -> Result<Vec<u8>, BackendError>;

    /// Describe an image, returning the caption
    async fn interrogate(&self, request: BackendRequest) -> Result<String, BackendError>;

    /// Download a user-supplied image
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, BackendError>;

    fn name(&self) -> &str;
}

/// Encode image bytes as the data URL the web UI accepts.
pub fn data_url(bytes: &[u8]) -> String {
    format!("{}{}", DATA_URL_PREFIX, STANDARD.encode(bytes))
}

/// Decode a base64 image from a backend response, with or without a data URL prefix.
pub fn decode_image(encoded: &str) -> Result<Vec<u8>, BackendError> {
    let body = match encoded.split_once(";base64,") {
        Some((_, body)) => body,
        None => encoded,
    };
    STANDARD
        .decode(body.trim())
        .map_err(|e| BackendError::Decode(format!("invalid base64 image: {}", e)))
}

/// Build the generate request for a draw. `init_image` is the data URL of the source image.
pub fn draw_request(params: &DrawParams, init_image: Option<String>) -> BackendRequest {
    let mut payload = json!({
        "prompt": params.prompt,
        "negative_prompt": params.negative_prompt,
        "steps": params.steps,
        "width": params.width,
        "height": params.height,
        "cfg_scale": params.guidance_scale,
        "sampler_name": params.sampler,
        "seed": params.seed,
        "seed_resize_from_h": 0,
        "seed_resize_from_w": 0,
        "n_iter": params.count,
        "styles": params.style.iter().collect::<Vec<_>>(),
    });

    let mut overrides = Map::new();
    overrides.insert("CLIP_stop_at_last_layers".to_string(), json!(params.clip_skip));
    if let Some(facefix) = &params.facefix {
        payload["restore_faces"] = json!(true);
        overrides.insert("face_restoration_model".to_string(), json!(facefix));
    }
    if let Some(hypernetwork) = &params.hypernetwork {
        overrides.insert("sd_hypernetwork".to_string(), json!(hypernetwork));
    }
    if let Some(data) = init_image {
        payload["init_images"] = json!([data]);
        payload["denoising_strength"] = json!(params.strength);
    }
    if params.highres_fix {
        payload["enable_hr"] = json!(true);
        payload["denoising_strength"] = json!(params.strength);
    }
    payload["override_settings"] = Value::Object(overrides);

    BackendRequest::new(payload).with_model(params.data_model.clone())
}

/// Build the upscale request for an already fetched image.
pub fn upscale_request(params: &UpscaleParams, image: String) -> BackendRequest {
    let mut payload = json!({
        "upscaling_resize": params.resize,
        "upscaler_1": params.upscaler_1,
        "image": image,
    });
    if let Some(upscaler_2) = &params.upscaler_2 {
        payload["upscaler_2"] = json!(upscaler_2);
        payload["extras_upscaler_2_visibility"] = json!(params.upscaler_2_strength);
    }
    BackendRequest::new(payload)
}

/// Build the interrogate request for an already fetched image.
pub fn interrogate_request(params: &IdentifyParams, image: String) -> BackendRequest {
    BackendRequest::new(json!({
        "image": image,
        "model": params.phrasing.backend_model(),
    }))
}
