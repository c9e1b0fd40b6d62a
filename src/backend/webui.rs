//! HTTP client for the AUTOMATIC1111 Stable Diffusion web UI API.

use super::{decode_image, BackendRequest, GeneratedImages, InferenceBackend};
use crate::config::BackendConfig;
use crate::error::BackendError;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

fn map_http_error(error: reqwest::Error) -> BackendError {
    if let Some(status) = error.status() {
        match status.as_u16() {
            401 | 403 => BackendError::AuthFailed(format!("Authentication failed: {}", error)),
            code => BackendError::Status {
                status: code,
                body: error.to_string(),
            },
        }
    } else if error.is_timeout() {
        BackendError::RequestFailed(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        BackendError::RequestFailed(format!("Connection error: {}", error))
    } else {
        BackendError::Other(format!("HTTP error: {}", error))
    }
}

async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(match status.as_u16() {
        401 | 403 => BackendError::AuthFailed(body),
        code => BackendError::Status { status: code, body },
    })
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    info: Option<String>,
}

#[derive(Deserialize)]
struct UpscaleResponse {
    image: String,
}

#[derive(Deserialize)]
struct InterrogateResponse {
    caption: String,
}

/// Web UI backend client
pub struct WebUiBackend {
    client: Client,
    base_url: String,
    api_auth: Option<(String, String)>,
    gradio_auth: Option<(String, String)>,
    logged_in: AtomicBool,
    /// Last checkpoint sent to the options endpoint
    current_model: Mutex<Option<String>>,
}

impl WebUiBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .no_proxy()
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| BackendError::Other(format!("Failed to create HTTP client: {}", e)))?;

        let pair = |user: &Option<String>, pass: &Option<String>| match (user, pass) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            _ => None,
        };

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_auth: pair(&config.api_user, &config.api_pass),
            gradio_auth: pair(&config.gradio_user, &config.gradio_pass),
            logged_in: AtomicBool::new(false),
            current_model: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_auth {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        }
    }

    async fn ensure_login(&self) -> Result<(), BackendError> {
        let Some((username, password)) = &self.gradio_auth else {
            return Ok(());
        };
        if self.logged_in.load(Ordering::Acquire) {
            return Ok(());
        }
        let response = self
            .authorized(self.client.post(self.endpoint("/login")))
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(map_http_error)?;
        check_status(response).await?;
        self.logged_in.store(true, Ordering::Release);
        debug!(backend = %self.base_url, "Logged in to web UI");
        Ok(())
    }

    async fn post_json(
        &self,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<Response, BackendError> {
        self.ensure_login().await?;
        let response = self
            .authorized(self.client.post(self.endpoint(path)))
            .json(payload)
            .send()
            .await
            .map_err(map_http_error)?;
        let checked = check_status(response).await;
        if let Err(BackendError::AuthFailed(_)) = &checked {
            // Session cookie expired; log in again on the next call.
            self.logged_in.store(false, Ordering::Release);
        }
        checked
    }

    /// Load `model` unless it is the last one sent.
    async fn select_model(&self, model: Option<&str>) -> Result<(), BackendError> {
        let Some(model) = model else {
            return Ok(());
        };
        let loaded = self.current_model.lock().as_deref() == Some(model);
        if loaded {
            return Ok(());
        }
        let start = Instant::now();
        self.post_json("/sdapi/v1/options", &json!({ "sd_model_checkpoint": model }))
            .await?;
        *self.current_model.lock() = Some(model.to_string());
        info!(
            model = %model,
            duration_ms = start.elapsed().as_millis() as u64,
            "Switched backend model"
        );
        Ok(())
    }
}

#[async_trait]
impl InferenceBackend for WebUiBackend {
    async fn generate(&self, request: BackendRequest) -> Result<GeneratedImages, BackendError> {
        self.select_model(request.selected_model.as_deref()).await?;
        let path = if request.is_img2img() {
            "/sdapi/v1/img2img"
        } else {
            "/sdapi/v1/txt2img"
        };
        let response: GenerateResponse = self
            .post_json(path, &request.payload)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(format!("Failed to parse response: {}", e)))?;
        if response.images.is_empty() {
            return Err(BackendError::Decode("No images in response".to_string()));
        }
        let images = response
            .images
            .iter()
            .map(|image| decode_image(image))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(GeneratedImages {
            images,
            info: response.info,
        })
    }

    async fn upscale(&self, request: BackendRequest) -> Result<Vec<u8>, BackendError> {
        let response: UpscaleResponse = self
            .post_json("/sdapi/v1/extra-single-image", &request.payload)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(format!("Failed to parse response: {}", e)))?;
        decode_image(&response.image)
    }

    async fn interrogate(&self, request: BackendRequest) -> Result<String, BackendError> {
        let response: InterrogateResponse = self
            .post_json("/sdapi/v1/interrogate", &request.payload)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(format!("Failed to parse response: {}", e)))?;
        Ok(response.caption)
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, BackendError> {
        let fetch_error = |reason: String| BackendError::ImageFetch {
            url: url.to_string(),
            reason,
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "Image fetch failed");
            return Err(fetch_error(format!("status {}", response.status())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn name(&self) -> &str {
        "webui"
    }
}
