//! Shared test doubles for integration tests
//!
//! `MockBackend` records every backend call and can hold each call until the test releases
//! it, which keeps the worker Draining for as long as a test needs. `RecordingSurface`
//! keeps everything the engine delivered.

#![allow(dead_code)]

use aiya::backend::{BackendRequest, GeneratedImages, InferenceBackend};
use aiya::config::DispatchConfig;
use aiya::dispatch::DispatchService;
use aiya::error::{BackendError, BotError};
use aiya::job::{Job, PostJob};
use aiya::reply::{FollowUpAction, Notice, ReplyControls, ReplySurface};
use aiya::settings::{Catalogs, GuildDefaults, ModelEntry};
use aiya::types::{ChannelId, GuildId, MessageId, ReplyTarget, Requester, UserId};
use aiya::validation::{resolve_draw, DrawRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Which backend endpoint a call went to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Generate,
    Upscale,
    Interrogate,
}

pub struct MockBackend {
    calls: Mutex<Vec<(Call, BackendRequest)>>,
    hold: Option<Arc<Semaphore>>,
    fail_prompt: Option<String>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            hold: None,
            fail_prompt: None,
        }
    }

    /// Every call waits for a permit from the returned semaphore.
    pub fn held() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let backend = Self {
            hold: Some(Arc::clone(&gate)),
            ..Self::new()
        };
        (backend, gate)
    }

    /// Generate calls whose prompt equals `prompt` fail with a 500.
    pub fn failing_on(prompt: &str) -> Self {
        Self {
            fail_prompt: Some(prompt.to_string()),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<(Call, BackendRequest)> {
        self.calls.lock().clone()
    }

    pub fn call_kinds(&self) -> Vec<Call> {
        self.calls.lock().iter().map(|(call, _)| *call).collect()
    }

    /// Prompts of the generate calls, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(call, _)| *call == Call::Generate)
            .filter_map(|(_, request)| request.payload["prompt"].as_str().map(str::to_string))
            .collect()
    }

    async fn record(&self, call: Call, request: &BackendRequest) {
        self.calls.lock().push((call, request.clone()));
        if let Some(gate) = &self.hold {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }
}

#[async_trait]
impl InferenceBackend for MockBackend {
    async fn generate(&self, request: BackendRequest) -> Result<GeneratedImages, BackendError> {
        self.record(Call::Generate, &request).await;
        let prompt = request.payload["prompt"].as_str().unwrap_or_default();
        if self.fail_prompt.as_deref() == Some(prompt) {
            return Err(BackendError::Status {
                status: 500,
                body: "CUDA out of memory".to_string(),
            });
        }
        let count = request.payload["n_iter"].as_u64().unwrap_or(1) as usize;
        Ok(GeneratedImages {
            images: vec![vec![0x89, 0x50, 0x4e, 0x47]; count],
            info: None,
        })
    }

    async fn upscale(&self, request: BackendRequest) -> Result<Vec<u8>, BackendError> {
        self.record(Call::Upscale, &request).await;
        Ok(vec![1, 2, 3])
    }

    async fn interrogate(&self, request: BackendRequest) -> Result<String, BackendError> {
        self.record(Call::Interrogate, &request).await;
        Ok("a cat sitting on a windowsill".to_string())
    }

    async fn fetch_image(&self, _url: &str) -> Result<Vec<u8>, BackendError> {
        Ok(vec![0xAA, 0xBB])
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[derive(Default)]
pub struct RecordingSurface {
    next_message: AtomicU64,
    pub posts: Mutex<Vec<(MessageId, PostJob)>>,
    pub notices: Mutex<Vec<(UserId, Notice)>>,
    pub disabled: Mutex<Vec<(MessageId, FollowUpAction)>>,
    pub deleted: Mutex<Vec<MessageId>>,
    /// Refuse every post
    pub refuse_posts: bool,
}

impl RecordingSurface {
    pub fn refusing() -> Self {
        Self {
            refuse_posts: true,
            ..Self::default()
        }
    }

    pub fn posts(&self) -> Vec<(MessageId, PostJob)> {
        self.posts.lock().clone()
    }

    /// Controls of the n-th delivered post
    pub fn controls(&self, index: usize) -> ReplyControls {
        self.posts.lock()[index]
            .1
            .controls
            .clone()
            .expect("post has controls")
    }
}

#[async_trait]
impl ReplySurface for RecordingSurface {
    async fn post(&self, post: &PostJob) -> Result<MessageId, BotError> {
        if self.refuse_posts {
            return Err(BotError::Delivery("channel is gone".to_string()));
        }
        let id = MessageId(self.next_message.fetch_add(1, Ordering::Relaxed) + 1);
        self.posts.lock().push((id, post.clone()));
        Ok(id)
    }

    async fn notify(
        &self,
        recipient: UserId,
        _target: &ReplyTarget,
        notice: &Notice,
    ) -> Result<(), BotError> {
        self.notices.lock().push((recipient, notice.clone()));
        Ok(())
    }

    async fn disable_action(
        &self,
        message: MessageId,
        action: FollowUpAction,
    ) -> Result<(), BotError> {
        self.disabled.lock().push((message, action));
        Ok(())
    }

    async fn delete(&self, message: MessageId) -> Result<(), BotError> {
        self.deleted.lock().push(message);
        Ok(())
    }
}

pub fn catalogs() -> Catalogs {
    Catalogs {
        models: vec![
            ModelEntry {
                display_name: "Default".to_string(),
                full_name: "models/v1-5-pruned.ckpt".to_string(),
                activator_token: None,
            },
            ModelEntry {
                display_name: "Anime".to_string(),
                full_name: "anime\\anything-v3.ckpt".to_string(),
                activator_token: Some("anime style".to_string()),
            },
        ],
        styles: vec!["Cinematic".to_string()],
        ..Catalogs::default()
    }
}

pub fn defaults() -> GuildDefaults {
    GuildDefaults {
        max_count: 4,
        ..GuildDefaults::default()
    }
}

pub fn requester(id: u64) -> Requester {
    Requester::new(UserId(id), format!("user{}", id))
}

pub fn target() -> ReplyTarget {
    ReplyTarget::new(Some(GuildId(10)), ChannelId(20))
}

pub fn draw_request(model: &str, prompt: &str) -> DrawRequest {
    let mut request = DrawRequest::new(prompt);
    request.data_model = Some(model.to_string());
    request.seed = Some("1234".to_string());
    request
}

pub fn draw_job(user: u64, prompt: &str) -> Job {
    let params = resolve_draw(&draw_request("Default", prompt), &defaults(), &catalogs()).unwrap();
    Job::draw(requester(user), target(), params)
}

pub fn dispatch_config() -> DispatchConfig {
    DispatchConfig {
        start_workers: true,
        idle_poll_ms: 10,
        stop_grace_ms: 1_000,
    }
}

pub fn service(
    backend: Arc<MockBackend>,
    surface: Arc<RecordingSurface>,
) -> Arc<DispatchService> {
    Arc::new(DispatchService::new(backend, surface, dispatch_config()))
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

pub const WAIT: Duration = Duration::from_secs(5);
