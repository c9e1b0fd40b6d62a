//! Generation worker: the single task that calls the backend.

use super::{post, DispatchStats, SharedState};
use crate::backend::{
    data_url, draw_request, interrogate_request, upscale_request, InferenceBackend,
};
use crate::error::BackendError;
use crate::job::{
    Attachment, DrawParams, IdentifyParams, Job, JobParams, JobSnapshot, PostJob, ResultSummary,
    UpscaleParams,
};
use crate::reply::ReplyControls;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

pub(crate) struct GenerationWorker {
    pub(crate) state: SharedState,
    pub(crate) work_notify: Arc<Notify>,
    pub(crate) post_notify: Arc<Notify>,
    pub(crate) backend: Arc<dyn InferenceBackend>,
    pub(crate) running: Arc<RwLock<bool>>,
    pub(crate) stats: Arc<RwLock<DispatchStats>>,
    pub(crate) poll: Duration,
}

impl GenerationWorker {
    pub(crate) async fn run(self) {
        debug!(backend = self.backend.name(), "Generation worker started");

        while *self.running.read() {
            let next = self.state.lock().take_next();

            let Some(job) = next else {
                // Idle: wait for a hand-off, polling so a stop request is noticed.
                tokio::select! {
                    _ = self.work_notify.notified() => continue,
                    _ = sleep(self.poll) => continue,
                }
            };

            let start = Instant::now();
            let post = execute(self.backend.as_ref(), &job).await;
            let duration_ms = start.elapsed().as_millis() as u64;
            {
                let mut stats = self.stats.write();
                if post.is_success() {
                    stats.completed += 1;
                } else {
                    stats.failed += 1;
                }
            }
            info!(
                job_id = %job.id,
                kind = %job.kind(),
                requester = %job.requester.id,
                success = post.is_success(),
                duration_ms,
                "Job executed"
            );
            post::enqueue(&self.state, &self.post_notify, post);
        }

        debug!("Generation worker stopped");
    }
}

/// Run one job against the backend. Never fails: backend errors become failure posts.
pub async fn execute(backend: &dyn InferenceBackend, job: &Job) -> PostJob {
    let result = match &job.params {
        JobParams::Draw(params) => execute_draw(backend, job, params).await,
        JobParams::Upscale(params) => execute_upscale(backend, job, params).await,
        JobParams::Identify(params) => execute_identify(backend, job, params).await,
    };
    match result {
        Ok(post) => post,
        Err(e) => {
            error!(job_id = %job.id, kind = %job.kind(), error = %e, "Backend call failed");
            PostJob::failure(job, &e.to_string())
        }
    }
}

/// Controls for a posted result; a job that cannot be snapshotted is posted without them.
fn controls_for(job: &Job) -> Option<ReplyControls> {
    match JobSnapshot::capture(job) {
        Ok(snapshot) => Some(ReplyControls {
            view: job.reply_view.clone(),
            snapshot,
        }),
        Err(e) => {
            warn!(job_id = %job.id, error = %e, "Posting result without follow-up controls");
            None
        }
    }
}

async fn fetch_data_url(backend: &dyn InferenceBackend, url: &str) -> Result<String, BackendError> {
    let bytes = backend.fetch_image(url).await?;
    Ok(data_url(&bytes))
}

async fn execute_draw(
    backend: &dyn InferenceBackend,
    job: &Job,
    params: &DrawParams,
) -> Result<PostJob, BackendError> {
    let init_image = match &params.init_image {
        Some(image) => Some(fetch_data_url(backend, &image.url).await?),
        None => None,
    };
    let generated = backend.generate(draw_request(params, init_image)).await?;

    let attachments = generated
        .images
        .into_iter()
        .enumerate()
        .map(|(i, data)| Attachment {
            filename: format!("{}-{}.png", params.seed, i),
            data,
        })
        .collect();
    let summary = ResultSummary::new()
        .with_description(format!("``{}``", params.raw_prompt))
        .with_field("Seed", params.seed.to_string())
        .with_footer(job.requester.display_name.clone());
    let content = format!("{}, here is what I imagined!", job.requester.mention());

    Ok(PostJob::success(
        job,
        content,
        summary,
        attachments,
        controls_for(job),
    ))
}

async fn execute_upscale(
    backend: &dyn InferenceBackend,
    job: &Job,
    params: &UpscaleParams,
) -> Result<PostJob, BackendError> {
    let image = fetch_data_url(backend, &params.image.url).await?;
    let data = backend.upscale(upscale_request(params, image)).await?;

    let summary = ResultSummary::new()
        .with_field("Upscaler", params.upscaler_1.clone())
        .with_field("Resize", format!("{}x", params.resize))
        .with_footer(job.requester.display_name.clone());
    let attachments = vec![Attachment {
        filename: "upscale.png".to_string(),
        data,
    }];

    Ok(PostJob::success(
        job,
        job.requester.mention(),
        summary,
        attachments,
        controls_for(job),
    ))
}

async fn execute_identify(
    backend: &dyn InferenceBackend,
    job: &Job,
    params: &IdentifyParams,
) -> Result<PostJob, BackendError> {
    let image = fetch_data_url(backend, &params.image.url).await?;
    let caption = backend
        .interrogate(interrogate_request(params, image))
        .await?;

    let summary = ResultSummary::new()
        .with_image(params.image.url.clone())
        .with_field("I think this is", format!("``{}``", caption))
        .with_footer(job.requester.display_name.clone());

    Ok(PostJob::success(
        job,
        job.requester.mention(),
        summary,
        Vec::new(),
        controls_for(job),
    ))
}
