//! Job Model
//!
//! A job is one unit of requested work (draw, upscale, identify) carrying every parameter
//! needed to call the backend and to render a reply. Jobs are never mutated once submitted:
//! an edit decodes a snapshot of the old job and builds a new one.

use crate::reply::ReplyView;
use crate::types::{ReplyTarget, Requester};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod params;
pub mod post;
pub mod snapshot;

pub use params::{
    compose_prompt, random_seed, replace_raw_prompt, DrawParams, IdentifyParams, ImageSource,
    Phrasing, UpscaleParams, DEFAULT_CLIP_SKIP, DEFAULT_COUNT, DEFAULT_STRENGTH,
};
pub use post::{Attachment, PostJob, PostOutcome, ResultSummary, SummaryField};
pub use snapshot::{JobSnapshot, SNAPSHOT_VERSION};

/// Job identifier, unique for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    /// Generate the next job ID
    pub fn next() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        JobId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of work a job asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Draw,
    Upscale,
    Identify,
}

impl JobKind {
    /// Order in which the generation worker drains the request queues.
    pub const DRAIN_ORDER: [JobKind; 3] = [JobKind::Draw, JobKind::Upscale, JobKind::Identify];

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Draw => "draw",
            JobKind::Upscale => "upscale",
            JobKind::Identify => "identify",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobParams {
    Draw(DrawParams),
    Upscale(UpscaleParams),
    Identify(IdentifyParams),
}

impl JobParams {
    pub fn kind(&self) -> JobKind {
        match self {
            JobParams::Draw(_) => JobKind::Draw,
            JobParams::Upscale(_) => JobKind::Upscale,
            JobParams::Identify(_) => JobKind::Identify,
        }
    }
}

/// One unit of requested work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Owner of the job; the key for duplicate and authorization checks
    pub requester: Requester,
    pub reply_target: ReplyTarget,
    pub params: JobParams,
    /// Follow-up actions offered once the result is posted
    pub reply_view: ReplyView,
}

impl Job {
    pub fn new(requester: Requester, reply_target: ReplyTarget, params: JobParams) -> Self {
        let reply_view = ReplyView::for_kind(requester.id, params.kind());
        Self {
            id: JobId::next(),
            requester,
            reply_target,
            params,
            reply_view,
        }
    }

    pub fn draw(requester: Requester, reply_target: ReplyTarget, params: DrawParams) -> Self {
        Self::new(requester, reply_target, JobParams::Draw(params))
    }

    pub fn upscale(requester: Requester, reply_target: ReplyTarget, params: UpscaleParams) -> Self {
        Self::new(requester, reply_target, JobParams::Upscale(params))
    }

    pub fn identify(
        requester: Requester,
        reply_target: ReplyTarget,
        params: IdentifyParams,
    ) -> Self {
        Self::new(requester, reply_target, JobParams::Identify(params))
    }

    pub fn kind(&self) -> JobKind {
        self.params.kind()
    }

    pub fn draw_params(&self) -> Option<&DrawParams> {
        match &self.params {
            JobParams::Draw(params) => Some(params),
            _ => None,
        }
    }

    /// A new job for the same requester and target carrying `params`.
    pub fn resubmitted(&self, params: JobParams) -> Job {
        Job::new(self.requester.clone(), self.reply_target, params)
    }
}
