//! Post jobs: executed results waiting to be delivered.

use super::{Job, JobId, JobKind};
use crate::reply::ReplyControls;
use crate::types::{ReplyTarget, Requester};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Renderable summary of a result (an embed on most platforms)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<SummaryField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

impl ResultSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(SummaryField {
            name: name.into(),
            value: value.into(),
            inline: false,
        });
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// Generated media attached to a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Result of an executed job, queued for delivery
#[derive(Debug, Clone)]
pub struct PostJob {
    pub job_id: JobId,
    pub kind: JobKind,
    pub requester: Requester,
    pub reply_target: ReplyTarget,
    pub outcome: PostOutcome,
    pub content: String,
    pub summary: ResultSummary,
    pub attachments: Vec<Attachment>,
    /// Follow-up controls; failures carry none
    pub controls: Option<ReplyControls>,
    pub completed_at: DateTime<Utc>,
}

impl PostJob {
    pub fn success(
        job: &Job,
        content: String,
        summary: ResultSummary,
        attachments: Vec<Attachment>,
        controls: Option<ReplyControls>,
    ) -> Self {
        Self {
            job_id: job.id,
            kind: job.kind(),
            requester: job.requester.clone(),
            reply_target: job.reply_target,
            outcome: PostOutcome::Success,
            content,
            summary,
            attachments,
            controls,
            completed_at: Utc::now(),
        }
    }

    pub fn failure(job: &Job, error: &str) -> Self {
        let summary = ResultSummary::new()
            .with_title(format!("{} failed", job.kind()))
            .with_description(error.to_string());
        Self {
            job_id: job.id,
            kind: job.kind(),
            requester: job.requester.clone(),
            reply_target: job.reply_target,
            outcome: PostOutcome::Failure,
            content: job.requester.mention(),
            summary,
            attachments: Vec::new(),
            controls: None,
            completed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == PostOutcome::Success
    }
}
