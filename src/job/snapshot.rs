//! Versioned job snapshots carried by posted replies.
//!
//! Follow-up actions never hold a live reference to the job they act on; they decode the
//! snapshot stored with the reply and build a new job from it.

use super::Job;
use crate::error::BotError;
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    job: &'a Job,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    job: Job,
}

/// Encoded job snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobSnapshot(String);

impl JobSnapshot {
    pub fn capture(job: &Job) -> Result<Self, BotError> {
        serde_json::to_string(&EnvelopeRef {
            version: SNAPSHOT_VERSION,
            job,
        })
        .map(JobSnapshot)
        .map_err(|e| BotError::StaleInteraction(format!("snapshot encoding failed: {}", e)))
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        JobSnapshot(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the job; unknown versions and malformed bodies are stale.
    pub fn decode(&self) -> Result<Job, BotError> {
        let envelope: Envelope = serde_json::from_str(&self.0)
            .map_err(|e| BotError::StaleInteraction(format!("snapshot unreadable: {}", e)))?;
        if envelope.version != SNAPSHOT_VERSION {
            return Err(BotError::StaleInteraction(format!(
                "snapshot version {} (expected {})",
                envelope.version, SNAPSHOT_VERSION
            )));
        }
        Ok(envelope.job)
    }
}
