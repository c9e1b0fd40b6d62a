//! Edit/Resubmit Protocol
//!
//! Decisions for the follow-up actions on a posted result. Every handler takes the
//! controls stored with the reply and the invoking user, and returns what the host should
//! do; the host owns the event loop and performs the effects (showing forms, sending
//! notices, disabling or deleting replies).
//!
//! Edits never touch the original job. They decode the snapshot in the controls, build a
//! new job with a new id and send it through the dispatch gate like any other submission.

use crate::dispatch::{Admission, DispatchService};
use crate::error::BotError;
use crate::job::{DrawParams, Job, JobId, JobParams};
use crate::reply::{FollowUpAction, Notice, ReplyControls};
use crate::settings::SettingsStore;
use crate::types::UserId;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info};

mod extended;
mod reprompt;
mod review;

pub use reprompt::RePromptForm;
pub use review::ReviewReport;

const DEFAULT_QUEUE_MESSAGE: &str = "I'm on it!";

/// Result of a resubmitting follow-up (re-prompt, re-roll, extended edit)
#[derive(Debug, Clone)]
pub struct Resubmission {
    pub admission: Admission,
    pub job_id: JobId,
    /// Request queue length reported to the user
    pub queue_len: usize,
    /// Public notice announcing the resubmission
    pub notice: Notice,
    /// One line per changed parameter
    pub changes: Vec<String>,
    /// Follow-up action to disable on the originating reply
    pub disable_trigger: Option<FollowUpAction>,
}

/// Follow-up action handler
pub struct FollowUpHandler {
    dispatch: Arc<DispatchService>,
    settings: Arc<dyn SettingsStore>,
    /// Flavour lines for queue notices, one picked at random
    messages: Vec<String>,
}

impl FollowUpHandler {
    pub fn new(
        dispatch: Arc<DispatchService>,
        settings: Arc<dyn SettingsStore>,
        messages: Vec<String>,
    ) -> Self {
        Self {
            dispatch,
            settings,
            messages,
        }
    }

    pub fn dispatch(&self) -> &Arc<DispatchService> {
        &self.dispatch
    }

    /// Remove a result. Only its owner may.
    pub fn delete(&self, controls: &ReplyControls, invoker: UserId) -> Result<(), BotError> {
        self.authorize(controls, FollowUpAction::Delete, invoker)?;
        info!(owner = %controls.view.owner, "Result deleted by owner");
        Ok(())
    }

    /// Check that `action` is offered on the reply and that `invoker` owns it.
    fn authorize(
        &self,
        controls: &ReplyControls,
        action: FollowUpAction,
        invoker: UserId,
    ) -> Result<(), BotError> {
        if !controls.view.offers(action) {
            return Err(BotError::StaleInteraction(format!(
                "{:?} is not available on this reply",
                action
            )));
        }
        if controls.view.owner != invoker {
            debug!(?action, invoker = %invoker, owner = %controls.view.owner, "Follow-up denied");
            return Err(BotError::AuthorizationDenied {
                action,
                invoker,
                owner: controls.view.owner,
            });
        }
        Ok(())
    }

    /// Decode the draw job behind a reply.
    fn decode_draw(controls: &ReplyControls) -> Result<(Job, DrawParams), BotError> {
        let job = controls.snapshot.decode()?;
        let params = job.draw_params().cloned().ok_or_else(|| {
            BotError::StaleInteraction(format!("job {} is not a draw", job.id))
        })?;
        Ok((job, params))
    }

    /// A flavour line for a queue notice, picked at random.
    pub fn queue_message(&self) -> &str {
        if self.messages.is_empty() {
            return DEFAULT_QUEUE_MESSAGE;
        }
        let index = rand::rng().random_range(0..self.messages.len());
        &self.messages[index]
    }

    /// Submit a new draw built from `original` and report it.
    ///
    /// `headline` is appended to the queue length line; `changes` follow on their own lines.
    fn resubmit(
        &self,
        original: &Job,
        params: DrawParams,
        headline: Option<String>,
        changes: Vec<String>,
        disable_trigger: Option<FollowUpAction>,
    ) -> Result<Resubmission, BotError> {
        let job = original.resubmitted(JobParams::Draw(params));
        let job_id = job.id;
        let user = job.requester.id;
        let mention = job.requester.mention();

        let admission = self.dispatch.submit(job).into_result(user)?;
        let queue_len = match admission {
            Admission::Enqueued { position } => position,
            _ => self.dispatch.queue_len(),
        };

        let mut text = format!(
            "{}, {}\nQueue: ``{}``",
            mention,
            self.queue_message(),
            queue_len
        );
        if let Some(headline) = headline {
            text.push_str(&headline);
        }
        for line in &changes {
            text.push('\n');
            text.push_str(line);
        }

        info!(
            job_id = %job_id,
            original_job_id = %original.id,
            requester = %user,
            queue_len,
            changes = changes.len(),
            "Draw resubmitted"
        );
        Ok(Resubmission {
            admission,
            job_id,
            queue_len,
            notice: Notice::public(text),
            changes,
            disable_trigger,
        })
    }
}

/// Queue notice for a fresh submission, in the same format as resubmissions.
pub fn queue_notice(mention: &str, message: &str, queue_len: usize) -> Notice {
    Notice::public(format!("{}, {}\nQueue: ``{}``", mention, message, queue_len))
}
