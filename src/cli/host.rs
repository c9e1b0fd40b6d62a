//! JSON-lines host
//!
//! Stands in for a chat platform: every stdin line is a [`HostEvent`], every stdout line a
//! [`HostOutput`]. Posted replies keep their follow-up controls here, keyed by message id,
//! the way a platform keeps button state on its messages.

use crate::backend::InferenceBackend;
use crate::config::BotConfig;
use crate::dispatch::{Admission, DispatchService};
use crate::edit::{queue_notice, FollowUpHandler, RePromptForm, Resubmission};
use crate::error::BotError;
use crate::job::{Job, JobId, JobKind, PostJob, PostOutcome, ResultSummary};
use crate::reply::{FollowUpAction, Notice, ReplyControls, ReplySurface};
use crate::settings::{DefaultsUpdate, InMemorySettings, SettingsStore};
use crate::types::{GuildId, MessageId, ReplyTarget, Requester, UserId};
use crate::validation::{
    resolve_draw, resolve_identify, resolve_upscale, DrawRequest, IdentifyRequest, UpscaleRequest,
};
use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

const IDENTIFY_MESSAGE: &str = "I'm identifying the image!";

/// One event from the platform
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    Draw {
        requester: Requester,
        target: ReplyTarget,
        #[serde(flatten)]
        request: DrawRequest,
    },
    Upscale {
        requester: Requester,
        target: ReplyTarget,
        #[serde(flatten)]
        request: UpscaleRequest,
    },
    Identify {
        requester: Requester,
        target: ReplyTarget,
        #[serde(flatten)]
        request: IdentifyRequest,
    },
    /// A click on, or a form submitted from, a posted reply
    FollowUp {
        requester: Requester,
        target: ReplyTarget,
        message_id: MessageId,
        custom_id: String,
        #[serde(default)]
        step: FollowUpStep,
    },
    UpdateSettings {
        requester: Requester,
        target: ReplyTarget,
        guild_id: GuildId,
        #[serde(flatten)]
        update: DefaultsUpdate,
    },
    Shutdown,
}

/// Stage of a follow-up interaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum FollowUpStep {
    /// The control was clicked
    #[default]
    Open,
    /// Ask for the extended edit form instead of the re-prompt form
    OpenExtended,
    SubmitReprompt { form: RePromptForm },
    SubmitExtended { text: String },
}

/// A follow-up control as rendered on a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionButton {
    pub custom_id: &'static str,
    pub emoji: &'static str,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentOut {
    pub filename: String,
    /// Base64 of the file contents
    pub data: String,
}

/// One line written for the platform
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "output", rename_all = "snake_case")]
pub enum HostOutput {
    Posted {
        message_id: MessageId,
        job_id: JobId,
        kind: JobKind,
        outcome: PostOutcome,
        target: ReplyTarget,
        content: String,
        summary: ResultSummary,
        attachments: Vec<AttachmentOut>,
        buttons: Vec<ActionButton>,
    },
    Notice {
        recipient: UserId,
        target: ReplyTarget,
        #[serde(flatten)]
        notice: Notice,
    },
    RepromptForm {
        recipient: UserId,
        message_id: MessageId,
        form: RePromptForm,
    },
    ExtendedForm {
        recipient: UserId,
        message_id: MessageId,
        text: String,
    },
    Review {
        recipient: UserId,
        message_id: MessageId,
        summary: ResultSummary,
    },
    ActionDisabled {
        message_id: MessageId,
        action: FollowUpAction,
    },
    Deleted {
        message_id: MessageId,
    },
    Error {
        message: String,
    },
}

fn buttons(controls: Option<&ReplyControls>) -> Vec<ActionButton> {
    controls
        .map(|c| {
            c.view
                .actions
                .iter()
                .map(|action| ActionButton {
                    custom_id: action.custom_id(),
                    emoji: action.emoji(),
                    disabled: c.view.disabled.contains(action),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Reply surface writing [`HostOutput`] lines and keeping the controls of posted replies
pub struct JsonLinesSurface {
    out: UnboundedSender<HostOutput>,
    next_message: AtomicU64,
    replies: Mutex<HashMap<MessageId, ReplyControls>>,
}

impl JsonLinesSurface {
    pub fn new(out: UnboundedSender<HostOutput>) -> Self {
        Self {
            out,
            next_message: AtomicU64::new(1),
            replies: Mutex::new(HashMap::new()),
        }
    }

    /// Controls of a posted reply, if it still exists
    pub fn controls(&self, message: MessageId) -> Option<ReplyControls> {
        self.replies.lock().get(&message).cloned()
    }

    fn emit(&self, output: HostOutput) -> Result<(), BotError> {
        self.out
            .send(output)
            .map_err(|_| BotError::Delivery("output stream closed".to_string()))
    }
}

#[async_trait]
impl ReplySurface for JsonLinesSurface {
    async fn post(&self, post: &PostJob) -> Result<MessageId, BotError> {
        let message_id = MessageId(self.next_message.fetch_add(1, Ordering::Relaxed));
        if let Some(controls) = &post.controls {
            self.replies.lock().insert(message_id, controls.clone());
        }
        let attachments = post
            .attachments
            .iter()
            .map(|a| AttachmentOut {
                filename: a.filename.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(&a.data),
            })
            .collect();
        self.emit(HostOutput::Posted {
            message_id,
            job_id: post.job_id,
            kind: post.kind,
            outcome: post.outcome,
            target: post.reply_target,
            content: post.content.clone(),
            summary: post.summary.clone(),
            attachments,
            buttons: buttons(post.controls.as_ref()),
        })?;
        Ok(message_id)
    }

    async fn notify(
        &self,
        recipient: UserId,
        target: &ReplyTarget,
        notice: &Notice,
    ) -> Result<(), BotError> {
        self.emit(HostOutput::Notice {
            recipient,
            target: *target,
            notice: notice.clone(),
        })
    }

    async fn disable_action(
        &self,
        message: MessageId,
        action: FollowUpAction,
    ) -> Result<(), BotError> {
        if let Some(controls) = self.replies.lock().get_mut(&message) {
            controls.view.disable(action);
        }
        self.emit(HostOutput::ActionDisabled {
            message_id: message,
            action,
        })
    }

    async fn delete(&self, message: MessageId) -> Result<(), BotError> {
        self.replies.lock().remove(&message);
        self.emit(HostOutput::Deleted {
            message_id: message,
        })
    }
}

/// Drives the engine from host events
pub struct Host {
    dispatch: Arc<DispatchService>,
    handler: FollowUpHandler,
    settings: Arc<dyn SettingsStore>,
    surface: Arc<JsonLinesSurface>,
    drain_timeout: Duration,
}

impl Host {
    pub fn new(
        config: &BotConfig,
        backend: Arc<dyn InferenceBackend>,
        out: UnboundedSender<HostOutput>,
    ) -> Self {
        let surface = Arc::new(JsonLinesSurface::new(out));
        let dispatch = Arc::new(DispatchService::new(
            backend,
            Arc::clone(&surface) as Arc<dyn ReplySurface>,
            config.dispatch.clone(),
        ));
        let settings: Arc<dyn SettingsStore> = Arc::new(InMemorySettings::new(
            config.settings.defaults.clone(),
            config.settings.catalogs.clone(),
        ));
        let handler = FollowUpHandler::new(
            Arc::clone(&dispatch),
            Arc::clone(&settings),
            config.messages.clone(),
        );
        Self {
            dispatch,
            handler,
            settings,
            surface,
            drain_timeout: Duration::from_millis(config.dispatch.stop_grace_ms),
        }
    }

    pub fn dispatch(&self) -> &Arc<DispatchService> {
        &self.dispatch
    }

    pub fn surface(&self) -> &Arc<JsonLinesSurface> {
        &self.surface
    }

    /// Handle events until the input ends or a shutdown event arrives.
    pub async fn run<R>(&self, input: R) -> Result<(), BotError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| BotError::Delivery(format!("Failed to read host event: {}", e)))?
        {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<HostEvent>(line) {
                Ok(HostEvent::Shutdown) => {
                    info!("Shutdown requested by host");
                    break;
                }
                Ok(event) => self.handle_event(event).await,
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed host event");
                    self.surface.emit(HostOutput::Error {
                        message: format!("malformed event: {}", e),
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Drain outstanding work, then stop the workers. Dropping the host closes the output.
    pub async fn shutdown(self) -> Result<(), BotError> {
        if self.dispatch.is_running() {
            if let Err(e) = self.dispatch.wait_for_idle(Some(self.drain_timeout)).await {
                warn!(error = %e, "Shutting down with work outstanding");
            }
        }
        self.dispatch.stop().await
    }

    /// Handle one event; failures become notices for the user who caused them.
    pub async fn handle_event(&self, event: HostEvent) {
        let (requester, target, message) = match &event {
            HostEvent::Draw {
                requester, target, ..
            }
            | HostEvent::Upscale {
                requester, target, ..
            }
            | HostEvent::Identify {
                requester, target, ..
            }
            | HostEvent::UpdateSettings {
                requester, target, ..
            } => (requester.id, *target, None),
            HostEvent::FollowUp {
                requester,
                target,
                message_id,
                custom_id,
                ..
            } => (
                requester.id,
                *target,
                FollowUpAction::from_custom_id(custom_id).map(|a| (*message_id, a)),
            ),
            HostEvent::Shutdown => return,
        };

        let Err(error) = self.dispatch_event(event).await else {
            return;
        };
        if error.is_expected() {
            debug!(user = %requester, error = %error, "Request refused");
        } else {
            warn!(user = %requester, error = %error, "Request failed");
        }
        let notice = error.notice();
        if let Err(e) = self.surface.notify(requester, &target, &notice).await {
            warn!(error = %e, "Failed to deliver notice");
        }
        if notice.disable_control {
            if let Some((message_id, action)) = message {
                if let Err(e) = self.surface.disable_action(message_id, action).await {
                    warn!(error = %e, "Failed to disable stale control");
                }
            }
        }
    }

    async fn dispatch_event(&self, event: HostEvent) -> Result<(), BotError> {
        match event {
            HostEvent::Draw {
                requester,
                target,
                request,
            } => {
                let defaults = self.settings.defaults(target.guild_id);
                let params = resolve_draw(&request, &defaults, &self.settings.catalogs())?;
                let message = self.handler.queue_message().to_string();
                self.submit(Job::draw(requester, target, params), &message)
                    .await
            }
            HostEvent::Upscale {
                requester,
                target,
                request,
            } => {
                let params = resolve_upscale(&request, &self.settings.catalogs())?;
                let message = self.handler.queue_message().to_string();
                self.submit(Job::upscale(requester, target, params), &message)
                    .await
            }
            HostEvent::Identify {
                requester,
                target,
                request,
            } => {
                let params = resolve_identify(&request)?;
                self.submit(Job::identify(requester, target, params), IDENTIFY_MESSAGE)
                    .await
            }
            HostEvent::FollowUp {
                requester,
                target,
                message_id,
                custom_id,
                step,
            } => {
                self.follow_up(requester.id, target, message_id, &custom_id, step)
                    .await
            }
            HostEvent::UpdateSettings {
                requester,
                target,
                guild_id,
                update,
            } => {
                let changes = self.settings.update_defaults(guild_id, &update)?;
                let text = if changes.is_empty() {
                    "Nothing to change.".to_string()
                } else {
                    changes.join("\n")
                };
                self.surface
                    .notify(requester.id, &target, &Notice::ephemeral(text))
                    .await
            }
            HostEvent::Shutdown => Ok(()),
        }
    }

    async fn submit(&self, job: Job, message: &str) -> Result<(), BotError> {
        let requester = job.requester.id;
        let mention = job.requester.mention();
        let target = job.reply_target;
        let admission = self.dispatch.submit(job).into_result(requester)?;
        let queue_len = match admission {
            Admission::Enqueued { position } => position,
            _ => self.dispatch.queue_len(),
        };
        self.surface
            .notify(requester, &target, &queue_notice(&mention, message, queue_len))
            .await
    }

    async fn follow_up(
        &self,
        invoker: UserId,
        target: ReplyTarget,
        message_id: MessageId,
        custom_id: &str,
        step: FollowUpStep,
    ) -> Result<(), BotError> {
        let action = FollowUpAction::from_custom_id(custom_id)
            .ok_or_else(|| BotError::StaleInteraction(format!("unknown control {}", custom_id)))?;
        let controls = self.surface.controls(message_id).ok_or_else(|| {
            BotError::StaleInteraction(format!("no controls for message {}", message_id))
        })?;

        match (action, step) {
            (FollowUpAction::RePrompt, FollowUpStep::Open) => {
                let form = self.handler.open_reprompt(&controls, invoker)?;
                self.surface.emit(HostOutput::RepromptForm {
                    recipient: invoker,
                    message_id,
                    form,
                })
            }
            (FollowUpAction::RePrompt, FollowUpStep::OpenExtended) => {
                let text = self.handler.open_extended_edit(&controls, invoker)?;
                self.surface.emit(HostOutput::ExtendedForm {
                    recipient: invoker,
                    message_id,
                    text,
                })
            }
            (FollowUpAction::RePrompt, FollowUpStep::SubmitReprompt { form }) => {
                let resubmission = self.handler.submit_reprompt(&controls, invoker, &form)?;
                self.publish(invoker, target, message_id, resubmission).await
            }
            (FollowUpAction::RePrompt, FollowUpStep::SubmitExtended { text }) => {
                let resubmission = self
                    .handler
                    .submit_extended_edit(&controls, invoker, &text)?;
                self.publish(invoker, target, message_id, resubmission).await
            }
            (FollowUpAction::ReRoll, _) => {
                let resubmission = self.handler.reroll(&controls, invoker)?;
                self.publish(invoker, target, message_id, resubmission).await
            }
            (FollowUpAction::Review, _) => {
                let report = self.handler.review(&controls)?;
                self.surface.emit(HostOutput::Review {
                    recipient: invoker,
                    message_id,
                    summary: report.summary,
                })
            }
            (FollowUpAction::Delete, _) => {
                self.handler.delete(&controls, invoker)?;
                self.surface.delete(message_id).await
            }
        }
    }

    async fn publish(
        &self,
        invoker: UserId,
        target: ReplyTarget,
        message_id: MessageId,
        resubmission: Resubmission,
    ) -> Result<(), BotError> {
        self.surface
            .notify(invoker, &target, &resubmission.notice)
            .await?;
        if let Some(action) = resubmission.disable_trigger {
            self.surface.disable_action(message_id, action).await?;
        }
        Ok(())
    }
}

/// Write outputs as JSON lines until every sender is gone.
pub async fn write_outputs<W>(
    mut outputs: UnboundedReceiver<HostOutput>,
    mut writer: W,
) -> Result<(), BotError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(output) = outputs.recv().await {
        let mut line = serde_json::to_string(&output)
            .map_err(|e| BotError::Delivery(format!("Failed to encode output: {}", e)))?;
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| BotError::Delivery(format!("Failed to write output: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| BotError::Delivery(format!("Failed to flush output: {}", e)))?;
    }
    Ok(())
}
