//! Reply Surface
//!
//! The contract the chat platform implements to receive results, plus the follow-up
//! controls attached to posted replies.

use crate::error::BotError;
use crate::job::{JobKind, JobSnapshot, PostJob};
use crate::types::{MessageId, ReplyTarget, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Follow-up action offered on a posted result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpAction {
    RePrompt,
    ReRoll,
    Review,
    Delete,
}

impl FollowUpAction {
    pub const ALL: [FollowUpAction; 4] = [
        FollowUpAction::RePrompt,
        FollowUpAction::ReRoll,
        FollowUpAction::Review,
        FollowUpAction::Delete,
    ];

    /// Stable component id used by the platform to route clicks
    pub fn custom_id(self) -> &'static str {
        match self {
            FollowUpAction::RePrompt => "button_re-prompt",
            FollowUpAction::ReRoll => "button_re-roll",
            FollowUpAction::Review => "button_review",
            FollowUpAction::Delete => "button_x",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            FollowUpAction::RePrompt => "🖋",
            FollowUpAction::ReRoll => "🎲",
            FollowUpAction::Review => "📋",
            FollowUpAction::Delete => "❌",
        }
    }

    pub fn from_custom_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.custom_id() == id)
    }
}

/// The set of follow-up actions a result offers, bound to its owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyView {
    pub owner: UserId,
    pub actions: Vec<FollowUpAction>,
    #[serde(default)]
    pub disabled: Vec<FollowUpAction>,
}

impl ReplyView {
    /// Draw results get the full set; everything else can only be deleted.
    pub fn for_kind(owner: UserId, kind: JobKind) -> Self {
        let actions = match kind {
            JobKind::Draw => FollowUpAction::ALL.to_vec(),
            JobKind::Upscale | JobKind::Identify => vec![FollowUpAction::Delete],
        };
        Self {
            owner,
            actions,
            disabled: Vec::new(),
        }
    }

    pub fn offers(&self, action: FollowUpAction) -> bool {
        self.actions.contains(&action) && !self.disabled.contains(&action)
    }

    pub fn disable(&mut self, action: FollowUpAction) {
        if !self.disabled.contains(&action) {
            self.disabled.push(action);
        }
    }
}

/// Controls attached to a posted result: the view plus a snapshot of the job behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyControls {
    pub view: ReplyView,
    pub snapshot: JobSnapshot,
}

/// A short message for the user who triggered something
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub text: String,
    /// Only visible to the user it is addressed to
    pub ephemeral: bool,
    /// The control that produced this notice should be disabled
    pub disable_control: bool,
}

impl Notice {
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ephemeral: true,
            disable_control: false,
        }
    }

    pub fn public(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ephemeral: false,
            disable_control: false,
        }
    }

    pub fn disabling_control(mut self) -> Self {
        self.disable_control = true;
        self
    }
}

/// Where results and notices go. Implemented by the chat-platform layer.
#[async_trait]
pub trait ReplySurface: Send + Sync {
    /// Post a result into its reply target.
    async fn post(&self, post: &PostJob) -> Result<MessageId, BotError>;

    /// Send a notice to one user in a reply target.
    async fn notify(
        &self,
        recipient: UserId,
        target: &ReplyTarget,
        notice: &Notice,
    ) -> Result<(), BotError>;

    /// Disable one follow-up action on a posted reply.
    async fn disable_action(
        &self,
        message: MessageId,
        action: FollowUpAction,
    ) -> Result<(), BotError>;

    /// Remove a posted reply.
    async fn delete(&self, message: MessageId) -> Result<(), BotError>;
}
