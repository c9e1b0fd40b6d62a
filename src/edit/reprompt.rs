//! Re-prompt and re-roll.

use super::{FollowUpHandler, Resubmission};
use crate::error::{BotError, FieldError};
use crate::job::random_seed;
use crate::reply::{FollowUpAction, ReplyControls};
use crate::types::UserId;
use crate::validation::{parse_seed, DrawField};
use serde::{Deserialize, Serialize};

/// The re-prompt form, both as offered and as submitted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RePromptForm {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    /// Empty or `-1` asks for a random seed
    #[serde(default)]
    pub seed: String,
}

impl FollowUpHandler {
    /// Offer the re-prompt form, pre-filled from the reply's job.
    pub fn open_reprompt(
        &self,
        controls: &ReplyControls,
        invoker: UserId,
    ) -> Result<RePromptForm, BotError> {
        self.authorize(controls, FollowUpAction::RePrompt, invoker)?;
        self.dispatch.check_admission(invoker)?;
        let (_, params) = Self::decode_draw(controls)?;
        Ok(RePromptForm {
            prompt: params.raw_prompt,
            negative_prompt: params.negative_prompt,
            seed: params.seed.to_string(),
        })
    }

    /// Resubmit with a new prompt, negative prompt and seed.
    pub fn submit_reprompt(
        &self,
        controls: &ReplyControls,
        invoker: UserId,
        form: &RePromptForm,
    ) -> Result<Resubmission, BotError> {
        self.authorize(controls, FollowUpAction::RePrompt, invoker)?;
        let (job, params) = Self::decode_draw(controls)?;

        let new_raw = form.prompt.trim();
        let mut errors = Vec::new();
        if new_raw.is_empty() {
            errors.push(FieldError::new(DrawField::Prompt.name(), "can't be empty"));
        }
        let seed = match parse_seed(&form.seed) {
            Ok(seed) => Some(seed),
            Err(e) => {
                errors.push(e);
                None
            }
        };
        let Some(seed) = seed.filter(|_| errors.is_empty()) else {
            return Err(BotError::ValidationFailed(errors));
        };

        let mut next = params.with_raw_prompt(new_raw);
        next.negative_prompt = form.negative_prompt.trim().to_string();
        next.seed = seed;

        let mut changes = vec![format!("New prompt: ``{}``", next.raw_prompt)];
        if !next.negative_prompt.is_empty() {
            changes.push(format!("New negative prompt: ``{}``", next.negative_prompt));
        }
        if next.seed != params.seed {
            changes.push(format!("New seed: ``{}``", next.seed));
        }

        self.resubmit(&job, next, None, changes, None)
    }

    /// Resubmit with a fresh random seed and nothing else changed.
    ///
    /// When admitted, the re-roll control on the old reply is disabled.
    pub fn reroll(
        &self,
        controls: &ReplyControls,
        invoker: UserId,
    ) -> Result<Resubmission, BotError> {
        self.authorize(controls, FollowUpAction::ReRoll, invoker)?;
        let (job, params) = Self::decode_draw(controls)?;

        let next = params.with_seed(random_seed());
        let headline = format!(" - ``{}``\nNew seed: ``{}``", next.raw_prompt, next.seed);
        self.resubmit(
            &job,
            next,
            Some(headline),
            Vec::new(),
            Some(FollowUpAction::ReRoll),
        )
    }
}
