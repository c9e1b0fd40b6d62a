//! Extended edit: every draw field as `name:value` lines, applied all-or-nothing.

use super::{FollowUpHandler, Resubmission};
use crate::error::BotError;
use crate::reply::{FollowUpAction, ReplyControls};
use crate::types::UserId;
use crate::validation::{apply_edits, edit_form, parse_edit_lines, DrawConstraints};

impl FollowUpHandler {
    /// Offer the extended edit form, one `name:value` line per editable field.
    ///
    /// Extended edit rides on the re-prompt control.
    pub fn open_extended_edit(
        &self,
        controls: &ReplyControls,
        invoker: UserId,
    ) -> Result<String, BotError> {
        self.authorize(controls, FollowUpAction::RePrompt, invoker)?;
        self.dispatch.check_admission(invoker)?;
        let (_, params) = Self::decode_draw(controls)?;
        Ok(edit_form(&params, &self.settings.catalogs()))
    }

    /// Validate every line against the guild's limits and the live catalogs, then resubmit.
    /// Any invalid line rejects the whole edit.
    pub fn submit_extended_edit(
        &self,
        controls: &ReplyControls,
        invoker: UserId,
        text: &str,
    ) -> Result<Resubmission, BotError> {
        self.authorize(controls, FollowUpAction::RePrompt, invoker)?;
        let (job, params) = Self::decode_draw(controls)?;

        let defaults = self.settings.defaults(job.reply_target.guild_id);
        let constraints = DrawConstraints::new(&defaults, self.settings.catalogs());
        let edits = parse_edit_lines(text, &constraints)?;
        let (next, changes) = apply_edits(&params, &edits);

        self.resubmit(&job, next, None, changes, None)
    }
}
