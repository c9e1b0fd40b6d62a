//! Review: read-only report of a result's parameters.

use super::FollowUpHandler;
use crate::error::BotError;
use crate::job::{DrawParams, ResultSummary, DEFAULT_CLIP_SKIP, DEFAULT_COUNT};
use crate::reply::{FollowUpAction, ReplyControls};
use crate::settings::{strip_folders, Catalogs};

/// Parameters of a result, rendered for the user who asked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewReport {
    pub summary: ResultSummary,
    /// `/draw` command reproducing the result
    pub copy_command: String,
}

struct ModelDetails {
    display_name: String,
    full_name: String,
    activator_token: Option<String>,
}

fn model_details(params: &DrawParams, catalogs: &Catalogs) -> ModelDetails {
    match catalogs.model_at(params.model_index) {
        Some(entry) => ModelDetails {
            display_name: entry.display_name.clone(),
            full_name: strip_folders(&params.data_model).to_string(),
            activator_token: entry.activator().map(str::to_string),
        },
        None => ModelDetails {
            display_name: "Default".to_string(),
            full_name: "Unknown".to_string(),
            activator_token: None,
        },
    }
}

/// Build the review for `params`. Optional settings appear only when they differ from
/// their defaults.
pub fn build_review(params: &DrawParams, catalogs: &Catalogs) -> ReviewReport {
    let model = model_details(params, catalogs);

    let mut command = format!(
        "/draw prompt:{} data_model:{} steps:{} width:{} height:{} guidance_scale:{} sampler:{} seed:{}",
        params.raw_prompt,
        model.display_name,
        params.steps,
        params.width,
        params.height,
        params.guidance_scale,
        params.sampler,
        params.seed
    );
    let mut summary = ResultSummary::new()
        .with_title("About the image!")
        .with_field("Prompt", format!("``{}``", params.raw_prompt));

    if !params.negative_prompt.is_empty() {
        command.push_str(&format!(" negative_prompt:{}", params.negative_prompt));
        summary = summary.with_field(
            "Negative prompt",
            format!("``{}``", params.negative_prompt),
        );
    }

    let mut model_text = format!(
        "Display name - ``{}``\nFull name - ``{}``",
        model.display_name, model.full_name
    );
    if let Some(token) = &model.activator_token {
        model_text.push_str(&format!("\nActivator token - ``{}``", token));
    }
    summary = summary.with_field("Data model", model_text);

    let mut extra = format!(
        "Sampling steps: ``{}``\nSize: ``{}x{}``\nClassifier-free guidance scale: ``{}``\nSampling method: ``{}``\nSeed: ``{}``",
        params.steps, params.width, params.height, params.guidance_scale, params.sampler, params.seed
    );
    if let Some(image) = &params.init_image {
        command.push_str(&format!(" strength:{} init_url:{}", params.strength, image.url));
    }
    if params.count != DEFAULT_COUNT {
        command.push_str(&format!(" count:{}", params.count));
    }
    if let Some(style) = &params.style {
        command.push_str(&format!(" style:{}", style));
        extra.push_str(&format!("\nStyle preset: ``{}``", style));
    }
    if let Some(facefix) = &params.facefix {
        command.push_str(&format!(" facefix:{}", facefix));
        extra.push_str(&format!("\nFace restoration model: ``{}``", facefix));
    }
    if params.highres_fix {
        command.push_str(" highres_fix:true");
        extra.push_str("\nHigh-res fix: ``true``");
    }
    if params.clip_skip != DEFAULT_CLIP_SKIP {
        command.push_str(&format!(" clip_skip:{}", params.clip_skip));
        extra.push_str(&format!("\nCLIP skip: ``{}``", params.clip_skip));
    }
    if let Some(hypernetwork) = &params.hypernetwork {
        command.push_str(&format!(" hypernetwork:{}", hypernetwork));
        extra.push_str(&format!("\nHypernetwork: ``{}``", hypernetwork));
    }

    let summary = summary
        .with_field("Other parameters", extra)
        .with_field("Command for copying", format!("``{}``", command));

    ReviewReport {
        summary,
        copy_command: command,
    }
}

impl FollowUpHandler {
    /// Review a result. Anyone may; nothing is queued or changed.
    pub fn review(&self, controls: &ReplyControls) -> Result<ReviewReport, BotError> {
        if !controls.view.offers(FollowUpAction::Review) {
            return Err(BotError::StaleInteraction(
                "review is not available on this reply".to_string(),
            ));
        }
        let (_, params) = Self::decode_draw(controls)?;
        Ok(build_review(&params, &self.settings.catalogs()))
    }
}
