//! Validation
//!
//! Field-level checks shared by original submission and extended edit. Every entry point
//! validates all fields first and returns `BotError::ValidationFailed` listing each bad
//! field; nothing is applied unless every field passes.

use crate::error::{BotError, FieldError};
use crate::job::{
    compose_prompt, random_seed, DrawParams, IdentifyParams, ImageSource, Phrasing,
    UpscaleParams, DEFAULT_STRENGTH,
};
use crate::settings::{Catalogs, GuildDefaults, ModelEntry, MAX_CLIP_SKIP, MIN_CLIP_SKIP};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub const MIN_GUIDANCE_SCALE: f64 = 1.0;
pub const MAX_GUIDANCE_SCALE: f64 = 30.0;
pub const MIN_RESIZE: f64 = 1.0;
pub const MAX_RESIZE: f64 = 4.0;
pub const DEFAULT_RESIZE: f64 = 4.0;
pub const DEFAULT_UPSCALER: &str = "ESRGAN_4x";

/// Catalog value meaning "not set" for optional catalog fields
const NONE_CHOICE: &str = "None";

/// Editable draw fields, in the order the edit form lists them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawField {
    Prompt,
    NegativePrompt,
    DataModel,
    Steps,
    Width,
    Height,
    GuidanceScale,
    Sampler,
    Seed,
    Strength,
    Count,
    Style,
    Facefix,
    HighresFix,
    ClipSkip,
    Hypernetwork,
}

impl DrawField {
    pub const ALL: [DrawField; 16] = [
        DrawField::Prompt,
        DrawField::NegativePrompt,
        DrawField::DataModel,
        DrawField::Steps,
        DrawField::Width,
        DrawField::Height,
        DrawField::GuidanceScale,
        DrawField::Sampler,
        DrawField::Seed,
        DrawField::Strength,
        DrawField::Count,
        DrawField::Style,
        DrawField::Facefix,
        DrawField::HighresFix,
        DrawField::ClipSkip,
        DrawField::Hypernetwork,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DrawField::Prompt => "prompt",
            DrawField::NegativePrompt => "negative_prompt",
            DrawField::DataModel => "data_model",
            DrawField::Steps => "steps",
            DrawField::Width => "width",
            DrawField::Height => "height",
            DrawField::GuidanceScale => "guidance_scale",
            DrawField::Sampler => "sampler",
            DrawField::Seed => "seed",
            DrawField::Strength => "strength",
            DrawField::Count => "count",
            DrawField::Style => "style",
            DrawField::Facefix => "facefix",
            DrawField::HighresFix => "highres_fix",
            DrawField::ClipSkip => "clip_skip",
            DrawField::Hypernetwork => "hypernetwork",
        }
    }

    /// Prompt fields, which may span several lines.
    pub fn is_free_text(self) -> bool {
        matches!(self, DrawField::Prompt | DrawField::NegativePrompt)
    }

    pub fn parse_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl fmt::Display for DrawField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Limits a draw is checked against
#[derive(Debug, Clone)]
pub struct DrawConstraints {
    pub max_steps: u32,
    pub max_count: u32,
    pub catalogs: Catalogs,
}

impl DrawConstraints {
    pub fn new(defaults: &GuildDefaults, catalogs: Catalogs) -> Self {
        Self {
            max_steps: defaults.max_steps,
            max_count: defaults.max_count,
            catalogs,
        }
    }
}

/// One validated field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEdit {
    Prompt(String),
    NegativePrompt(String),
    DataModel { index: usize, entry: ModelEntry },
    Steps(u32),
    Width(u32),
    Height(u32),
    GuidanceScale(f64),
    Sampler(String),
    Seed(u32),
    Strength(f64),
    Count(u32),
    Style(Option<String>),
    Facefix(Option<String>),
    HighresFix(bool),
    ClipSkip(u32),
    Hypernetwork(Option<String>),
}

impl FieldEdit {
    pub fn field(&self) -> DrawField {
        match self {
            FieldEdit::Prompt(_) => DrawField::Prompt,
            FieldEdit::NegativePrompt(_) => DrawField::NegativePrompt,
            FieldEdit::DataModel { .. } => DrawField::DataModel,
            FieldEdit::Steps(_) => DrawField::Steps,
            FieldEdit::Width(_) => DrawField::Width,
            FieldEdit::Height(_) => DrawField::Height,
            FieldEdit::GuidanceScale(_) => DrawField::GuidanceScale,
            FieldEdit::Sampler(_) => DrawField::Sampler,
            FieldEdit::Seed(_) => DrawField::Seed,
            FieldEdit::Strength(_) => DrawField::Strength,
            FieldEdit::Count(_) => DrawField::Count,
            FieldEdit::Style(_) => DrawField::Style,
            FieldEdit::Facefix(_) => DrawField::Facefix,
            FieldEdit::HighresFix(_) => DrawField::HighresFix,
            FieldEdit::ClipSkip(_) => DrawField::ClipSkip,
            FieldEdit::Hypernetwork(_) => DrawField::Hypernetwork,
        }
    }
}

fn parse_u32(field: DrawField, value: &str) -> Result<u32, FieldError> {
    value
        .parse::<u32>()
        .map_err(|_| FieldError::new(field.name(), format!("'{}' is not a whole number", value)))
}

fn parse_f64(field: DrawField, value: &str) -> Result<f64, FieldError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FieldError::new(field.name(), format!("'{}' is not a number", value)))
}

fn in_range<T: PartialOrd + fmt::Display + Copy>(
    field: DrawField,
    value: T,
    min: T,
    max: T,
) -> Result<T, FieldError> {
    if value < min || value > max {
        Err(FieldError::new(
            field.name(),
            format!("must be between {} and {}", min, max),
        ))
    } else {
        Ok(value)
    }
}

/// Seed input: empty or `-1` draws a random seed.
pub fn parse_seed(value: &str) -> Result<u32, FieldError> {
    let value = value.trim();
    if value.is_empty() || value == "-1" {
        return Ok(random_seed());
    }
    value.parse::<u32>().map_err(|_| {
        FieldError::new(
            DrawField::Seed.name(),
            format!("'{}' is not a seed (0 to {}, or -1 for random)", value, u32::MAX),
        )
    })
}

fn parse_bool(field: DrawField, value: &str) -> Result<bool, FieldError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(FieldError::new(
            field.name(),
            format!("'{}' is not true or false", value),
        )),
    }
}

/// Optional catalog choice; `None` (or empty) clears it.
fn parse_choice(
    field: DrawField,
    value: &str,
    known: impl Fn(&str) -> bool,
) -> Result<Option<String>, FieldError> {
    if value.is_empty() || value.eq_ignore_ascii_case(NONE_CHOICE) {
        return Ok(None);
    }
    if known(value) {
        Ok(Some(value.to_string()))
    } else {
        Err(FieldError::new(
            field.name(),
            format!("unknown {} '{}'", field.name().replace('_', " "), value),
        ))
    }
}

/// Parse and check one field value.
pub fn validate_field(
    field: DrawField,
    raw_value: &str,
    constraints: &DrawConstraints,
) -> Result<FieldEdit, FieldError> {
    let value = raw_value.trim();
    let catalogs = &constraints.catalogs;
    match field {
        DrawField::Prompt => {
            if value.is_empty() {
                Err(FieldError::new(field.name(), "can't be empty"))
            } else {
                Ok(FieldEdit::Prompt(value.to_string()))
            }
        }
        DrawField::NegativePrompt => Ok(FieldEdit::NegativePrompt(value.to_string())),
        DrawField::DataModel => catalogs
            .find_model(value)
            .map(|(index, entry)| FieldEdit::DataModel {
                index,
                entry: entry.clone(),
            })
            .ok_or_else(|| FieldError::new(field.name(), format!("unknown model '{}'", value))),
        DrawField::Steps => {
            let steps = parse_u32(field, value)?;
            in_range(field, steps, 1, constraints.max_steps).map(FieldEdit::Steps)
        }
        DrawField::Width | DrawField::Height => {
            let size = parse_u32(field, value)?;
            if !catalogs.has_size(size) {
                return Err(FieldError::new(
                    field.name(),
                    format!("{} is not an allowed size", size),
                ));
            }
            Ok(if field == DrawField::Width {
                FieldEdit::Width(size)
            } else {
                FieldEdit::Height(size)
            })
        }
        DrawField::GuidanceScale => {
            let scale = parse_f64(field, value)?;
            in_range(field, scale, MIN_GUIDANCE_SCALE, MAX_GUIDANCE_SCALE)
                .map(FieldEdit::GuidanceScale)
        }
        DrawField::Sampler => {
            if catalogs.has_sampler(value) {
                Ok(FieldEdit::Sampler(value.to_string()))
            } else {
                Err(FieldError::new(
                    field.name(),
                    format!("unknown sampler '{}'", value),
                ))
            }
        }
        DrawField::Seed => parse_seed(value).map(FieldEdit::Seed),
        DrawField::Strength => {
            let strength = parse_f64(field, value)?;
            in_range(field, strength, 0.0, 1.0).map(FieldEdit::Strength)
        }
        DrawField::Count => {
            let count = parse_u32(field, value)?;
            in_range(field, count, 1, constraints.max_count).map(FieldEdit::Count)
        }
        DrawField::Style => {
            parse_choice(field, value, |v| catalogs.has_style(v)).map(FieldEdit::Style)
        }
        DrawField::Facefix => {
            parse_choice(field, value, |v| catalogs.has_facefix(v)).map(FieldEdit::Facefix)
        }
        DrawField::HighresFix => parse_bool(field, value).map(FieldEdit::HighresFix),
        DrawField::ClipSkip => {
            let clip_skip = parse_u32(field, value)?;
            in_range(field, clip_skip, MIN_CLIP_SKIP, MAX_CLIP_SKIP).map(FieldEdit::ClipSkip)
        }
        DrawField::Hypernetwork => parse_choice(field, value, |v| catalogs.has_hypernetwork(v))
            .map(FieldEdit::Hypernetwork),
    }
}

/// Parse an extended edit form. Blank lines are skipped; every other line must be
/// `name:value` naming a known field at most once.
pub fn parse_edit_lines(
    text: &str,
    constraints: &DrawConstraints,
) -> Result<Vec<FieldEdit>, BotError> {
    let mut edits = Vec::new();
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            errors.push(FieldError::new(line, "expected name:value"));
            continue;
        };
        let Some(field) = DrawField::parse_name(name) else {
            errors.push(FieldError::new(name.trim(), "unknown field"));
            continue;
        };
        if !seen.insert(field) {
            errors.push(FieldError::new(field.name(), "given more than once"));
            continue;
        }
        let value = if field.is_free_text() {
            unescape_form_value(value)
        } else {
            value.to_string()
        };
        match validate_field(field, &value, constraints) {
            Ok(edit) => edits.push(edit),
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        Ok(edits)
    } else {
        Err(BotError::ValidationFailed(errors))
    }
}

/// Form text for a free-text value: one line, with backslashes and line breaks escaped.
fn escape_form_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Inverse of [`escape_form_value`]. Unknown escapes are kept as typed.
fn unescape_form_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn show_choice(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(NONE_CHOICE)
}

/// Pre-filled extended edit form for `params`.
pub fn edit_form(params: &DrawParams, catalogs: &Catalogs) -> String {
    let model = catalogs
        .model_at(params.model_index)
        .map(|m| m.display_name.clone())
        .unwrap_or_else(|| params.data_model.clone());
    DrawField::ALL
        .iter()
        .map(|field| {
            let value = match field {
                DrawField::Prompt => escape_form_value(&params.raw_prompt),
                DrawField::NegativePrompt => escape_form_value(&params.negative_prompt),
                DrawField::DataModel => model.clone(),
                DrawField::Steps => params.steps.to_string(),
                DrawField::Width => params.width.to_string(),
                DrawField::Height => params.height.to_string(),
                DrawField::GuidanceScale => params.guidance_scale.to_string(),
                DrawField::Sampler => params.sampler.clone(),
                DrawField::Seed => params.seed.to_string(),
                DrawField::Strength => params.strength.to_string(),
                DrawField::Count => params.count.to_string(),
                DrawField::Style => show_choice(&params.style).to_string(),
                DrawField::Facefix => show_choice(&params.facefix).to_string(),
                DrawField::HighresFix => params.highres_fix.to_string(),
                DrawField::ClipSkip => params.clip_skip.to_string(),
                DrawField::Hypernetwork => show_choice(&params.hypernetwork).to_string(),
            };
            format!("{}:{}", field.name(), value)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Apply validated edits to a copy of `params`, returning it with one line per changed field.
///
/// A model change recomposes the prompt from the new model's activator token; a prompt-only
/// change swaps the raw prompt in place.
pub fn apply_edits(params: &DrawParams, edits: &[FieldEdit]) -> (DrawParams, Vec<String>) {
    let mut next = params.clone();
    let mut changes = Vec::new();
    let mut new_raw: Option<String> = None;
    let mut new_model: Option<(usize, &ModelEntry)> = None;

    for edit in edits {
        match edit {
            FieldEdit::Prompt(raw) => {
                if *raw != params.raw_prompt {
                    new_raw = Some(raw.clone());
                }
            }
            FieldEdit::DataModel { index, entry } => {
                if entry.full_name != params.data_model || *index != params.model_index {
                    new_model = Some((*index, entry));
                }
            }
            FieldEdit::NegativePrompt(v) => {
                set_changed(&mut next.negative_prompt, v.clone(), edit, &mut changes)
            }
            FieldEdit::Steps(v) => set_changed(&mut next.steps, *v, edit, &mut changes),
            FieldEdit::Width(v) => set_changed(&mut next.width, *v, edit, &mut changes),
            FieldEdit::Height(v) => set_changed(&mut next.height, *v, edit, &mut changes),
            FieldEdit::GuidanceScale(v) => {
                set_changed(&mut next.guidance_scale, *v, edit, &mut changes)
            }
            FieldEdit::Sampler(v) => set_changed(&mut next.sampler, v.clone(), edit, &mut changes),
            FieldEdit::Seed(v) => set_changed(&mut next.seed, *v, edit, &mut changes),
            FieldEdit::Strength(v) => set_changed(&mut next.strength, *v, edit, &mut changes),
            FieldEdit::Count(v) => set_changed(&mut next.count, *v, edit, &mut changes),
            FieldEdit::Style(v) => set_changed(&mut next.style, v.clone(), edit, &mut changes),
            FieldEdit::Facefix(v) => {
                set_changed(&mut next.facefix, v.clone(), edit, &mut changes)
            }
            FieldEdit::HighresFix(v) => {
                set_changed(&mut next.highres_fix, *v, edit, &mut changes)
            }
            FieldEdit::ClipSkip(v) => set_changed(&mut next.clip_skip, *v, edit, &mut changes),
            FieldEdit::Hypernetwork(v) => {
                set_changed(&mut next.hypernetwork, v.clone(), edit, &mut changes)
            }
        }
    }

    let raw = new_raw.clone().unwrap_or_else(|| params.raw_prompt.clone());
    match new_model {
        Some((index, entry)) => {
            next.data_model = entry.full_name.clone();
            next.model_index = index;
            next.prompt = compose_prompt(entry.activator(), &raw);
            next.raw_prompt = raw;
            changes.push(format!("New data model: ``{}``", entry.display_name));
        }
        None if new_raw.is_some() => next = next.with_raw_prompt(&raw),
        None => {}
    }
    if let Some(raw) = new_raw {
        changes.insert(0, format!("New prompt: ``{}``", raw));
    }

    (next, changes)
}

fn set_changed<T: PartialEq + fmt::Debug>(
    slot: &mut T,
    value: T,
    edit: &FieldEdit,
    changes: &mut Vec<String>,
) {
    if *slot != value {
        changes.push(format!("New {}: ``{}``", edit.field(), describe(edit)));
        *slot = value;
    }
}

fn describe(edit: &FieldEdit) -> String {
    match edit {
        FieldEdit::Prompt(v) | FieldEdit::NegativePrompt(v) | FieldEdit::Sampler(v) => v.clone(),
        FieldEdit::DataModel { entry, .. } => entry.display_name.clone(),
        FieldEdit::Steps(v)
        | FieldEdit::Width(v)
        | FieldEdit::Height(v)
        | FieldEdit::Seed(v)
        | FieldEdit::Count(v)
        | FieldEdit::ClipSkip(v) => v.to_string(),
        FieldEdit::GuidanceScale(v) | FieldEdit::Strength(v) => v.to_string(),
        FieldEdit::Style(v) | FieldEdit::Facefix(v) | FieldEdit::Hypernetwork(v) => {
            show_choice(v).to_string()
        }
        FieldEdit::HighresFix(v) => v.to_string(),
    }
}

/// A draw request as the user typed it; unset fields fall back to guild defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrawRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub data_model: Option<String>,
    #[serde(default)]
    pub steps: Option<String>,
    #[serde(default)]
    pub width: Option<String>,
    #[serde(default)]
    pub height: Option<String>,
    #[serde(default)]
    pub guidance_scale: Option<String>,
    #[serde(default)]
    pub sampler: Option<String>,
    #[serde(default)]
    pub seed: Option<String>,
    #[serde(default)]
    pub strength: Option<String>,
    #[serde(default)]
    pub init_url: Option<String>,
    #[serde(default)]
    pub count: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub facefix: Option<String>,
    #[serde(default)]
    pub highres_fix: Option<String>,
    #[serde(default)]
    pub clip_skip: Option<String>,
    #[serde(default)]
    pub hypernetwork: Option<String>,
}

impl DrawRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    fn value(&self, field: DrawField) -> Option<&str> {
        let value = match field {
            DrawField::Prompt => Some(&self.prompt),
            DrawField::NegativePrompt => self.negative_prompt.as_ref(),
            DrawField::DataModel => self.data_model.as_ref(),
            DrawField::Steps => self.steps.as_ref(),
            DrawField::Width => self.width.as_ref(),
            DrawField::Height => self.height.as_ref(),
            DrawField::GuidanceScale => self.guidance_scale.as_ref(),
            DrawField::Sampler => self.sampler.as_ref(),
            DrawField::Seed => self.seed.as_ref(),
            DrawField::Strength => self.strength.as_ref(),
            DrawField::Count => self.count.as_ref(),
            DrawField::Style => self.style.as_ref(),
            DrawField::Facefix => self.facefix.as_ref(),
            DrawField::HighresFix => self.highres_fix.as_ref(),
            DrawField::ClipSkip => self.clip_skip.as_ref(),
            DrawField::Hypernetwork => self.hypernetwork.as_ref(),
        };
        value.map(String::as_str)
    }
}

/// Default parameters for a guild before any user input is applied.
fn base_params(defaults: &GuildDefaults, catalogs: &Catalogs) -> Result<DrawParams, FieldError> {
    let (model_index, model) = if defaults.data_model.is_empty() {
        (0, catalogs.model_at(0))
    } else {
        let (index, entry) = catalogs.find_model(&defaults.data_model).ok_or_else(|| {
            FieldError::new(
                DrawField::DataModel.name(),
                format!("default model '{}' is not in the catalog", defaults.data_model),
            )
        })?;
        (index, Some(entry))
    };
    Ok(DrawParams {
        prompt: String::new(),
        negative_prompt: defaults.negative_prompt.clone(),
        data_model: model.map(|m| m.full_name.clone()).unwrap_or_default(),
        steps: defaults.default_steps,
        width: defaults.default_width,
        height: defaults.default_height,
        guidance_scale: defaults.guidance_scale,
        sampler: defaults.sampler.clone(),
        seed: random_seed(),
        strength: DEFAULT_STRENGTH,
        init_image: None,
        count: defaults.default_count,
        style: None,
        facefix: None,
        highres_fix: false,
        clip_skip: defaults.clip_skip,
        raw_prompt: String::new(),
        model_index,
        hypernetwork: None,
    })
}

/// Resolve a new draw: apply guild defaults, validate every given field and prepend the
/// model's activator token.
pub fn resolve_draw(
    request: &DrawRequest,
    defaults: &GuildDefaults,
    catalogs: &Catalogs,
) -> Result<DrawParams, BotError> {
    let constraints = DrawConstraints::new(defaults, catalogs.clone());
    let mut errors = Vec::new();
    let mut edits = Vec::new();

    for field in DrawField::ALL {
        if let Some(value) = request.value(field) {
            match validate_field(field, value, &constraints) {
                Ok(edit) => edits.push(edit),
                Err(e) => errors.push(e),
            }
        }
    }
    let init_image = match request.init_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => match validate_image_url(url) {
            Ok(image) => Some(image),
            Err(e) => {
                errors.push(e);
                None
            }
        },
        _ => None,
    };
    let base = match base_params(defaults, catalogs) {
        Ok(base) => Some(base),
        Err(e) => {
            errors.push(e);
            None
        }
    };
    let Some(mut params) = base.filter(|_| errors.is_empty()) else {
        return Err(BotError::ValidationFailed(errors));
    };

    params.init_image = init_image;
    for edit in edits {
        match edit {
            FieldEdit::Prompt(v) => params.raw_prompt = v,
            FieldEdit::NegativePrompt(v) => params.negative_prompt = v,
            FieldEdit::DataModel { index, entry } => {
                params.model_index = index;
                params.data_model = entry.full_name;
            }
            FieldEdit::Steps(v) => params.steps = v,
            FieldEdit::Width(v) => params.width = v,
            FieldEdit::Height(v) => params.height = v,
            FieldEdit::GuidanceScale(v) => params.guidance_scale = v,
            FieldEdit::Sampler(v) => params.sampler = v,
            FieldEdit::Seed(v) => params.seed = v,
            FieldEdit::Strength(v) => params.strength = v,
            FieldEdit::Count(v) => params.count = v,
            FieldEdit::Style(v) => params.style = v,
            FieldEdit::Facefix(v) => params.facefix = v,
            FieldEdit::HighresFix(v) => params.highres_fix = v,
            FieldEdit::ClipSkip(v) => params.clip_skip = v,
            FieldEdit::Hypernetwork(v) => params.hypernetwork = v,
        }
    }
    let activator = catalogs
        .model_at(params.model_index)
        .and_then(ModelEntry::activator);
    params.prompt = compose_prompt(activator, &params.raw_prompt);
    Ok(params)
}

fn validate_image_url(url: &str) -> Result<ImageSource, FieldError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(ImageSource::new(url))
    } else {
        Err(FieldError::new("init_url", format!("'{}' is not an image URL", url)))
    }
}

/// An upscale request as typed by the user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpscaleRequest {
    pub init_url: String,
    #[serde(default)]
    pub resize: Option<f64>,
    #[serde(default)]
    pub upscaler_1: Option<String>,
    #[serde(default)]
    pub upscaler_2: Option<String>,
    #[serde(default)]
    pub upscaler_2_strength: Option<f64>,
}

pub fn resolve_upscale(
    request: &UpscaleRequest,
    catalogs: &Catalogs,
) -> Result<UpscaleParams, BotError> {
    let mut errors = Vec::new();
    let image = match validate_image_url(request.init_url.trim()) {
        Ok(image) => Some(image),
        Err(e) => {
            errors.push(e);
            None
        }
    };

    let resize = request.resize.unwrap_or(DEFAULT_RESIZE);
    if !(MIN_RESIZE..=MAX_RESIZE).contains(&resize) {
        errors.push(FieldError::new(
            "resize",
            format!("must be between {} and {}", MIN_RESIZE, MAX_RESIZE),
        ));
    }
    let upscaler_1 = request
        .upscaler_1
        .clone()
        .unwrap_or_else(|| DEFAULT_UPSCALER.to_string());
    if !catalogs.has_upscaler(&upscaler_1) {
        errors.push(FieldError::new(
            "upscaler_1",
            format!("unknown upscaler '{}'", upscaler_1),
        ));
    }
    let upscaler_2 = request
        .upscaler_2
        .clone()
        .filter(|u| !u.is_empty() && !u.eq_ignore_ascii_case(NONE_CHOICE));
    if let Some(name) = &upscaler_2 {
        if !catalogs.has_upscaler(name) {
            errors.push(FieldError::new(
                "upscaler_2",
                format!("unknown upscaler '{}'", name),
            ));
        }
    }
    let upscaler_2_strength = request.upscaler_2_strength.unwrap_or(0.5);
    if !(0.0..=1.0).contains(&upscaler_2_strength) {
        errors.push(FieldError::new(
            "upscaler_2_strength",
            "must be between 0 and 1",
        ));
    }

    match image {
        Some(image) if errors.is_empty() => Ok(UpscaleParams {
            image,
            resize,
            upscaler_1,
            upscaler_2,
            upscaler_2_strength,
        }),
        _ => Err(BotError::ValidationFailed(errors)),
    }
}

/// An identify request as typed by the user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentifyRequest {
    pub init_url: String,
    #[serde(default)]
    pub phrasing: Phrasing,
}

pub fn resolve_identify(request: &IdentifyRequest) -> Result<IdentifyParams, BotError> {
    let url = request.init_url.trim();
    if url.is_empty() {
        return Err(BotError::ValidationFailed(vec![FieldError::new(
            "init_url",
            "I need an image to identify!",
        )]));
    }
    let image = validate_image_url(url).map_err(|e| BotError::ValidationFailed(vec![e]))?;
    Ok(IdentifyParams {
        image,
        phrasing: request.phrasing,
    })
}
