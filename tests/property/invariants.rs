//! Property-based tests for admission and resubmission invariants

use aiya::backend::{BackendRequest, GeneratedImages, InferenceBackend};
use aiya::config::DispatchConfig;
use aiya::dispatch::{Admission, DispatchService, RejectReason};
use aiya::edit::FollowUpHandler;
use aiya::error::{BackendError, BotError};
use aiya::job::{compose_prompt, DrawParams, Job, JobSnapshot, PostJob};
use aiya::reply::{FollowUpAction, Notice, ReplyControls, ReplySurface};
use aiya::settings::{Catalogs, GuildDefaults, InMemorySettings, ModelEntry, SettingsStore};
use aiya::types::{ChannelId, GuildId, MessageId, ReplyTarget, Requester, UserId};
use aiya::validation::{parse_edit_lines, resolve_draw, DrawConstraints, DrawRequest};
use async_trait::async_trait;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

struct NullBackend;

#[async_trait]
impl InferenceBackend for NullBackend {
    async fn generate(&self, _request: BackendRequest) -> Result<GeneratedImages, BackendError> {
        Ok(GeneratedImages {
            images: Vec::new(),
            info: None,
        })
    }

    async fn upscale(&self, _request: BackendRequest) -> Result<Vec<u8>, BackendError> {
        Ok(Vec::new())
    }

    async fn interrogate(&self, _request: BackendRequest) -> Result<String, BackendError> {
        Ok(String::new())
    }

    async fn fetch_image(&self, _url: &str) -> Result<Vec<u8>, BackendError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "null"
    }
}

struct NullSurface;

#[async_trait]
impl ReplySurface for NullSurface {
    async fn post(&self, _post: &PostJob) -> Result<MessageId, BotError> {
        Ok(MessageId(1))
    }

    async fn notify(
        &self,
        _recipient: UserId,
        _target: &ReplyTarget,
        _notice: &Notice,
    ) -> Result<(), BotError> {
        Ok(())
    }

    async fn disable_action(
        &self,
        _message: MessageId,
        _action: FollowUpAction,
    ) -> Result<(), BotError> {
        Ok(())
    }

    async fn delete(&self, _message: MessageId) -> Result<(), BotError> {
        Ok(())
    }
}

/// A service whose workers never start, so the first job stays running forever.
fn stalled_service() -> Arc<DispatchService> {
    Arc::new(DispatchService::new(
        Arc::new(NullBackend),
        Arc::new(NullSurface),
        DispatchConfig {
            start_workers: false,
            ..DispatchConfig::default()
        },
    ))
}

fn catalogs() -> Catalogs {
    Catalogs {
        models: vec![
            ModelEntry {
                display_name: "Default".to_string(),
                full_name: "v1-5-pruned.ckpt".to_string(),
                activator_token: None,
            },
            ModelEntry {
                display_name: "Anime".to_string(),
                full_name: "anything-v3.ckpt".to_string(),
                activator_token: Some("anime style".to_string()),
            },
        ],
        ..Catalogs::default()
    }
}

fn draw_job(user: u64, params: DrawParams) -> Job {
    Job::draw(
        Requester::new(UserId(user), format!("user{}", user)),
        ReplyTarget::new(Some(GuildId(1)), ChannelId(2)),
        params,
    )
}

fn params(model: &str, prompt: &str, seed: u32) -> DrawParams {
    let mut request = DrawRequest::new(prompt);
    request.data_model = Some(model.to_string());
    request.seed = Some(seed.to_string());
    resolve_draw(&request, &GuildDefaults::default(), &catalogs()).unwrap()
}

fn raw_prompt() -> impl Strategy<Value = String> {
    "[a-z][a-z ]{0,24}[a-z]"
}

fn model() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("Default"), Just("Anime")]
}

/// Valid `name:value` lines, each field at most once.
fn valid_lines() -> impl Strategy<Value = Vec<(&'static str, String)>> {
    (
        1u32..=50,
        prop::sample::select(vec![256u32, 512, 768]),
        prop::sample::select(vec!["Euler a", "DDIM"]),
        1u32..=12,
        raw_prompt(),
        prop::sample::subsequence(vec![0usize, 1, 2, 3, 4], 0..=5),
    )
        .prop_map(|(steps, width, sampler, clip_skip, prompt, picked)| {
            let all = [
                ("steps", steps.to_string()),
                ("width", width.to_string()),
                ("sampler", sampler.to_string()),
                ("clip_skip", clip_skip.to_string()),
                ("prompt", prompt),
            ];
            picked.into_iter().map(|i| all[i].clone()).collect()
        })
}

fn invalid_line() -> impl Strategy<Value = (&'static str, String)> {
    prop_oneof![
        (51u32..500).prop_map(|v| ("steps", v.to_string())),
        Just(("width", "513".to_string())),
        Just(("sampler", "Nope".to_string())),
        (13u32..40).prop_map(|v| ("clip_skip", v.to_string())),
    ]
}

proptest! {
    /// Admission against a model of the gate: one running job, then a FIFO of
    /// distinct waiting users.
    #[test]
    fn prop_queue_holds_each_user_at_most_once(users in prop::collection::vec(0u64..6, 1..40)) {
        let service = stalled_service();
        let base = params("Default", "a cat", 1);
        let mut queued: Vec<u64> = Vec::new();

        for (i, user) in users.iter().enumerate() {
            let admission = service.submit(draw_job(*user, base.clone()));
            let expected = if i == 0 {
                Admission::RunImmediately
            } else if queued.contains(user) {
                Admission::Rejected { reason: RejectReason::DuplicateUser }
            } else {
                queued.push(*user);
                Admission::Enqueued { position: queued.len() }
            };
            prop_assert_eq!(admission, expected);
            prop_assert_eq!(service.queue_len(), queued.len());
        }

        let distinct: HashSet<u64> = queued.iter().copied().collect();
        prop_assert_eq!(distinct.len(), queued.len());
        let stats = service.stats();
        prop_assert_eq!(stats.admitted + stats.rejected, users.len());
    }

    #[test]
    fn prop_reprompt_keeps_activator_prefix(
        model in model(),
        old in raw_prompt(),
        new in raw_prompt(),
    ) {
        let original = params(model, &old, 7);
        let token = catalogs().models[original.model_index].activator_token.clone();

        let next = original.with_raw_prompt(&new);
        prop_assert_eq!(&next.prompt, &compose_prompt(token.as_deref(), &new));
        prop_assert_eq!(&next.raw_prompt, &new);
        prop_assert!(next.prompt_is_consistent());
        prop_assert_eq!(next.with_raw_prompt(&new).prompt, next.prompt.clone());
    }

    #[test]
    fn prop_reroll_changes_only_the_seed(
        model in model(),
        prompt in raw_prompt(),
        seed in any::<u32>(),
        new_seed in any::<u32>(),
    ) {
        let original = params(model, &prompt, seed);
        let rerolled = original.with_seed(new_seed);
        prop_assert_eq!(rerolled.seed, new_seed);
        prop_assert_eq!(
            DrawParams { seed: original.seed, ..rerolled },
            original
        );
    }

    /// One bad line rejects the whole form and nothing gets queued; once corrected, every
    /// line applies.
    #[test]
    fn prop_extended_edit_is_all_or_nothing(
        valid in valid_lines(),
        invalid in invalid_line(),
        insert_at in 0usize..5,
    ) {
        let mut lines: Vec<String> = valid
            .iter()
            .filter(|(f, _)| *f != invalid.0)
            .map(|(f, v)| format!("{}:{}", f, v))
            .collect();
        let at = insert_at.min(lines.len());
        lines.insert(at, format!("{}:{}", invalid.0, invalid.1));
        let text = lines.join("\n");

        let constraints = DrawConstraints::new(&GuildDefaults::default(), catalogs());
        match parse_edit_lines(&text, &constraints) {
            Err(BotError::ValidationFailed(fields)) => {
                let named: HashSet<&str> = fields.iter().map(|f| f.field.as_str()).collect();
                prop_assert_eq!(named, HashSet::from([invalid.0]));
                prop_assert_eq!(fields.len(), 1);
            }
            other => prop_assert!(false, "expected a validation failure, got {:?}", other),
        }

        let service = stalled_service();
        let settings: Arc<dyn SettingsStore> =
            Arc::new(InMemorySettings::new(GuildDefaults::default(), catalogs()));
        let handler = FollowUpHandler::new(
            Arc::clone(&service),
            settings,
            vec!["On it!".to_string()],
        );
        let job = draw_job(1, params("Anime", "a fox", 3));
        let controls = ReplyControls {
            view: job.reply_view.clone(),
            snapshot: JobSnapshot::capture(&job).unwrap(),
        };

        prop_assert!(handler.submit_extended_edit(&controls, UserId(1), &text).is_err());
        prop_assert_eq!(service.stats().admitted, 0);
        prop_assert_eq!(service.queue_len(), 0);

        let corrected = match invalid.0 {
            "steps" => "20",
            "width" => "512",
            "sampler" => "DDIM",
            _ => "2",
        };
        lines[at] = format!("{}:{}", invalid.0, corrected);
        let edits = parse_edit_lines(&lines.join("\n"), &constraints).unwrap();
        prop_assert_eq!(edits.len(), lines.len());
        prop_assert!(handler.submit_extended_edit(&controls, UserId(1), &lines.join("\n")).is_ok());
        prop_assert_eq!(service.stats().admitted, 1);
    }
}
