//! Integration tests for the follow-up protocol against running workers

use super::support::*;
use aiya::dispatch::{Admission, DispatchService};
use aiya::edit::{FollowUpHandler, RePromptForm};
use aiya::error::BotError;
use aiya::job::{Job, JobSnapshot};
use aiya::reply::{FollowUpAction, ReplyControls};
use aiya::settings::{DefaultsUpdate, InMemorySettings, SettingsStore};
use aiya::types::{GuildId, UserId};
use aiya::validation::resolve_draw;
use std::sync::Arc;

struct Harness {
    backend: Arc<MockBackend>,
    surface: Arc<RecordingSurface>,
    service: Arc<DispatchService>,
    settings: Arc<InMemorySettings>,
    handler: FollowUpHandler,
}

fn harness(backend: MockBackend) -> Harness {
    let backend = Arc::new(backend);
    let surface = Arc::new(RecordingSurface::default());
    let service = service(Arc::clone(&backend), Arc::clone(&surface));
    let settings = Arc::new(InMemorySettings::new(defaults(), catalogs()));
    let handler = FollowUpHandler::new(
        Arc::clone(&service),
        Arc::clone(&settings) as Arc<dyn SettingsStore>,
        vec!["I'm imagining it!".to_string()],
    );
    Harness {
        backend,
        surface,
        service,
        settings,
        handler,
    }
}

/// Run one draw to completion and return the controls of its post.
async fn posted(h: &Harness, user: u64, model: &str, prompt: &str) -> ReplyControls {
    let params = resolve_draw(&draw_request(model, prompt), &defaults(), &catalogs()).unwrap();
    h.service.submit(Job::draw(requester(user), target(), params));
    h.service.wait_for_idle(Some(WAIT)).await.unwrap();
    let index = h.surface.posts().len() - 1;
    h.surface.controls(index)
}

fn decode(controls: &ReplyControls) -> Job {
    controls.snapshot.decode().unwrap()
}

#[tokio::test]
async fn test_reroll_reruns_with_only_a_new_seed() {
    let h = harness(MockBackend::new());
    h.service.start().unwrap();
    let controls = posted(&h, 1, "Anime", "a fox").await;

    let result = h.handler.reroll(&controls, UserId(1)).unwrap();
    assert_eq!(result.admission, Admission::RunImmediately);
    assert_eq!(result.disable_trigger, Some(FollowUpAction::ReRoll));
    h.service.wait_for_idle(Some(WAIT)).await.unwrap();

    let calls = h.backend.calls();
    assert_eq!(calls.len(), 2);
    let mut first = calls[0].1.payload.clone();
    let mut second = calls[1].1.payload.clone();
    assert_ne!(first["seed"], second["seed"]);
    first["seed"] = 0.into();
    second["seed"] = 0.into();
    assert_eq!(first, second);

    let rerolled = decode(&h.surface.controls(1));
    assert_eq!(rerolled.id, result.job_id);
    assert_ne!(rerolled.id, decode(&controls).id);
    h.service.stop().await.unwrap();
}

#[tokio::test]
async fn test_reprompt_keeps_activator_and_settings() {
    let h = harness(MockBackend::new());
    h.service.start().unwrap();
    let controls = posted(&h, 1, "Anime", "a fox").await;

    let form = h.handler.open_reprompt(&controls, UserId(1)).unwrap();
    assert_eq!(form.prompt, "a fox");
    let result = h
        .handler
        .submit_reprompt(
            &controls,
            UserId(1),
            &RePromptForm {
                prompt: "a wolf".to_string(),
                ..form
            },
        )
        .unwrap();
    assert_eq!(result.changes, vec!["New prompt: ``a wolf``".to_string()]);
    assert_eq!(result.disable_trigger, None);
    h.service.wait_for_idle(Some(WAIT)).await.unwrap();

    assert_eq!(h.backend.prompts(), vec!["anime style a fox", "anime style a wolf"]);
    let calls = h.backend.calls();
    assert_eq!(calls[1].1.payload["seed"], 1234);
    h.service.stop().await.unwrap();
}

#[tokio::test]
async fn test_extended_edit_changes_model_and_steps() {
    let h = harness(MockBackend::new());
    h.service.start().unwrap();
    let controls = posted(&h, 1, "Anime", "a fox").await;

    let form = h.handler.open_extended_edit(&controls, UserId(1)).unwrap();
    assert!(form.contains("data_model:Anime"));

    let result = h
        .handler
        .submit_extended_edit(&controls, UserId(1), "data_model:Default\nsteps:12")
        .unwrap();
    assert!(result.admission.is_admitted());
    h.service.wait_for_idle(Some(WAIT)).await.unwrap();

    let calls = h.backend.calls();
    let payload = &calls[1].1.payload;
    assert_eq!(payload["prompt"], "a fox");
    assert_eq!(payload["steps"], 12);
    assert_eq!(
        calls[1].1.selected_model.as_deref(),
        Some("models/v1-5-pruned.ckpt")
    );
    h.service.stop().await.unwrap();
}

#[tokio::test]
async fn test_multiline_reprompt_can_be_edited_again() {
    let h = harness(MockBackend::new());
    h.service.start().unwrap();
    let controls = posted(&h, 1, "Anime", "a fox").await;

    let form = h.handler.open_reprompt(&controls, UserId(1)).unwrap();
    h.handler
        .submit_reprompt(
            &controls,
            UserId(1),
            &RePromptForm {
                prompt: "a fox\nin snow".to_string(),
                ..form
            },
        )
        .unwrap();
    h.service.wait_for_idle(Some(WAIT)).await.unwrap();
    let controls = h.surface.controls(1);

    let text = h.handler.open_extended_edit(&controls, UserId(1)).unwrap();
    assert!(text.starts_with("prompt:a fox\\nin snow\n"));
    let result = h
        .handler
        .submit_extended_edit(&controls, UserId(1), &text)
        .unwrap();
    assert!(result.changes.is_empty());
    h.service.wait_for_idle(Some(WAIT)).await.unwrap();

    assert_eq!(
        h.backend.prompts(),
        vec![
            "anime style a fox",
            "anime style a fox\nin snow",
            "anime style a fox\nin snow",
        ]
    );
    h.service.stop().await.unwrap();
}

#[tokio::test]
async fn test_edit_refused_while_owner_is_queued() {
    let (backend, gate) = MockBackend::held();
    let h = harness(backend);
    h.service.start().unwrap();

    gate.add_permits(1);
    let controls = posted(&h, 1, "Default", "a fox").await;

    h.service.submit(draw_job(7, "busy"));
    assert!(wait_until(WAIT, || h.backend.calls().len() == 2).await);
    let queued = h.handler.reroll(&controls, UserId(1)).unwrap();
    assert_eq!(queued.admission, Admission::Enqueued { position: 1 });

    let err = h.handler.open_reprompt(&controls, UserId(1)).unwrap_err();
    assert!(matches!(err, BotError::AdmissionRejected(UserId(1))));
    let err = h.handler.reroll(&controls, UserId(1)).unwrap_err();
    assert_eq!(err.notice().text, "Please wait! You're queued up.");
    assert_eq!(h.service.queue_len(), 1);

    gate.add_permits(2);
    h.service.wait_for_idle(Some(WAIT)).await.unwrap();
    h.service.stop().await.unwrap();
}

#[tokio::test]
async fn test_review_and_delete_do_not_queue() {
    let h = harness(MockBackend::new());
    h.service.start().unwrap();
    let controls = posted(&h, 1, "Anime", "a fox").await;
    let admitted = h.service.stats().admitted;

    for _ in 0..3 {
        let report = h.handler.review(&controls).unwrap();
        assert!(report.copy_command.starts_with("/draw prompt:a fox data_model:Anime"));
    }
    assert!(h.handler.delete(&controls, UserId(2)).is_err());
    assert!(h.handler.delete(&controls, UserId(1)).is_ok());

    assert_eq!(h.service.stats().admitted, admitted);
    assert_eq!(h.service.queue_len(), 0);
    h.service.stop().await.unwrap();
}

#[tokio::test]
async fn test_guild_ceiling_change_applies_to_extended_edit() {
    let h = harness(MockBackend::new());
    let controls = unrun_controls();

    h.settings
        .update_defaults(
            GuildId(10),
            &DefaultsUpdate {
                max_steps: Some(20),
                ..DefaultsUpdate::default()
            },
        )
        .unwrap();

    let err = h
        .handler
        .submit_extended_edit(&controls, UserId(1), "steps:25")
        .unwrap_err();
    assert!(matches!(err, BotError::ValidationFailed(ref fields) if fields[0].field == "steps"));
    assert!(h
        .handler
        .submit_extended_edit(&controls, UserId(1), "steps:20")
        .is_ok());
}

/// Controls for a draw that was never run; enough for the decision functions.
fn unrun_controls() -> ReplyControls {
    let job = draw_job(1, "a fox");
    ReplyControls {
        view: job.reply_view.clone(),
        snapshot: JobSnapshot::capture(&job).unwrap(),
    }
}
