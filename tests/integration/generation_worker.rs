//! Integration tests for the generation and post workers

use super::support::*;
use aiya::job::{Job, JobKind, PostOutcome};
use aiya::reply::FollowUpAction;
use aiya::validation::{resolve_draw, resolve_identify, IdentifyRequest};
use std::sync::Arc;

#[tokio::test]
async fn test_draw_is_executed_and_posted() {
    let backend = Arc::new(MockBackend::new());
    let surface = Arc::new(RecordingSurface::default());
    let service = service(Arc::clone(&backend), Arc::clone(&surface));
    service.start().unwrap();

    let mut request = draw_request("Anime", "a fox in the snow");
    request.count = Some("2".to_string());
    let params = resolve_draw(&request, &defaults(), &catalogs()).unwrap();
    service.submit(Job::draw(requester(1), target(), params));
    service.wait_for_idle(Some(WAIT)).await.unwrap();

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    let (_, call) = &calls[0];
    assert_eq!(call.payload["prompt"], "anime style a fox in the snow");
    assert_eq!(call.payload["n_iter"], 2);
    assert_eq!(call.selected_model.as_deref(), Some("anime\\anything-v3.ckpt"));
    assert!(!call.is_img2img());

    let posts = surface.posts();
    assert_eq!(posts.len(), 1);
    let post = &posts[0].1;
    assert_eq!(post.outcome, PostOutcome::Success);
    assert_eq!(post.reply_target, target());
    assert_eq!(post.content, "<@1>, here is what I imagined!");
    assert_eq!(post.summary.field("Seed"), Some("1234"));
    let names: Vec<&str> = post.attachments.iter().map(|a| a.filename.as_str()).collect();
    assert_eq!(names, vec!["1234-0.png", "1234-1.png"]);

    let controls = surface.controls(0);
    assert_eq!(controls.view.actions, FollowUpAction::ALL.to_vec());
    assert_eq!(controls.snapshot.decode().unwrap().id, post.job_id);

    let stats = service.stats();
    assert_eq!((stats.completed, stats.failed, stats.posted), (1, 0, 1));
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_backend_failure_is_posted_and_worker_continues() {
    let backend = Arc::new(MockBackend::failing_on("broken"));
    let surface = Arc::new(RecordingSurface::default());
    let service = service(Arc::clone(&backend), Arc::clone(&surface));

    service.submit(draw_job(1, "broken"));
    service.submit(draw_job(2, "fine"));
    service.start().unwrap();
    service.wait_for_idle(Some(WAIT)).await.unwrap();

    let posts = surface.posts();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].1.outcome, PostOutcome::Failure);
    assert!(posts[0].1.controls.is_none());
    assert!(posts[0]
        .1
        .summary
        .description
        .as_deref()
        .unwrap()
        .contains("CUDA out of memory"));
    assert_eq!(posts[1].1.outcome, PostOutcome::Success);

    let stats = service.stats();
    assert_eq!((stats.completed, stats.failed), (1, 1));
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_init_image_switches_to_img2img() {
    let backend = Arc::new(MockBackend::new());
    let surface = Arc::new(RecordingSurface::default());
    let service = service(Arc::clone(&backend), Arc::clone(&surface));
    service.start().unwrap();

    let mut request = draw_request("Default", "repaint this");
    request.init_url = Some("https://cdn.example/source.png".to_string());
    request.strength = Some("0.4".to_string());
    let params = resolve_draw(&request, &defaults(), &catalogs()).unwrap();
    service.submit(Job::draw(requester(1), target(), params));
    service.wait_for_idle(Some(WAIT)).await.unwrap();

    let calls = backend.calls();
    let (_, call) = &calls[0];
    assert!(call.is_img2img());
    assert_eq!(call.payload["denoising_strength"], 0.4);
    assert_eq!(
        call.payload["init_images"][0],
        "data:image/png;base64,qrs="
    );
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_identify_posts_caption_without_edit_controls() {
    let backend = Arc::new(MockBackend::new());
    let surface = Arc::new(RecordingSurface::default());
    let service = service(Arc::clone(&backend), Arc::clone(&surface));
    service.start().unwrap();

    let request = IdentifyRequest {
        init_url: "https://cdn.example/cat.png".to_string(),
        ..IdentifyRequest::default()
    };
    service.submit(Job::identify(
        requester(5),
        target(),
        resolve_identify(&request).unwrap(),
    ));
    service.wait_for_idle(Some(WAIT)).await.unwrap();

    let posts = surface.posts();
    let post = &posts[0].1;
    assert_eq!(post.kind, JobKind::Identify);
    assert_eq!(
        post.summary.field("I think this is"),
        Some("``a cat sitting on a windowsill``")
    );
    assert_eq!(post.summary.image_url.as_deref(), Some("https://cdn.example/cat.png"));
    assert_eq!(post.summary.footer.as_deref(), Some("user5"));
    assert_eq!(surface.controls(0).view.actions, vec![FollowUpAction::Delete]);
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_refused_post_is_counted_not_retried() {
    let backend = Arc::new(MockBackend::new());
    let surface = Arc::new(RecordingSurface::refusing());
    let service = service(Arc::clone(&backend), Arc::clone(&surface));
    service.start().unwrap();

    service.submit(draw_job(1, "nowhere to go"));
    service.wait_for_idle(Some(WAIT)).await.unwrap();

    let stats = service.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.posted, 0);
    assert_eq!(stats.post_failures, 1);
    assert_eq!(service.post_queue_len(), 0);
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let service = service(Arc::new(MockBackend::new()), Arc::new(RecordingSurface::default()));
    service.start().unwrap();
    service.start().unwrap();
    assert!(service.is_running());
    service.stop().await.unwrap();
    service.stop().await.unwrap();
    assert!(!service.is_running());
}
