//! Integration tests for the dispatch gate
//!
//! Tests cover:
//! - Hand-off to the idle worker
//! - Queue positions and the duplicate-user guard
//! - Kind priority when draining
//! - Admission after the queues drain

use super::support::*;
use aiya::dispatch::{Admission, RejectReason, WorkerState};
use aiya::error::BotError;
use aiya::job::Job;
use aiya::types::UserId;
use aiya::validation::{resolve_identify, resolve_upscale, IdentifyRequest, UpscaleRequest};
use std::sync::Arc;

fn upscale_job(user: u64) -> Job {
    let request = UpscaleRequest {
        init_url: "https://cdn.example/in.png".to_string(),
        ..UpscaleRequest::default()
    };
    Job::upscale(
        requester(user),
        target(),
        resolve_upscale(&request, &catalogs()).unwrap(),
    )
}

fn identify_job(user: u64) -> Job {
    let request = IdentifyRequest {
        init_url: "https://cdn.example/in.png".to_string(),
        ..IdentifyRequest::default()
    };
    Job::identify(requester(user), target(), resolve_identify(&request).unwrap())
}

#[tokio::test]
async fn test_positions_and_duplicate_rejection() {
    let service = service(Arc::new(MockBackend::new()), Arc::new(RecordingSurface::default()));

    assert_eq!(service.submit(draw_job(1, "a")), Admission::RunImmediately);
    assert_eq!(service.worker_state(), WorkerState::Draining);
    assert_eq!(service.queue_len(), 0);

    assert_eq!(
        service.submit(draw_job(2, "b")),
        Admission::Enqueued { position: 1 }
    );
    assert_eq!(
        service.submit(upscale_job(3)),
        Admission::Enqueued { position: 2 }
    );
    // User 2 is queued as a draw; a job of another kind is still a duplicate.
    assert_eq!(
        service.submit(identify_job(2)),
        Admission::Rejected {
            reason: RejectReason::DuplicateUser
        }
    );
    assert_eq!(service.queue_len(), 2);

    let stats = service.stats();
    assert_eq!(stats.admitted, 3);
    assert_eq!(stats.rejected, 1);
}

#[tokio::test]
async fn test_running_job_owner_may_queue_one_more() {
    let service = service(Arc::new(MockBackend::new()), Arc::new(RecordingSurface::default()));

    assert_eq!(service.submit(draw_job(1, "a")), Admission::RunImmediately);
    assert_eq!(
        service.submit(draw_job(1, "b")),
        Admission::Enqueued { position: 1 }
    );
    assert!(!service.submit(draw_job(1, "c")).is_admitted());

    let err = service.check_admission(UserId(1)).unwrap_err();
    assert!(matches!(err, BotError::AdmissionRejected(UserId(1))));
    assert!(service.check_admission(UserId(2)).is_ok());
}

#[tokio::test]
async fn test_drain_order_prefers_draws() {
    let (backend, gate) = MockBackend::held();
    let backend = Arc::new(backend);
    let service = service(Arc::clone(&backend), Arc::new(RecordingSurface::default()));
    service.start().unwrap();

    service.submit(identify_job(1));
    assert!(wait_until(WAIT, || backend.call_kinds().len() == 1).await);

    service.submit(identify_job(2));
    service.submit(upscale_job(3));
    service.submit(draw_job(4, "late draw"));
    assert_eq!(service.queue_len(), 3);

    gate.add_permits(4);
    service.wait_for_idle(Some(WAIT)).await.unwrap();

    assert_eq!(
        backend.call_kinds(),
        vec![Call::Interrogate, Call::Generate, Call::Upscale, Call::Interrogate]
    );
    assert_eq!(service.worker_state(), WorkerState::Idle);
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_user_admitted_again_after_drain() {
    let (backend, gate) = MockBackend::held();
    let backend = Arc::new(backend);
    let service = service(Arc::clone(&backend), Arc::new(RecordingSurface::default()));
    service.start().unwrap();

    service.submit(draw_job(1, "first"));
    assert_eq!(
        service.submit(draw_job(2, "second")),
        Admission::Enqueued { position: 1 }
    );
    assert!(!service.submit(draw_job(2, "third")).is_admitted());

    gate.add_permits(2);
    service.wait_for_idle(Some(WAIT)).await.unwrap();

    // Idle again: the next submission is handed straight to the worker.
    gate.add_permits(1);
    assert_eq!(
        service.submit(draw_job(2, "third")),
        Admission::RunImmediately
    );
    service.wait_for_idle(Some(WAIT)).await.unwrap();
    assert_eq!(backend.prompts(), vec!["first", "second", "third"]);
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_submissions_keep_one_job_per_user() {
    let service = service(Arc::new(MockBackend::new()), Arc::new(RecordingSurface::default()));
    service.submit(draw_job(99, "occupy"));

    let mut handles = Vec::new();
    for i in 0..40u64 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.submit(draw_job(i % 8, "burst"))
        }));
    }
    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap().is_admitted() {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 8);
    assert_eq!(service.queue_len(), 8);
    assert_eq!(service.stats().rejected, 32);
}
