//! Dispatch Service
//!
//! Owns the request queues, the post queue and the generation worker state. Submissions
//! from any task go through [`DispatchService::submit`], which decides under one lock
//! whether the job runs now, waits in a queue, or is rejected as a duplicate.
//!
//! Two long-lived tasks are started by [`DispatchService::start`]: the generation worker
//! (the only caller of the backend) and the post worker (the only caller of
//! [`ReplySurface::post`]). They share nothing but the post queue.

use crate::backend::InferenceBackend;
use crate::config::DispatchConfig;
use crate::error::BotError;
use crate::job::{Job, PostJob};
use crate::reply::ReplySurface;
use crate::types::UserId;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub mod post;
pub mod queue_set;
pub mod worker;

pub use queue_set::QueueSet;

/// Why a submission was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The requester already has a job waiting in a request queue
    DuplicateUser,
}

/// Outcome of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "admission", rename_all = "snake_case")]
pub enum Admission {
    /// Handed straight to the idle worker
    RunImmediately,
    /// Appended; `position` is the combined request queue length after the append
    Enqueued { position: usize },
    Rejected { reason: RejectReason },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Admission::Rejected { .. })
    }

    /// Convert a rejection into the error the follow-up boundary reports.
    pub fn into_result(self, user: UserId) -> Result<Admission, BotError> {
        match self {
            Admission::Rejected { .. } => Err(BotError::AdmissionRejected(user)),
            admitted => Ok(admitted),
        }
    }
}

/// Generation worker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Draining,
}

/// Everything guarded by the dispatch lock
#[derive(Debug)]
pub(crate) struct DispatchState {
    pub(crate) queues: QueueSet,
    pub(crate) worker: WorkerState,
    /// Job handed to an idle worker, not yet picked up
    pub(crate) handoff: Option<Job>,
    /// Posts popped but not yet delivered
    pub(crate) posts_in_flight: usize,
}

impl DispatchState {
    fn new() -> Self {
        Self {
            queues: QueueSet::new(),
            worker: WorkerState::Idle,
            handoff: None,
            posts_in_flight: 0,
        }
    }

    /// Next job for the worker, or go Idle when there is none.
    pub(crate) fn take_next(&mut self) -> Option<Job> {
        let next = self.handoff.take().or_else(|| self.queues.pop_request());
        if next.is_none() {
            self.worker = WorkerState::Idle;
        }
        next
    }

    fn is_quiet(&self) -> bool {
        self.worker == WorkerState::Idle
            && self.handoff.is_none()
            && self.queues.is_empty()
            && self.posts_in_flight == 0
    }
}

pub(crate) type SharedState = Arc<Mutex<DispatchState>>;

/// Dispatch statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Jobs admitted (run immediately or enqueued)
    pub admitted: usize,
    /// Submissions rejected as duplicates
    pub rejected: usize,
    /// Jobs executed successfully
    pub completed: usize,
    /// Jobs whose backend call failed
    pub failed: usize,
    /// Posts delivered
    pub posted: usize,
    /// Posts the reply surface refused
    pub post_failures: usize,
}

/// Dispatch service: queues, gate and workers
pub struct DispatchService {
    state: SharedState,
    work_notify: Arc<Notify>,
    post_notify: Arc<Notify>,
    backend: Arc<dyn InferenceBackend>,
    surface: Arc<dyn ReplySurface>,
    config: DispatchConfig,
    running: Arc<RwLock<bool>>,
    workers: Arc<RwLock<Vec<JoinHandle<()>>>>,
    stats: Arc<RwLock<DispatchStats>>,
}

impl DispatchService {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        surface: Arc<dyn ReplySurface>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(DispatchState::new())),
            work_notify: Arc::new(Notify::new()),
            post_notify: Arc::new(Notify::new()),
            backend,
            surface,
            config,
            running: Arc::new(RwLock::new(false)),
            workers: Arc::new(RwLock::new(Vec::new())),
            stats: Arc::new(RwLock::new(DispatchStats::default())),
        }
    }

    /// Admit, enqueue or reject a job.
    pub fn submit(&self, job: Job) -> Admission {
        let job_id = job.id;
        let kind = job.kind();
        let requester = job.requester.id;

        let admission = {
            let mut state = self.state.lock();
            match state.worker {
                WorkerState::Idle => {
                    state.handoff = Some(job);
                    state.worker = WorkerState::Draining;
                    Admission::RunImmediately
                }
                WorkerState::Draining if state.queues.has_requester(requester) => {
                    Admission::Rejected {
                        reason: RejectReason::DuplicateUser,
                    }
                }
                WorkerState::Draining => Admission::Enqueued {
                    position: state.queues.push_request(job),
                },
            }
        };

        match admission {
            Admission::RunImmediately => {
                self.work_notify.notify_one();
                self.stats.write().admitted += 1;
                info!(job_id = %job_id, kind = %kind, requester = %requester, "Job handed to idle worker");
            }
            Admission::Enqueued { position } => {
                self.stats.write().admitted += 1;
                info!(job_id = %job_id, kind = %kind, requester = %requester, queue_len = position, "Job enqueued");
            }
            Admission::Rejected { .. } => {
                self.stats.write().rejected += 1;
                debug!(job_id = %job_id, kind = %kind, requester = %requester, "Duplicate submission rejected");
            }
        }
        admission
    }

    /// Refuse early when `user` already waits in a queue while the worker is busy.
    pub fn check_admission(&self, user: UserId) -> Result<(), BotError> {
        let state = self.state.lock();
        if state.worker == WorkerState::Draining && state.queues.has_requester(user) {
            return Err(BotError::AdmissionRejected(user));
        }
        Ok(())
    }

    /// Queue a result for delivery.
    pub fn enqueue_post(&self, post: PostJob) {
        post::enqueue(&self.state, &self.post_notify, post);
    }

    /// Combined length of the request queues
    pub fn queue_len(&self) -> usize {
        self.state.lock().queues.request_len()
    }

    pub fn post_queue_len(&self) -> usize {
        self.state.lock().queues.post_len()
    }

    pub fn worker_state(&self) -> WorkerState {
        self.state.lock().worker
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats.read().clone()
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Start the generation and post workers.
    pub fn start(&self) -> Result<(), BotError> {
        let mut running = self.running.write();
        if *running {
            return Ok(()); // Already running
        }
        *running = true;
        drop(running);

        let poll = Duration::from_millis(self.config.idle_poll_ms.max(1));
        let mut workers = self.workers.write();

        let generation = worker::GenerationWorker {
            state: Arc::clone(&self.state),
            work_notify: Arc::clone(&self.work_notify),
            post_notify: Arc::clone(&self.post_notify),
            backend: Arc::clone(&self.backend),
            running: Arc::clone(&self.running),
            stats: Arc::clone(&self.stats),
            poll,
        };
        workers.push(tokio::spawn(generation.run()));

        let posting = post::PostWorker {
            state: Arc::clone(&self.state),
            post_notify: Arc::clone(&self.post_notify),
            surface: Arc::clone(&self.surface),
            running: Arc::clone(&self.running),
            stats: Arc::clone(&self.stats),
            poll,
        };
        workers.push(tokio::spawn(posting.run()));

        info!(
            backend = self.backend.name(),
            worker_count = workers.len(),
            "Started dispatch workers"
        );
        Ok(())
    }

    /// Stop both workers. A job already executing finishes unless the grace period runs out.
    pub async fn stop(&self) -> Result<(), BotError> {
        let mut running = self.running.write();
        if !*running {
            return Ok(()); // Already stopped
        }
        *running = false;
        drop(running);

        self.work_notify.notify_one();
        self.post_notify.notify_one();

        let grace = Duration::from_millis(self.config.stop_grace_ms);
        let workers = std::mem::take(&mut *self.workers.write());
        let results = join_all(workers.into_iter().map(|mut handle| async move {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(_) => true,
                Err(_) => {
                    handle.abort();
                    false
                }
            }
        }))
        .await;

        let aborted = results.iter().filter(|finished| !**finished).count();
        if aborted > 0 {
            warn!(aborted, "Dispatch workers did not stop within the grace period");
        }
        info!("Stopped dispatch workers");
        Ok(())
    }

    /// Wait until every queue is empty, the worker is idle and no post is in flight.
    pub async fn wait_for_idle(&self, timeout: Option<Duration>) -> Result<(), BotError> {
        let start = Instant::now();
        loop {
            if self.state.lock().is_quiet() {
                return Ok(());
            }

            if let Some(timeout) = timeout {
                if start.elapsed() >= timeout {
                    return Err(BotError::Timeout {
                        what: "waiting for dispatch queues to drain".to_string(),
                        waited_ms: timeout.as_millis() as u64,
                    });
                }
            }

            sleep(Duration::from_millis(10)).await;
        }
    }
}
