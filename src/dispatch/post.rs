//! Post worker: delivers executed results through the reply surface.

use super::{DispatchState, DispatchStats, SharedState};
use crate::job::PostJob;
use crate::reply::ReplySurface;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Append a post and wake the post worker.
pub(crate) fn enqueue(state: &Mutex<DispatchState>, notify: &Notify, post: PostJob) {
    let post_len = {
        let mut state = state.lock();
        state.queues.push_post(post);
        state.queues.post_len()
    };
    debug!(post_len, "Post enqueued");
    notify.notify_one();
}

pub(crate) struct PostWorker {
    pub(crate) state: SharedState,
    pub(crate) post_notify: Arc<Notify>,
    pub(crate) surface: Arc<dyn ReplySurface>,
    pub(crate) running: Arc<RwLock<bool>>,
    pub(crate) stats: Arc<RwLock<DispatchStats>>,
    pub(crate) poll: Duration,
}

impl PostWorker {
    pub(crate) async fn run(self) {
        debug!("Post worker started");

        while *self.running.read() {
            let next = {
                let mut state = self.state.lock();
                let next = state.queues.pop_post();
                if next.is_some() {
                    state.posts_in_flight += 1;
                }
                next
            };

            let Some(post) = next else {
                tokio::select! {
                    _ = self.post_notify.notified() => continue,
                    _ = sleep(self.poll) => continue,
                }
            };

            match self.surface.post(&post).await {
                Ok(message_id) => {
                    self.stats.write().posted += 1;
                    debug!(
                        job_id = %post.job_id,
                        message_id = %message_id,
                        success = post.is_success(),
                        "Result posted"
                    );
                }
                Err(e) => {
                    // Not retried; later posts must not wait on this one.
                    self.stats.write().post_failures += 1;
                    warn!(
                        job_id = %post.job_id,
                        channel_id = %post.reply_target.channel_id,
                        error = %e,
                        "Failed to post result"
                    );
                }
            }
            self.state.lock().posts_in_flight -= 1;
        }

        debug!("Post worker stopped");
    }
}
