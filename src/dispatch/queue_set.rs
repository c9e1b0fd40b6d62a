//! The three request queues and the post queue.

use crate::job::{Job, JobKind, PostJob};
use crate::types::UserId;
use std::collections::VecDeque;

/// FIFO queues, one per job kind, plus the post queue
#[derive(Debug, Default)]
pub struct QueueSet {
    draw: VecDeque<Job>,
    upscale: VecDeque<Job>,
    identify: VecDeque<Job>,
    post: VecDeque<PostJob>,
}

impl QueueSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, kind: JobKind) -> &VecDeque<Job> {
        match kind {
            JobKind::Draw => &self.draw,
            JobKind::Upscale => &self.upscale,
            JobKind::Identify => &self.identify,
        }
    }

    fn queue_mut(&mut self, kind: JobKind) -> &mut VecDeque<Job> {
        match kind {
            JobKind::Draw => &mut self.draw,
            JobKind::Upscale => &mut self.upscale,
            JobKind::Identify => &mut self.identify,
        }
    }

    /// Append to the job's kind queue and return the combined request length.
    pub fn push_request(&mut self, job: Job) -> usize {
        self.queue_mut(job.kind()).push_back(job);
        self.request_len()
    }

    /// Pop the next job: kinds in drain order, FIFO within a kind.
    pub fn pop_request(&mut self) -> Option<Job> {
        JobKind::DRAIN_ORDER
            .into_iter()
            .find_map(|kind| self.queue_mut(kind).pop_front())
    }

    /// Combined length of the request queues
    pub fn request_len(&self) -> usize {
        self.draw.len() + self.upscale.len() + self.identify.len()
    }

    pub fn kind_len(&self, kind: JobKind) -> usize {
        self.queue(kind).len()
    }

    /// Whether any request queue holds a job from `user`.
    pub fn has_requester(&self, user: UserId) -> bool {
        self.requests().any(|job| job.requester.id == user)
    }

    /// All queued requests, in drain order
    pub fn requests(&self) -> impl Iterator<Item = &Job> {
        self.draw
            .iter()
            .chain(self.upscale.iter())
            .chain(self.identify.iter())
    }

    pub fn push_post(&mut self, post: PostJob) {
        self.post.push_back(post);
    }

    pub fn pop_post(&mut self) -> Option<PostJob> {
        self.post.pop_front()
    }

    pub fn post_len(&self) -> usize {
        self.post.len()
    }

    pub fn is_empty(&self) -> bool {
        self.request_len() == 0 && self.post.is_empty()
    }
}
