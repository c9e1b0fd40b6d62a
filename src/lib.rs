//! aiya: Stable Diffusion chat-bot job dispatch engine
//!
//! Typed request queues behind a dispatch gate with a duplicate-user guard, one
//! generation worker talking to the inference backend, a post worker delivering results,
//! and the follow-up protocol (re-prompt, re-roll, review, delete, extended edit) that
//! resubmits edited jobs through the same gate.

pub mod backend;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod edit;
pub mod error;
pub mod job;
pub mod logging;
pub mod reply;
pub mod settings;
pub mod types;
pub mod validation;
