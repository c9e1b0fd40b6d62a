//! Merge rules for the layered sources.

pub mod merge_policy;
