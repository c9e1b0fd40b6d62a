//! Property-based tests for dispatch and edit invariants

mod invariants;
