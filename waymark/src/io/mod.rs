//! Filesystem persistence: the store is the single source of truth.
//!
//! Nothing in here caches state across invocations; every operation reloads
//! from disk and commits with an atomic single-file replace, which is what
//! makes crash-and-resume work.

pub mod advisory;
pub mod layout;
pub mod pointers;
pub mod progress;
pub mod state_store;
pub mod store;
pub mod task_store;
pub mod workflow_store;
