//! Deterministic, pure logic shared by the engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests; all
//! persistence goes through [`crate::io`].

pub mod artifact;
pub mod expansion;
pub mod graph;
pub mod state;
pub mod task;
pub mod workflow;
