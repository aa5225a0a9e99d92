//! Crash-resumable orchestration harness for multi-phase agent plans.
//!
//! A plan is a named unit of work moving through a workflow of phases, with a
//! dependency-tracked task set per phase. All state lives in plain files under
//! `plans/`, so a driver process can die at any point and resume from disk
//! alone. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (task graphs, phase transitions,
//!   artifact resolution, workflow expansion). No I/O, fully testable in
//!   isolation.
//! - **[`io`]**: Side-effecting operations (atomic file persistence, schema
//!   validation, progress logs).
//!
//! The [`plan`] module coordinates core logic with I/O to implement the
//! operations the CLI exposes.

pub mod core;
pub mod error;
pub mod io;
pub mod logging;
pub mod plan;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
