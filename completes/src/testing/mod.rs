//! Testing utilities for completes pipelines.
//!
//! This module provides:
//! - A manually advanced scheduler for deterministic deadline tests
//! - A probe for recording values seen by stage closures

mod probe;
mod scheduler;

pub use probe::Probe;
pub use scheduler::ManualScheduler;
