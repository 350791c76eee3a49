//! Pipeline building and execution.
//!
//! This module provides:
//! - The [`Completes`] handle: supply, wait and inspect
//! - [`CompletesBuilder`] for registering stages with validation
//! - Per-stage deadline races driven by a [`Scheduler`](crate::timer::Scheduler)

mod activation;
mod builder;
mod completes;


pub use builder::CompletesBuilder;
pub use completes::{Completes, OtherwiseFn};
