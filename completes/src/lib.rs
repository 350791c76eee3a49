//! # Completes
//!
//! A single-assignment value that is completed asynchronously through an
//! ordered chain of stages.
//!
//! A pipeline is built once from its stages and then driven by `supply`:
//!
//! - **Transform and consumer stages**: map or observe the outcome in order
//! - **Failure sentinels**: an outcome equal to a stage's sentinel fails the pipeline
//! - **Deadlines**: a stage that stays active too long fails, racing its delivery
//! - **Recovery**: raised errors skip ahead to the next `recover_from` stage
//! - **Repeat mode**: the pipeline rewinds after each completion
//!
//! ## Quick Start
//!
//! ```rust
//! use completes::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let scheduler = Arc::new(ThreadScheduler::new()?);
//! let completes = Completes::with_initial(0)
//!     .with_scheduler(scheduler)
//!     .and_then_within(Duration::from_secs(1), |v| v * 2)
//!     .otherwise(|_| -1)
//!     .build()?;
//!
//! completes.supply(5);
//! assert_eq!(completes.wait(), Some(10));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod testing;
pub mod timer;

pub use pipeline::{Completes, CompletesBuilder};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{CompletesConfig, SchedulerConfig};
    pub use crate::core::{OutcomeState, StageKind, Waited};
    pub use crate::errors::{BuildError, CompletesError, ConfigError, RecoveryError};
    pub use crate::pipeline::{Completes, CompletesBuilder};
    pub use crate::stages::StageOptions;
    pub use crate::timer::{Scheduler, ThreadScheduler, TimerHandle, TokioScheduler};
}
