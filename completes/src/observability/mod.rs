//! Observability utilities.
//!
//! Pipelines log through `tracing`: each supply and each expired deadline
//! opens a span carrying the pipeline id and name, with stage dispatch at
//! trace level. This module installs subscribers for binaries and tests.

mod subscriber;

pub use subscriber::{init_test_tracing, init_tracing, LogFormat};
