//! Core types: outcome state, stage kinds and the outcome cell.

mod cell;
mod status;

pub use cell::{OutcomeCell, Waited};
pub use status::{OutcomeState, StageKind};
