//! smk-reconcile
//!
//! Heartbeat reconciliation and program validation.
//!
//! Decisions:
//! - An unacknowledged app command outranks the device for the settable
//!   fields (`power`, `grillTarget`, `probeTarget`)
//! - Without a pending command the device report is applied onto the
//!   authoritative state field by field
//! - A report without `probeCurrent` purges both probe channels
//! - Temperature-triggered steps must stop below their own grill target
//!
//! Deterministic, pure logic. No IO, no store, no clock. The daemon gathers
//! the inputs atomically and persists the result.

mod engine;
mod program;
mod types;

pub use engine::{reconcile, validate_report};
pub use program::validate_program;
pub use types::*;
