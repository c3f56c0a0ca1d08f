//! smk-schemas
//!
//! Wire and storage shapes shared by the smoker firmware, the companion app
//! and the coordinator. Everything here is plain serde data; no IO and no
//! store access.
//!
//! JSON field names are camelCase because both clients already speak that
//! dialect.

mod program;
mod report;
mod state;

pub use program::{SmokeProgram, SmokeStep, StepTrigger};
pub use report::{SmokeReport, TemperatureUpdate};
pub use state::{Measurement, SmokeMode, SmokeState, StatePatch, TempChannel, TemperatureUnit};
