use serde::{Deserialize, Serialize};

use crate::program::SmokeProgram;
use crate::state::{SmokeState, StatePatch, TempChannel};

/// Whole-degree view of the two current-temperature channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemperatureUpdate {
    pub grill: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<i64>,
}

impl TemperatureUpdate {
    /// `None` when the state carries no `grillCurrent` reading.
    pub fn from_state(state: &SmokeState) -> Option<Self> {
        let grill = state.temp(TempChannel::GrillCurrent)?.whole_degrees();
        let probe = state
            .temp(TempChannel::ProbeCurrent)
            .map(|m| m.whole_degrees());
        Some(Self { grill, probe })
    }
}

/// Notification payload sent to realtime clients and push tokens.
///
/// Built fresh for each event and never persisted. Absent fields are left out
/// of the JSON entirely so clients can tell "unchanged" from "cleared".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmokeReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temps: Option<TemperatureUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<SmokeState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_patch: Option<StatePatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<SmokeProgram>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    /// Human-facing alert text. Reports without one go out as silent pushes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
}

impl SmokeReport {
    pub fn came_online(state: SmokeState, firmware_version: Option<String>) -> Self {
        Self {
            state: Some(state),
            firmware_version,
            ..Self::default()
        }
    }

    pub fn went_offline() -> Self {
        Self {
            state_patch: Some(StatePatch::offline()),
            ..Self::default()
        }
    }

    pub fn temperatures(temps: Option<TemperatureUpdate>, program_index: Option<usize>) -> Self {
        Self {
            temps,
            program_index,
            ..Self::default()
        }
    }

    pub fn program_index(index: usize) -> Self {
        Self {
            program_index: Some(index),
            ..Self::default()
        }
    }

    pub fn wake_up(software_version: impl Into<String>) -> Self {
        Self {
            software_version: Some(software_version.into()),
            ..Self::default()
        }
    }

    pub fn is_silent(&self) -> bool {
        self.alert.is_none()
    }
}
