use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Operating mode reported by the firmware.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SmokeMode {
    #[default]
    Idle,
    Start,
    Smoke,
    Hold,
    KeepWarm,
    Shutdown,
}

/// Temperature channels carried in `SmokeState::temps`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TempChannel {
    GrillCurrent,
    GrillTarget,
    ProbeCurrent,
    ProbeTarget,
}

impl TempChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TempChannel::GrillCurrent => "grillCurrent",
            TempChannel::GrillTarget => "grillTarget",
            TempChannel::ProbeCurrent => "probeCurrent",
            TempChannel::ProbeTarget => "probeTarget",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Fahrenheit,
    Celsius,
}

/// A numeric reading plus its unit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: f64,
    #[serde(default)]
    pub unit: TemperatureUnit,
}

impl Measurement {
    pub fn fahrenheit(value: f64) -> Self {
        Self {
            value,
            unit: TemperatureUnit::Fahrenheit,
        }
    }

    /// Whole degrees, truncated toward zero.
    pub fn whole_degrees(&self) -> i64 {
        self.value as i64
    }
}

// ---------------------------------------------------------------------------
// SmokeState
// ---------------------------------------------------------------------------

/// Full device state. The authoritative copy lives under the `state` key.
///
/// `probeCurrent` / `probeTarget` are only meaningful while the probe is
/// plugged in; see [`SmokeState::clear_probe`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmokeState {
    pub mode: SmokeMode,
    pub power: bool,
    pub probe_connected: bool,
    pub online: bool,
    #[serde(default)]
    pub temps: BTreeMap<TempChannel, Measurement>,
}

impl SmokeState {
    pub fn temp(&self, channel: TempChannel) -> Option<Measurement> {
        self.temps.get(&channel).copied()
    }

    pub fn set_temp(&mut self, channel: TempChannel, m: Measurement) {
        self.temps.insert(channel, m);
    }

    pub fn with_temp(mut self, channel: TempChannel, value: f64) -> Self {
        self.set_temp(channel, Measurement::fahrenheit(value));
        self
    }

    pub fn has_probe_reading(&self) -> bool {
        self.temps.contains_key(&TempChannel::ProbeCurrent)
    }

    /// Drop both probe channels (probe physically disconnected).
    pub fn clear_probe(&mut self) {
        self.temps.remove(&TempChannel::ProbeCurrent);
        self.temps.remove(&TempChannel::ProbeTarget);
    }
}

// ---------------------------------------------------------------------------
// StatePatch
// ---------------------------------------------------------------------------

/// Partial update of a [`SmokeState`].
///
/// Every top-level field is tri-state by way of `Option`: absent leaves the
/// target untouched. Temperature channels carry one more level: a channel
/// missing from `temps` is untouched, `null` removes it, a value sets it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<SmokeMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_connected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub temps: BTreeMap<TempChannel, Option<Measurement>>,
}

impl StatePatch {
    pub fn offline() -> Self {
        Self {
            online: Some(false),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mode.is_none()
            && self.power.is_none()
            && self.probe_connected.is_none()
            && self.online.is_none()
            && self.temps.is_empty()
    }

    /// Apply field-by-field onto `state`. Fields absent from the patch keep
    /// their current value.
    pub fn apply_to(&self, state: &mut SmokeState) {
        if let Some(mode) = self.mode {
            state.mode = mode;
        }
        if let Some(power) = self.power {
            state.power = power;
        }
        if let Some(probe_connected) = self.probe_connected {
            state.probe_connected = probe_connected;
        }
        if let Some(online) = self.online {
            state.online = online;
        }
        for (channel, value) in &self.temps {
            match value {
                Some(m) => {
                    state.temps.insert(*channel, *m);
                }
                None => {
                    state.temps.remove(channel);
                }
            }
        }
    }
}

/// Every field of a full report, as a patch. Channels missing from the
/// report stay absent (untouched), they are not turned into removals.
impl From<&SmokeState> for StatePatch {
    fn from(s: &SmokeState) -> Self {
        Self {
            mode: Some(s.mode),
            power: Some(s.power),
            probe_connected: Some(s.probe_connected),
            online: Some(s.online),
            temps: s.temps.iter().map(|(c, m)| (*c, Some(*m))).collect(),
        }
    }
}
