use serde::{Deserialize, Serialize};

use crate::state::{Measurement, SmokeMode};

/// What ends a step: elapsed seconds or a probe temperature threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepTrigger {
    Time,
    Temp,
}

/// One step of a cook program. `limit` is seconds for [`StepTrigger::Time`]
/// and degrees for [`StepTrigger::Temp`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmokeStep {
    pub mode: SmokeMode,
    pub trigger: StepTrigger,
    pub limit: i64,
    pub target_grill: Measurement,
}

impl SmokeStep {
    pub fn new(mode: SmokeMode, trigger: StepTrigger, limit: i64, target_grill: f64) -> Self {
        Self {
            mode,
            trigger,
            limit,
            target_grill: Measurement::fahrenheit(target_grill),
        }
    }
}

/// Ordered cook program. Stored under the `program` key; `index` is the step
/// the firmware is currently executing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmokeProgram {
    pub id: String,
    #[serde(default)]
    pub index: usize,
    pub steps: Vec<SmokeStep>,
}

impl SmokeProgram {
    pub fn current_step(&self) -> Option<&SmokeStep> {
        self.steps.get(self.index)
    }
}
