//! Request and response bodies for the HTTP surface.
//!
//! Bodies are camelCase on the wire. Field-level validation that serde cannot
//! express lives next to each type; handlers call it right after decoding.

use serde::{Deserialize, Serialize};
use smk_schemas::{SmokeProgram, SmokeState};

use crate::error::ApiError;

/// Accepted grill setpoints, °F.
pub const GRILL_SETPOINTS: [i64; 9] = [0, 150, 180, 225, 250, 275, 300, 350, 400];
/// Accepted probe setpoints, °F.
pub const PROBE_SETPOINTS: [i64; 6] = [135, 145, 160, 165, 200, 205];

pub const DEVICE_TOKEN_LEN: usize = 64;
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// /api/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// /api/client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTokenRequest {
    pub device_token: String,
}

impl DeviceTokenRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        let t = &self.device_token;
        if t.len() != DEVICE_TOKEN_LEN || !t.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ApiError::validation(format!(
                "deviceToken must be {DEVICE_TOKEN_LEN} alphanumeric characters"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientResponse {
    pub software_version: String,
    /// Only known while a device session exists.
    pub firmware_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordRequest {
    pub new_password: String,
}

impl PasswordRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::validation(format!(
                "newPassword must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// /api/smoker
// ---------------------------------------------------------------------------

/// What the firmware learns from a heartbeat: outstanding commands only.
/// Both keys are always present, `null` when nothing is pending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub state: Option<SmokeState>,
    pub program: Option<SmokeProgram>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetRequest {
    #[serde(default)]
    pub grill: Option<i64>,
    #[serde(default)]
    pub probe: Option<i64>,
}

impl TargetRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if let Some(g) = self.grill {
            if !GRILL_SETPOINTS.contains(&g) {
                return Err(ApiError::validation(format!(
                    "grill must be one of {GRILL_SETPOINTS:?}"
                )));
            }
        }
        if let Some(p) = self.probe {
            if !PROBE_SETPOINTS.contains(&p) {
                return Err(ApiError::validation(format!(
                    "probe must be one of {PROBE_SETPOINTS:?}"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// /api/program
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramIdResponse {
    pub id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProgramIndexBody {
    pub index: usize,
}

// ---------------------------------------------------------------------------
// /api/timer/program/started
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerBody {
    /// Unix seconds.
    pub last_program_started: f64,
}

impl TimerBody {
    pub fn validate(&self, now_unix: f64) -> Result<(), ApiError> {
        if !self.last_program_started.is_finite() || self.last_program_started > now_unix {
            return Err(ApiError::validation(
                "lastProgramStarted must not be in the future",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_token_must_be_64_alphanumerics() {
        let ok = DeviceTokenRequest {
            device_token: "a".repeat(64),
        };
        assert!(ok.validate().is_ok());

        let short = DeviceTokenRequest {
            device_token: "a".repeat(63),
        };
        assert!(short.validate().is_err());

        let punct = DeviceTokenRequest {
            device_token: format!("{}-", "a".repeat(63)),
        };
        assert!(punct.validate().is_err());
    }

    #[test]
    fn target_setpoints_are_fixed() {
        assert!(TargetRequest { grill: Some(225), probe: Some(165) }.validate().is_ok());
        assert!(TargetRequest { grill: Some(226), probe: None }.validate().is_err());
        assert!(TargetRequest { grill: None, probe: Some(150) }.validate().is_err());
        assert!(TargetRequest::default().validate().is_ok());
    }

    #[test]
    fn timer_rejects_future() {
        let now = 1_700_000_000.0;
        assert!(TimerBody { last_program_started: now }.validate(now).is_ok());
        assert!(TimerBody { last_program_started: now + 1.0 }.validate(now).is_err());
    }

    #[test]
    fn heartbeat_response_keeps_null_keys() {
        let v = serde_json::to_value(HeartbeatResponse::default()).unwrap();
        assert_eq!(v, serde_json::json!({ "state": null, "program": null }));
    }
}
