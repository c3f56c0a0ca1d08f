//! Store key layout.

pub const STATE: &str = "state";
pub const STATE_PENDING: &str = "state:pending";
pub const PROGRAM: &str = "program";
pub const PROGRAM_PENDING: &str = "program:pending";
/// Presence marker, TTL-backed.
pub const ONLINE: &str = "online";
pub const FIRMWARE_VERSION: &str = "version:firmware";
/// Unix seconds (f64) at which the current program started.
pub const TIMER_PROGRAM_STARTED: &str = "timer:program:started";

/// Value written for pending markers and the presence marker.
pub const FLAG: &str = "1";

/// Keys that describe a live device session. A fresh process starts without
/// them; leftovers come from an unclean exit.
pub const SESSION_KEYS: [&str; 4] = [ONLINE, STATE, PROGRAM, FIRMWARE_VERSION];

pub fn credential(principal: &str) -> String {
    format!("key:{principal}")
}
