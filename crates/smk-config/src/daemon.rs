use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::LoadedConfig;

/// Typed view of the merged config. Every field has a default, so an empty
/// config document runs an in-memory development daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    /// Deployment environment. Namespaces push registrations
    /// (`token-<environment>:<token>`).
    pub environment: String,
    pub heartbeat: HeartbeatConfig,
    pub store: StoreConfig,
    pub push: PushConfig,
    pub realtime: RealtimeConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Expected seconds between firmware heartbeats.
    pub interval_secs: u64,
    /// Presence TTL = floor(interval_secs * ttl_factor).
    pub ttl_factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    Redis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub url: Option<String>,
    /// Memory store only: how often expired keys are evicted proactively.
    pub reap_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushKind {
    Log,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub kind: PushKind,
    /// Relay base URL; deliveries POST to `<endpoint>/<deviceToken>`.
    pub endpoint: Option<String>,
    /// Application topic forwarded to the relay.
    pub topic: Option<String>,
    pub token_ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub ping_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Usernames allowed to authenticate.
    pub principals: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            environment: "development".to_string(),
            heartbeat: HeartbeatConfig::default(),
            store: StoreConfig::default(),
            push: PushConfig::default(),
            realtime: RealtimeConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            name: "smokestack".to_string(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            ttl_factor: 1.3,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            url: None,
            reap_interval_ms: 250,
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            kind: PushKind::Log,
            endpoint: None,
            topic: None,
            token_ttl_secs: 604_800,
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 5,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            principals: vec!["app".to_string(), "firmware".to_string()],
        }
    }
}

impl DaemonConfig {
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        let cfg: Self = serde_json::from_value(loaded.config_json.clone())
            .context("config does not match the daemon schema")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.heartbeat.interval_secs == 0 {
            bail!("heartbeat.interval_secs must be > 0");
        }
        if self.heartbeat.ttl_factor.is_nan() || self.heartbeat.ttl_factor < 1.0 {
            bail!(
                "heartbeat.ttl_factor must be >= 1.0 (got {})",
                self.heartbeat.ttl_factor
            );
        }
        if self.realtime.ping_interval_secs == 0 {
            bail!("realtime.ping_interval_secs must be > 0");
        }
        if self.store.kind == StoreKind::Redis && self.store.url.is_none() {
            bail!("store.url is required when store.kind is redis");
        }
        if self.push.kind == PushKind::Http && self.push.endpoint.is_none() {
            bail!("push.endpoint is required when push.kind is http");
        }
        if self.auth.principals.is_empty() {
            bail!("auth.principals must name at least one principal");
        }
        if self.environment.is_empty() || self.environment.contains(':') {
            bail!("environment must be non-empty and must not contain ':'");
        }
        Ok(())
    }

    /// TTL of the presence marker: 13 s for the default 10 s interval.
    pub fn heartbeat_ttl(&self) -> Duration {
        let secs = (self.heartbeat.interval_secs as f64 * self.heartbeat.ttl_factor).floor();
        Duration::from_secs(secs as u64)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.push.token_ttl_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.realtime.ping_interval_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.store.reap_interval_ms.max(1))
    }

    pub fn token_key_prefix(&self) -> String {
        format!("token-{}:", self.environment)
    }

    pub fn is_principal(&self, name: &str) -> bool {
        self.auth.principals.iter().any(|p| p == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttl_is_thirteen_seconds() {
        assert_eq!(DaemonConfig::default().heartbeat_ttl(), Duration::from_secs(13));
    }

    #[test]
    fn ttl_floors_fractional_seconds() {
        let mut cfg = DaemonConfig::default();
        cfg.heartbeat.interval_secs = 7;
        // 7 * 1.3 = 9.1
        assert_eq!(cfg.heartbeat_ttl(), Duration::from_secs(9));
    }

    #[test]
    fn token_prefix_carries_environment() {
        let mut cfg = DaemonConfig::default();
        cfg.environment = "production".to_string();
        assert_eq!(cfg.token_key_prefix(), "token-production:");
    }
}
