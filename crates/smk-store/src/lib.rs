//! smk-store
//!
//! Key-value store abstraction the coordinator runs on. Every piece of
//! cross-request coordination goes through one of these atomic operations;
//! there is no in-process lock over device state.
//!
//! Two backends:
//! - [`MemoryStore`]: in-process, TTL-aware, emits key-expiry events. Used by
//!   tests and single-node deployments.
//! - `RedisStore` (feature `redis`): same contract over Redis, with expiry
//!   events from `__keyevent@*__:expired`.

mod json;
mod memory;
#[cfg(feature = "redis")]
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

pub use json::{get_json, set_json};
pub use memory::{glob_match, MemoryStore};
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

/// One page of a cursor scan. `cursor == 0` means the scan is complete.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub cursor: u64,
    pub keys: Vec<String>,
}

/// Atomic key-value operations required by the coordinator.
///
/// Values are opaque strings; JSON encoding is layered on top by
/// [`get_json`] / [`set_json`].
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Set without expiry. Clears any TTL the key had.
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Set with a TTL.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()>;

    /// Delete keys, returning how many existed.
    async fn delete(&self, keys: &[&str]) -> anyhow::Result<u64>;

    async fn exists(&self, key: &str) -> anyhow::Result<bool>;

    /// Atomically read and remove.
    async fn get_del(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Atomically replace, returning the previous value. Clears any TTL.
    async fn get_set(&self, key: &str, value: &str) -> anyhow::Result<Option<String>>;

    /// Set a TTL on an existing key. `false` if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> anyhow::Result<bool>;

    /// Remaining TTL; `None` for a missing key or a key without expiry.
    async fn ttl(&self, key: &str) -> anyhow::Result<Option<Duration>>;

    /// One page of keys matching a `*` glob. Pages may repeat keys; a key
    /// present for the whole scan is returned at least once.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> anyhow::Result<ScanPage>;

    /// Subscribe to key-expiry events (payload = expired key name).
    fn expired_events(&self) -> broadcast::Receiver<String>;
}
