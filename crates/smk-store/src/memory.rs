use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::{KeyValueStore, ScanPage};

const EXPIRY_CHANNEL_CAPACITY: usize = 256;
/// Unfinished scans remembered at once; the oldest cursor is dropped first.
const MAX_OPEN_SCANS: usize = 1024;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn persistent(value: &str) -> Self {
        Self {
            value: value.to_string(),
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

struct Inner {
    map: Mutex<BTreeMap<String, Entry>>,
    expired_tx: broadcast::Sender<String>,
    /// Open scan cursor -> last key examined by the previous page.
    scans: Mutex<BTreeMap<u64, String>>,
    next_scan: AtomicU64,
}

/// In-process [`KeyValueStore`].
///
/// TTLs run on the tokio clock, so a paused test runtime controls expiry.
/// Expired keys are evicted lazily by every operation and periodically by
/// [`MemoryStore::spawn_reaper`]; either way each eviction is announced
/// exactly once on the expiry channel.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (expired_tx, _rx) = broadcast::channel(EXPIRY_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                map: Mutex::new(BTreeMap::new()),
                expired_tx,
                scans: Mutex::new(BTreeMap::new()),
                next_scan: AtomicU64::new(1),
            }),
        }
    }

    /// Run `f` against the map with expired entries already evicted.
    /// Evictions are announced after the lock is released.
    fn with_live<R>(&self, f: impl FnOnce(&mut BTreeMap<String, Entry>, Instant) -> R) -> R {
        let now = Instant::now();
        let (out, expired) = {
            let mut map = self.inner.map.lock();
            let expired = evict_expired(&mut map, now);
            (f(&mut map, now), expired)
        };
        self.announce(expired);
        out
    }

    fn announce(&self, keys: Vec<String>) {
        for key in keys {
            debug!(key = %key, "key expired");
            // No subscribers is fine.
            let _ = self.inner.expired_tx.send(key);
        }
    }

    /// Evict everything past its TTL now. Returns how many keys expired.
    pub fn purge_expired(&self) -> usize {
        let expired = {
            let mut map = self.inner.map.lock();
            evict_expired(&mut map, Instant::now())
        };
        let n = expired.len();
        self.announce(expired);
        n
    }

    /// Background eviction every `every`. Stops once the store is dropped.
    pub fn spawn_reaper(&self, every: Duration) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                MemoryStore { inner }.purge_expired();
            }
        })
    }

    fn open_scan(&self, last: String) -> u64 {
        let id = self.inner.next_scan.fetch_add(1, Ordering::Relaxed);
        let mut scans = self.inner.scans.lock();
        if scans.len() >= MAX_OPEN_SCANS {
            scans.pop_first();
        }
        scans.insert(id, last);
        id
    }

    pub fn len(&self) -> usize {
        self.with_live(|map, _| map.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn evict_expired(map: &mut BTreeMap<String, Entry>, now: Instant) -> Vec<String> {
    let expired: Vec<String> = map
        .iter()
        .filter(|(_, e)| e.is_expired(now))
        .map(|(k, _)| k.clone())
        .collect();
    for k in &expired {
        map.remove(k);
    }
    expired
}

/// `*`-only glob, the subset of Redis MATCH patterns the coordinator uses.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };
    for mid in &parts[1..parts.len() - 1] {
        match rest.find(mid) {
            Some(i) => rest = &rest[i + mid.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.with_live(|map, _| map.get(key).map(|e| e.value.clone())))
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.with_live(|map, _| {
            map.insert(key.to_string(), Entry::persistent(value));
        });
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        self.with_live(|map, now| {
            map.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: Some(now + ttl),
                },
            );
        });
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> anyhow::Result<u64> {
        Ok(self.with_live(|map, _| {
            keys.iter().filter(|k| map.remove(**k).is_some()).count() as u64
        }))
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.with_live(|map, _| map.contains_key(key)))
    }

    async fn get_del(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.with_live(|map, _| map.remove(key).map(|e| e.value)))
    }

    async fn get_set(&self, key: &str, value: &str) -> anyhow::Result<Option<String>> {
        Ok(self.with_live(|map, _| {
            map.insert(key.to_string(), Entry::persistent(value))
                .map(|e| e.value)
        }))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> anyhow::Result<bool> {
        Ok(self.with_live(|map, now| match map.get_mut(key) {
            Some(e) => {
                e.expires_at = Some(now + ttl);
                true
            }
            None => false,
        }))
    }

    async fn ttl(&self, key: &str) -> anyhow::Result<Option<Duration>> {
        Ok(self.with_live(|map, now| {
            map.get(key)
                .and_then(|e| e.expires_at)
                .map(|at| at.saturating_duration_since(now))
        }))
    }

    /// Cursors resume after the last key examined, so keys removed between
    /// pages never shift the ones still waiting to be returned.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> anyhow::Result<ScanPage> {
        let count = count.max(1);
        let after = if cursor == 0 {
            None
        } else {
            match self.inner.scans.lock().remove(&cursor) {
                Some(last) => Some(last),
                None => anyhow::bail!("unknown scan cursor {cursor}"),
            }
        };

        let (keys, last, more) = self.with_live(|map, _| {
            let lower = match &after {
                Some(last) => Bound::Excluded(last.as_str()),
                None => Bound::Unbounded,
            };
            let mut range = map.range::<str, _>((lower, Bound::Unbounded));
            let mut keys = Vec::new();
            let mut last = None;
            for (key, _) in range.by_ref().take(count) {
                if glob_match(pattern, key) {
                    keys.push(key.clone());
                }
                last = Some(key.clone());
            }
            (keys, last, range.next().is_some())
        });

        let cursor = match last {
            Some(last) if more => self.open_scan(last),
            _ => 0,
        };
        Ok(ScanPage { cursor, keys })
    }

    fn expired_events(&self) -> broadcast::Receiver<String> {
        self.inner.expired_tx.subscribe()
    }
}
