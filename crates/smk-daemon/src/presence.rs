//! Device presence.
//!
//! The `online` key exists while the device is considered connected. Every
//! heartbeat re-arms its TTL; the store's expiry event for it is the only
//! offline signal.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use smk_schemas::SmokeReport;
use smk_store::KeyValueStore;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{error, info, warn};

use crate::{keys, state::AppContext};

#[derive(Clone)]
pub struct PresenceTracker {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Flip the marker on and re-arm its TTL. Returns `true` when the marker
    /// was absent, i.e. this heartbeat brings the device online.
    pub async fn mark_heartbeat(&self) -> anyhow::Result<bool> {
        let previous = self.store.get_set(keys::ONLINE, keys::FLAG).await?;
        self.store.expire(keys::ONLINE, self.ttl).await?;
        Ok(previous.is_none())
    }

    pub async fn is_online(&self) -> anyhow::Result<bool> {
        self.store.exists(keys::ONLINE).await
    }
}

/// Subscribe to key expiry and run the offline path whenever `online` lapses.
/// Call once at startup.
pub fn spawn_expiry_watch(ctx: Arc<AppContext>) -> JoinHandle<()> {
    let mut events = BroadcastStream::new(ctx.store.expired_events());
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(key) if key == keys::ONLINE => {
                    if let Err(e) = on_offline(&ctx).await {
                        error!(error = %format!("{e:#}"), "offline cleanup failed");
                    }
                }
                Ok(_) => {}
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    warn!(missed = n, "expiry watch lagged");
                }
            }
        }
        info!("expiry event stream closed");
    })
}

/// Device missed its heartbeat window: tell clients, then forget the session.
/// The device re-registers through boot.
///
/// A heartbeat that lands after the lapse but before this runs evicts and
/// re-arms the marker in one step. That device is online again and keeps
/// its session.
pub async fn on_offline(ctx: &AppContext) -> anyhow::Result<()> {
    if ctx.presence.is_online().await? {
        info!("presence re-armed before offline cleanup; session kept");
        return Ok(());
    }
    info!("device offline: heartbeat window missed");
    ctx.notifier.notify(SmokeReport::went_offline());
    ctx.store
        .delete(&[keys::STATE, keys::FIRMWARE_VERSION])
        .await?;
    Ok(())
}
