//! Registry of live realtime connections.
//!
//! A connection is *active* while it is registered, not marked closed, and
//! its outbound channel still has a receiver. Closed entries stay until
//! [`ConnectionRegistry::prune`] removes them but never count as active.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use smk_schemas::{SmokeProgram, SmokeReport, SmokeState, TemperatureUpdate};
use smk_store::get_json;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::{keys, state::AppContext};

/// Returned by [`ConnectionRegistry::open`]. The socket task drains `rx`.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: Uuid,
    pub rx: mpsc::UnboundedReceiver<String>,
}

#[derive(Debug)]
struct Connection {
    tx: mpsc::UnboundedSender<String>,
    closed: bool,
}

impl Connection {
    fn is_active(&self) -> bool {
        !self.closed && !self.tx.is_closed()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(&self) -> ConnectionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.inner
            .write()
            .await
            .insert(id, Connection { tx, closed: false });
        ConnectionHandle { id, rx }
    }

    /// Mark closed. The entry stays until the next prune.
    pub async fn close(&self, id: Uuid) {
        if let Some(c) = self.inner.write().await.get_mut(&id) {
            c.closed = true;
        }
    }

    /// Drop every entry that is no longer active. Returns how many went.
    pub async fn prune(&self) -> usize {
        let mut map = self.inner.write().await;
        let before = map.len();
        map.retain(|_, c| c.is_active());
        before - map.len()
    }

    pub async fn active_count(&self) -> usize {
        self.inner
            .read()
            .await
            .values()
            .filter(|c| c.is_active())
            .count()
    }

    /// Registered entries, closed ones included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Serialize once and queue on every active connection. A report that
    /// does not serialize aborts the whole broadcast. Returns the number of
    /// connections the report was queued on.
    pub async fn broadcast(&self, report: &SmokeReport) -> anyhow::Result<usize> {
        let payload =
            serde_json::to_string(report).context("serialize report for broadcast")?;

        let map = self.inner.read().await;
        let mut sent = 0;
        for (id, c) in map.iter().filter(|(_, c)| c.is_active()) {
            if c.tx.send(payload.clone()).is_ok() {
                sent += 1;
            } else {
                debug!(connection = %id, "receiver gone during broadcast");
            }
        }
        Ok(sent)
    }
}

/// Point-in-time snapshot sent to a freshly opened connection.
///
/// `temps` and `firmwareVersion` are only filled while the device is online;
/// state and program are sent whenever they are stored.
pub async fn greeting(ctx: &AppContext) -> anyhow::Result<SmokeReport> {
    let store = ctx.store.as_ref();
    let online = ctx.presence.is_online().await?;
    let state: Option<SmokeState> = get_json(store, keys::STATE).await?;
    let program: Option<SmokeProgram> = get_json(store, keys::PROGRAM).await?;

    let (temps, firmware_version) = if online {
        (
            state.as_ref().and_then(TemperatureUpdate::from_state),
            store.get(keys::FIRMWARE_VERSION).await?,
        )
    } else {
        (None, None)
    };

    Ok(SmokeReport {
        temps,
        state,
        program,
        software_version: Some(ctx.build.version.to_string()),
        firmware_version,
        ..SmokeReport::default()
    })
}
