//! Process startup against the store.

use std::sync::Arc;

use smk_schemas::SmokeReport;
use tokio::task::JoinHandle;
use tracing::info;

use crate::{auth, keys, presence, state::AppContext};

/// Handles for the background work started by [`start`].
pub struct Started {
    pub expiry_watch: JoinHandle<()>,
    pub wake_up: JoinHandle<()>,
}

/// Clear the previous session, seed credentials, start watching for presence
/// expiry and wake every registered client.
///
/// Anything a previous process knew about the device is stale: the device
/// has to boot (or heartbeat) again before state is served.
pub async fn start(ctx: Arc<AppContext>) -> anyhow::Result<Started> {
    let cleared = ctx.store.delete(&keys::SESSION_KEYS).await?;
    let seeded = auth::seed_credentials_from_env(&ctx).await?;
    info!(cleared, seeded, "session reset");

    let expiry_watch = presence::spawn_expiry_watch(Arc::clone(&ctx));
    let wake_up = ctx
        .notifier
        .notify(SmokeReport::wake_up(ctx.build.version));

    Ok(Started {
        expiry_watch,
        wake_up,
    })
}
