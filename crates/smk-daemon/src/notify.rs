//! Notification fan-out.
//!
//! Realtime connections win: while at least one is active, reports go only to
//! them. Push is the fallback for when no client is attached, so a report is
//! never delivered twice to the same app.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use smk_config::DaemonConfig;
use smk_schemas::SmokeReport;
use smk_store::KeyValueStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::connections::ConnectionRegistry;
use crate::push::{redact_token, PushError, PushTransport, PushType};

/// Keys asked for per scan page.
const SCAN_PAGE_SIZE: usize = 100;
/// Hard stop for a token scan that never reports completion.
const MAX_SCAN_PAGES: usize = 1_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Sent over realtime connections; push was not attempted.
    Broadcast { connections: usize },
    /// No connection and no registered token.
    NoTokens,
    Pushed {
        delivered: usize,
        /// Unregistered tokens whose registration was deleted.
        pruned: usize,
        failed: usize,
    },
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn KeyValueStore>,
    connections: ConnectionRegistry,
    push: Arc<dyn PushTransport>,
    token_prefix: String,
    token_ttl: Duration,
    errors: mpsc::UnboundedSender<anyhow::Error>,
}

impl NotificationDispatcher {
    /// Spawns the task that logs failed background dispatches, so this must
    /// run inside a tokio runtime.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        connections: ConnectionRegistry,
        push: Arc<dyn PushTransport>,
        config: &DaemonConfig,
    ) -> Self {
        let (errors, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain_errors(rx));
        Self {
            store,
            connections,
            push,
            token_prefix: config.token_key_prefix(),
            token_ttl: config.token_ttl(),
            errors,
        }
    }

    fn token_key(&self, token: &str) -> String {
        format!("{}{}", self.token_prefix, token)
    }

    // -----------------------------------------------------------------------
    // Registrations
    // -----------------------------------------------------------------------

    /// Register (or refresh) a push token. Re-registering only resets the TTL.
    pub async fn register(&self, token: &str) -> anyhow::Result<()> {
        self.store
            .set_ex(&self.token_key(token), token, self.token_ttl)
            .await?;
        info!(token = %redact_token(token), "push token registered");
        Ok(())
    }

    /// `false` if the token was not registered.
    pub async fn unregister(&self, token: &str) -> anyhow::Result<bool> {
        let removed = self.store.delete(&[&self.token_key(token)]).await? > 0;
        info!(token = %redact_token(token), removed, "push token unregistered");
        Ok(removed)
    }

    /// All live registrations. Follows the scan cursor until the store
    /// reports completion; pages may repeat keys.
    pub async fn registered_tokens(&self) -> anyhow::Result<Vec<String>> {
        let pattern = format!("{}*", self.token_prefix);
        let mut tokens = BTreeSet::new();
        let mut cursor = 0;

        for _ in 0..MAX_SCAN_PAGES {
            let page = self.store.scan(cursor, &pattern, SCAN_PAGE_SIZE).await?;
            tokens.extend(
                page.keys
                    .iter()
                    .filter_map(|k| k.strip_prefix(&self.token_prefix))
                    .map(str::to_string),
            );
            if page.cursor == 0 {
                return Ok(tokens.into_iter().collect());
            }
            cursor = page.cursor;
        }

        warn!(
            pages = MAX_SCAN_PAGES,
            found = tokens.len(),
            "token scan did not complete; using partial result"
        );
        Ok(tokens.into_iter().collect())
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Fire-and-forget [`dispatch`](Self::dispatch). Failures are logged by
    /// the error task; the caller never waits on delivery.
    pub fn notify(&self, report: SmokeReport) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            match this.dispatch(&report).await {
                Ok(outcome) => debug!(?outcome, "notification dispatched"),
                Err(e) => {
                    let _ = this.errors.send(e);
                }
            }
        })
    }

    /// Fire-and-forget broadcast to realtime connections only. Never pushes.
    pub fn notify_realtime(&self, report: SmokeReport) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.connections.broadcast(&report).await {
                let _ = this.errors.send(e);
            }
        })
    }

    pub async fn dispatch(&self, report: &SmokeReport) -> anyhow::Result<DispatchOutcome> {
        if self.connections.active_count().await > 0 {
            let connections = self.connections.broadcast(report).await?;
            return Ok(DispatchOutcome::Broadcast { connections });
        }

        let tokens = self.registered_tokens().await?;
        if tokens.is_empty() {
            warn!("no realtime clients and no push tokens registered; notification dropped");
            return Ok(DispatchOutcome::NoTokens);
        }

        let push_type = PushType::for_report(report);
        let (mut delivered, mut pruned, mut failed) = (0, 0, 0);
        for token in &tokens {
            match self.push.deliver(token, push_type, report).await {
                Ok(()) => delivered += 1,
                Err(PushError::Unregistered) => {
                    warn!(token = %redact_token(token), "push token unregistered; removing");
                    match self.store.delete(&[&self.token_key(token)]).await {
                        Ok(_) => pruned += 1,
                        Err(e) => {
                            error!(token = %redact_token(token), error = %e, "token removal failed");
                            failed += 1;
                        }
                    }
                }
                Err(e) => {
                    error!(token = %redact_token(token), error = %e, "push delivery failed");
                    failed += 1;
                }
            }
        }

        Ok(DispatchOutcome::Pushed {
            delivered,
            pruned,
            failed,
        })
    }
}

async fn drain_errors(mut rx: mpsc::UnboundedReceiver<anyhow::Error>) {
    while let Some(e) = rx.recv().await {
        error!(error = %format!("{e:#}"), "notification dispatch failed");
    }
}
