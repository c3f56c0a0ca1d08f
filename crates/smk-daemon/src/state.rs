//! Shared context for smk-daemon.
//!
//! One `AppContext` is built in `main` and handed to every handler as
//! `State<Arc<AppContext>>`. Nothing in the crate reaches for a global.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smk_config::DaemonConfig;
use smk_store::{KeyValueStore, MemoryStore};

use crate::connections::ConnectionRegistry;
use crate::notify::NotificationDispatcher;
use crate::presence::PresenceTracker;
use crate::push::{LogPush, PushTransport};

/// Static build metadata included in health responses and greetings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            service: "smk-daemon",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

pub struct AppContext {
    pub build: BuildInfo,
    pub config: DaemonConfig,
    pub store: Arc<dyn KeyValueStore>,
    pub presence: PresenceTracker,
    pub connections: ConnectionRegistry,
    pub notifier: NotificationDispatcher,
}

impl AppContext {
    /// Must be called inside a tokio runtime (the notifier spawns its error
    /// logger).
    pub fn new(
        config: DaemonConfig,
        store: Arc<dyn KeyValueStore>,
        push: Arc<dyn PushTransport>,
    ) -> Arc<Self> {
        let connections = ConnectionRegistry::new();
        let presence = PresenceTracker::new(Arc::clone(&store), config.heartbeat_ttl());
        let notifier =
            NotificationDispatcher::new(Arc::clone(&store), connections.clone(), push, &config);
        Arc::new(Self {
            build: BuildInfo::current(),
            config,
            store,
            presence,
            connections,
            notifier,
        })
    }

    /// Default config over a fresh [`MemoryStore`] with the logging push
    /// transport.
    pub fn in_memory() -> Arc<Self> {
        Self::new(
            DaemonConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(LogPush),
        )
    }
}
