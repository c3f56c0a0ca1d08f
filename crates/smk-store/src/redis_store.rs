use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{KeyValueStore, ScanPage};

const EXPIRED_PATTERN: &str = "__keyevent@*__:expired";
const EXPIRY_CHANNEL_CAPACITY: usize = 256;

/// [`KeyValueStore`] over a Redis multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    expired_tx: broadcast::Sender<String>,
}

impl RedisStore {
    /// Connect, enable expired-key notifications and start forwarding them.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url).with_context(|| format!("invalid redis url '{url}'"))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .context("redis connect failed")?;

        // Managed Redis may refuse CONFIG; notifications then have to be
        // enabled on the server side.
        if let Err(e) = redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg("Ex")
            .query_async::<_, ()>(&mut conn)
            .await
        {
            warn!(error = %e, "could not enable keyspace notifications");
        }

        let mut pubsub = client
            .get_async_pubsub()
            .await
            .context("redis pubsub connect failed")?;
        pubsub
            .psubscribe(EXPIRED_PATTERN)
            .await
            .context("psubscribe to expiry events failed")?;

        let (expired_tx, _rx) = broadcast::channel(EXPIRY_CHANNEL_CAPACITY);
        let tx = expired_tx.clone();
        tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                match msg.get_payload::<String>() {
                    Ok(key) => {
                        let _ = tx.send(key);
                    }
                    Err(e) => warn!(error = %e, "undecodable expiry event"),
                }
            }
            warn!("redis expiry subscription ended");
        });

        info!(url = %url, "redis store connected");
        Ok(Self { conn, expired_tx })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut self.conn())
            .await?)
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async::<_, ()>(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> anyhow::Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        Ok(redis::cmd("DEL")
            .arg(keys)
            .query_async::<_, u64>(&mut self.conn())
            .await?)
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(redis::cmd("EXISTS")
            .arg(key)
            .query_async::<_, bool>(&mut self.conn())
            .await?)
    }

    async fn get_del(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(redis::cmd("GETDEL")
            .arg(key)
            .query_async::<_, Option<String>>(&mut self.conn())
            .await?)
    }

    async fn get_set(&self, key: &str, value: &str) -> anyhow::Result<Option<String>> {
        Ok(redis::cmd("GETSET")
            .arg(key)
            .arg(value)
            .query_async::<_, Option<String>>(&mut self.conn())
            .await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> anyhow::Result<bool> {
        Ok(redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .query_async::<_, bool>(&mut self.conn())
            .await?)
    }

    async fn ttl(&self, key: &str) -> anyhow::Result<Option<Duration>> {
        let secs = redis::cmd("TTL")
            .arg(key)
            .query_async::<_, i64>(&mut self.conn())
            .await?;
        // -2 missing, -1 no expiry.
        Ok((secs >= 0).then(|| Duration::from_secs(secs as u64)))
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> anyhow::Result<ScanPage> {
        let (cursor, keys) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count.max(1))
            .query_async::<_, (u64, Vec<String>)>(&mut self.conn())
            .await?;
        Ok(ScanPage { cursor, keys })
    }

    fn expired_events(&self) -> broadcast::Receiver<String> {
        self.expired_tx.subscribe()
    }
}
