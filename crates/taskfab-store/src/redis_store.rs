//! Redis-backed `Store`: `SET`/`GET` for records, `PUBLISH`/pub-sub for the
//! task-notification channel. Mirrors the network-addressable backend the
//! distilled system was originally built against.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use taskfab_shared::{Store, TaskFabError, TaskFabResult};

/// A Redis-backed store adapter. Connects once via a multiplexed connection
/// manager that auto-reconnects under the hood, and subscribes to channels
/// over dedicated pub/sub connections bridged into `broadcast` so that
/// multiple in-process subscribers can share one Redis channel subscription.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> TaskFabResult<Self> {
        let client = redis::Client::open(url).map_err(|e| TaskFabError::store(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| TaskFabError::store(e.to_string()))?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> TaskFabResult<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| TaskFabError::store(e.to_string()))
    }

    async fn get(&self, key: &str) -> TaskFabResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| TaskFabError::store(e.to_string()))
    }

    async fn publish(&self, channel: &str, message: Vec<u8>) -> TaskFabResult<()> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, message)
            .await
            .map_err(|e| TaskFabError::store(e.to_string()))
    }

    async fn subscribe(&self, channel: &str) -> TaskFabResult<broadcast::Receiver<Vec<u8>>> {
        let (tx, rx) = broadcast::channel(1024);
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| TaskFabError::store(e.to_string()))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| TaskFabError::store(e.to_string()))?;

        let channel_name = channel.to_string();
        tokio::spawn(async move {
            use futures::StreamExt;
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: Vec<u8> = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(channel = %channel_name, error = %e, "failed to decode redis message payload");
                        continue;
                    }
                };
                if tx.send(payload).is_err() {
                    debug!(channel = %channel_name, "no active subscribers, dropping message");
                }
            }
        });

        Ok(rx)
    }
}
