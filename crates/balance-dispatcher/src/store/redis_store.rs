//! Redis-backed queue depth store
//!
//! Each machine writes its depth as a decimal string under
//! `<key_prefix><machine_id>`.

use async_trait::async_trait;
use balance_core::{Error, QueueDepthSample};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use super::QueueDepthStore;

pub struct RedisQueueStore {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisQueueStore {
    /// Connect to `url` (e.g. "redis://127.0.0.1:6379")
    ///
    /// The connection manager reconnects on its own after failures.
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> balance_core::Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::Store(format!("Invalid redis url {}: {}", url, e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Store(format!("Failed to connect to {}: {}", url, e)))?;

        info!("Queue depth store connected: {}", url);

        Ok(Self {
            connection,
            key_prefix: key_prefix.into(),
        })
    }

    fn key(&self, machine_id: &str) -> String {
        format!("{}{}", self.key_prefix, machine_id)
    }
}

#[async_trait]
impl QueueDepthStore for RedisQueueStore {
    async fn get(&self, machine_id: &str) -> balance_core::Result<Option<u64>> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection
            .get(self.key(machine_id))
            .await
            .map_err(|e| Error::Store(format!("GET {} failed: {}", self.key(machine_id), e)))?;

        Ok(QueueDepthSample::from_raw(machine_id, raw.as_deref()).depth)
    }
}
