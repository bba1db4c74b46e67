//! Shared state store holding the relay registry and project assignments.
//!
//! Every operation is a single atomic hash command. Nothing here offers
//! multi-key transactions, and the coordinator does not rely on any.
use async_trait::async_trait;
use parking_lot::RwLock;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::HashMap;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Returns every field of `hash`. A missing hash is empty.
    async fn get_all(&self, hash: &str) -> Result<HashMap<String, String>, StoreError>;

    async fn get_field(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError>;

    async fn set_field(&self, hash: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// Deleting a field that does not exist is not an error.
    async fn delete_field(&self, hash: &str, field: &str) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Redis-backed store. The connection manager reconnects on its own, so a
/// failed command surfaces as an error for that call only.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        let store = RedisStore { conn };
        store.ping().await?;
        tracing::info!("redis connection established");

        Ok(store)
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn get_all(&self, hash: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(hash).await?;
        Ok(fields)
    }

    async fn get_field(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.hget(hash, field).await?;
        Ok(value)
    }

    async fn set_field(&self, hash: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(hash, field, value).await?;
        Ok(())
    }

    async fn delete_field(&self, hash: &str, field: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.hdel::<_, _, ()>(hash, field).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Process-local store for tests and single-instance development setups.
#[derive(Default)]
pub struct MemoryStore {
    hashes: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_all(&self, hash: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.hashes.read().get(hash).cloned().unwrap_or_default())
    }

    async fn get_field(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .hashes
            .read()
            .get(hash)
            .and_then(|fields| fields.get(field))
            .cloned())
    }

    async fn set_field(&self, hash: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.hashes
            .write()
            .entry(hash.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_field(&self, hash: &str, field: &str) -> Result<(), StoreError> {
        let mut hashes = self.hashes.write();
        if let Some(fields) = hashes.get_mut(hash) {
            fields.remove(field);
            if fields.is_empty() {
                hashes.remove(hash);
            }
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
