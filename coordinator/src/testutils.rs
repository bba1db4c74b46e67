use crate::store::{MemoryStore, StateStore, StoreError};
use crate::types::RelayRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

pub const REGISTRY_KEY: &str = "relay_servers";
pub const ASSIGNMENT_KEY: &str = "relay_assignments";

pub fn record_json(relay_url: &str, load: i64, last_heartbeat: DateTime<Utc>) -> String {
    serde_json::to_string(&RelayRecord::new(relay_url, load, last_heartbeat)).unwrap()
}

pub async fn seed_relay(
    store: &dyn StateStore,
    relay_id: &str,
    relay_url: &str,
    load: i64,
    last_heartbeat: DateTime<Utc>,
) {
    store
        .set_field(
            REGISTRY_KEY,
            relay_id,
            &record_json(relay_url, load, last_heartbeat),
        )
        .await
        .unwrap();
}

/// Memory store that records which hashes were read.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    pub reads: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn reads_of(&self, hash: &str) -> usize {
        self.reads.lock().iter().filter(|h| *h == hash).count()
    }
}

#[async_trait]
impl StateStore for RecordingStore {
    async fn get_all(&self, hash: &str) -> Result<HashMap<String, String>, StoreError> {
        self.reads.lock().push(hash.to_string());
        self.inner.get_all(hash).await
    }

    async fn get_field(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.reads.lock().push(hash.to_string());
        self.inner.get_field(hash, field).await
    }

    async fn set_field(&self, hash: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set_field(hash, field, value).await
    }

    async fn delete_field(&self, hash: &str, field: &str) -> Result<(), StoreError> {
        self.inner.delete_field(hash, field).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

/// Memory store whose reads or assignment writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_assignment_writes: AtomicBool,
    pub fail_reads: AtomicBool,
}

fn unavailable() -> StoreError {
    StoreError::Redis(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "store unavailable",
    )))
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn get_all(&self, hash: &str) -> Result<HashMap<String, String>, StoreError> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(unavailable());
        }
        self.inner.get_all(hash).await
    }

    async fn get_field(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(unavailable());
        }
        self.inner.get_field(hash, field).await
    }

    async fn set_field(&self, hash: &str, field: &str, value: &str) -> Result<(), StoreError> {
        if hash == ASSIGNMENT_KEY && self.fail_assignment_writes.load(Ordering::Relaxed) {
            return Err(unavailable());
        }
        self.inner.set_field(hash, field, value).await
    }

    async fn delete_field(&self, hash: &str, field: &str) -> Result<(), StoreError> {
        if hash == ASSIGNMENT_KEY && self.fail_assignment_writes.load(Ordering::Relaxed) {
            return Err(unavailable());
        }
        self.inner.delete_field(hash, field).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}
