//! Relay registry and project assignment.
//!
//! Relays publish heartbeat records into a shared store. The coordinator binds
//! projects to the least loaded live relay, answers lookups for the router,
//! and runs a sweeper that evicts dead relays and moves their projects.
use std::sync::Arc;

pub mod config;
pub mod coordinator;
pub mod errors;
mod metrics_defs;
pub mod selection;
pub mod store;
mod sweeper;
pub mod types;

#[cfg(test)]
mod testutils;

pub use coordinator::Coordinator;
pub use metrics_defs::ALL_METRICS;
pub use sweeper::{SWEEP_INTERVAL, SweepSummary};

use config::StoreConfig;
use store::{MemoryStore, RedisStore, StateStore, StoreError};

pub async fn get_store(config: &StoreConfig) -> Result<Arc<dyn StateStore>, StoreError> {
    match config {
        StoreConfig::Redis { url } => Ok(Arc::new(RedisStore::connect(url).await?)),
        StoreConfig::Memory => {
            tracing::warn!("using in-memory store, state is not shared between instances");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
