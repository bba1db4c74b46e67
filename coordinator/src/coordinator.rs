use crate::config::Config;
use crate::errors::CoordinatorError;
use crate::metrics_defs::{ASSIGNMENT_FAILURES, RELAY_ASSIGNMENTS};
use crate::selection::{decode_record, select_relay};
use crate::store::{StateStore, StoreError};
use crate::types::RelayBinding;
use chrono::Utc;
use shared::counter;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Assigns projects to relays and answers which relay serves a project.
///
/// Holds no copy of the registry: every call reads the store, so any number
/// of coordinators can share one store. Cloning is cheap.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn StateStore>,
    registry_key: String,
    assignment_key: String,
    // Tracks the outcome of the latest store read, from sweeps and lookups alike.
    ready: AtomicBool,
}

impl Coordinator {
    pub fn new(store: Arc<dyn StateStore>, config: &Config) -> Self {
        Coordinator {
            inner: Arc::new(Inner {
                store,
                registry_key: config.relay_registry_key.clone(),
                assignment_key: config.relay_assignment_key.clone(),
                ready: AtomicBool::new(true),
            }),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Relaxed)
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        self.inner.ready.store(ready, Ordering::Relaxed);
    }

    /// Records the outcome of a store read in the readiness flag.
    pub(crate) fn observe<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        self.set_ready(result.is_ok());
        result
    }

    pub(crate) fn store(&self) -> &dyn StateStore {
        self.inner.store.as_ref()
    }

    pub(crate) fn registry_key(&self) -> &str {
        &self.inner.registry_key
    }

    pub(crate) fn assignment_key(&self) -> &str {
        &self.inner.assignment_key
    }

    /// Binds `project` to the least loaded live relay and returns that relay.
    ///
    /// Nothing is written when no relay is live. Two concurrent calls for the
    /// same project may pick different relays; the later write wins.
    pub async fn assign_relay_server(&self, project: &str) -> Result<RelayBinding, CoordinatorError> {
        let registry = self.observe(self.store().get_all(self.registry_key()).await)?;

        let Some(binding) = select_relay(&registry, Utc::now()) else {
            counter!(ASSIGNMENT_FAILURES).increment(1);
            tracing::warn!(project, relays = registry.len(), "no live relay available");
            return Err(CoordinatorError::NoAvailableRelay);
        };

        self.bind_project(project, &binding).await?;
        tracing::info!(
            project,
            relay_id = %binding.relay_id,
            relay_url = %binding.relay_url,
            "assigned project to relay"
        );

        Ok(binding)
    }

    /// Returns the base URL of the relay currently bound to `project`.
    ///
    /// The relay's heartbeat is not checked here. Stale bindings are cleaned up
    /// by the sweeper.
    pub async fn get_project_relay_server(&self, project: &str) -> Result<String, CoordinatorError> {
        let relay_id = self
            .observe(self.store().get_field(self.assignment_key(), project).await)?
            .ok_or_else(|| CoordinatorError::ProjectUnassigned(project.to_string()))?;

        let raw = self
            .observe(self.store().get_field(self.registry_key(), &relay_id).await)?
            .ok_or_else(|| CoordinatorError::RelayRecordMissing(relay_id.clone()))?;

        let record = decode_record(&raw).map_err(|e| CoordinatorError::MalformedRelayRecord {
            relay_id: relay_id.clone(),
            reason: e.to_string(),
        })?;

        if record.relay_url.is_empty() {
            return Err(CoordinatorError::MalformedRelayRecord {
                relay_id,
                reason: "empty relay_url".to_string(),
            });
        }

        Ok(record.relay_url)
    }

    pub(crate) async fn bind_project(
        &self,
        project: &str,
        binding: &RelayBinding,
    ) -> Result<(), CoordinatorError> {
        self.store()
            .set_field(self.assignment_key(), project, &binding.relay_id)
            .await?;
        counter!(RELAY_ASSIGNMENTS).increment(1);
        Ok(())
    }

    pub(crate) async fn unbind_project(&self, project: &str) -> Result<(), CoordinatorError> {
        self.store()
            .delete_field(self.assignment_key(), project)
            .await?;
        Ok(())
    }
}
