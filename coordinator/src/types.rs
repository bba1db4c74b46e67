use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub type RelayId = String;

/// A relay whose last heartbeat is older than this is considered dead.
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

/// Health and load record a relay publishes into the registry hash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelayRecord {
    pub last_heartbeat: DateTime<Utc>,
    pub load: i64,
    pub relay_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_ws_url: Option<String>,
}

impl RelayRecord {
    pub fn new<U>(relay_url: U, load: i64, last_heartbeat: DateTime<Utc>) -> Self
    where
        U: Into<String>,
    {
        RelayRecord {
            last_heartbeat,
            load,
            relay_url: relay_url.into(),
            relay_ws_url: None,
        }
    }

    pub fn with_ws_url<U: Into<String>>(mut self, relay_ws_url: U) -> Self {
        self.relay_ws_url = Some(relay_ws_url.into());
        self
    }

    /// Heartbeats from the future (clock skew between hosts) count as fresh.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(self.last_heartbeat).to_std() {
            Ok(age) => age <= HEARTBEAT_TIMEOUT,
            Err(_) => true,
        }
    }

    // Older relays publish an empty string instead of omitting the field.
    pub fn ws_url(&self) -> Option<&str> {
        self.relay_ws_url.as_deref().filter(|url| !url.is_empty())
    }
}

/// The relay a project was bound to, as returned to control-plane callers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RelayBinding {
    pub relay_id: RelayId,
    pub relay_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_ws_url: Option<String>,
}

impl RelayBinding {
    pub fn from_record(relay_id: &str, record: &RelayRecord) -> Self {
        RelayBinding {
            relay_id: relay_id.to_string(),
            relay_url: record.relay_url.clone(),
            relay_ws_url: record.ws_url().map(String::from),
        }
    }
}
