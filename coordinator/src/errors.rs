use crate::store::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum CoordinatorError {
    #[error("no available relay servers")]
    NoAvailableRelay,

    #[error("no relay assigned to project {0}")]
    ProjectUnassigned(String),

    #[error("relay {0} is not in the registry")]
    RelayRecordMissing(String),

    #[error("malformed registry record for relay {relay_id}: {reason}")]
    MalformedRelayRecord { relay_id: String, reason: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
