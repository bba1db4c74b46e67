use serde::Deserialize;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Store URL cannot be empty")]
    EmptyStoreUrl,

    #[error("Hash key cannot be empty: {0}")]
    EmptyHashKey(&'static str),

    #[error("Relay registry and relay assignments must use different hash keys")]
    SharedHashKey,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum StoreConfig {
    Redis { url: String },
    Memory,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    pub store: StoreConfig,
    /// Hash mapping relay id to its JSON health record
    #[serde(default = "default_relay_registry_key")]
    pub relay_registry_key: String,
    /// Hash mapping project name to relay id
    #[serde(default = "default_relay_assignment_key")]
    pub relay_assignment_key: String,
}

fn default_relay_registry_key() -> String {
    "relay_servers".into()
}

fn default_relay_assignment_key() -> String {
    "relay_assignments".into()
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let StoreConfig::Redis { url } = &self.store
            && url.is_empty()
        {
            return Err(ValidationError::EmptyStoreUrl);
        }

        if self.relay_registry_key.is_empty() {
            return Err(ValidationError::EmptyHashKey("relay_registry_key"));
        }

        if self.relay_assignment_key.is_empty() {
            return Err(ValidationError::EmptyHashKey("relay_assignment_key"));
        }

        if self.relay_registry_key == self.relay_assignment_key {
            return Err(ValidationError::SharedHashKey);
        }

        Ok(())
    }
}
