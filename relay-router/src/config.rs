use http::StatusCode;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Base domain cannot be empty")]
    EmptyBaseDomain,

    #[error("Base domain must be a bare hostname: {0}")]
    InvalidBaseDomain(String),

    #[error("Control plane label cannot be empty")]
    EmptyControlPlaneLabel,

    #[error("Upstream timeout must be at least one second")]
    ZeroUpstreamTimeout,

    #[error("Unavailable status must be a 4xx or 5xx code: {0}")]
    InvalidUnavailableStatus(u16),
}

/// Router configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Main listener for webhook and control plane traffic
    pub listener: Listener,
    /// Admin listener for health and readiness checks
    pub admin_listener: Listener,
    /// Domain under which every project gets a subdomain (e.g. "whook.dev")
    pub base_domain: String,
    /// Subdomain label reserved for the control plane API
    #[serde(default = "default_control_plane_label")]
    pub control_plane_label: String,
    /// Time allowed for a relay to return response headers
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
    /// Status returned for project requests when no relay can be resolved
    #[serde(default = "default_unavailable_status")]
    pub unavailable_status: u16,
    /// PEM bundle of CA certificates trusted for https relays, in addition to
    /// the public webpki roots
    #[serde(default)]
    pub upstream_ca_file: Option<PathBuf>,
}

fn default_control_plane_label() -> String {
    "api".into()
}

fn default_upstream_timeout_secs() -> u64 {
    30
}

fn default_unavailable_status() -> u16 {
    500
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.base_domain.is_empty() {
            return Err(ValidationError::EmptyBaseDomain);
        }

        if self.base_domain.starts_with('.')
            || self.base_domain.ends_with('.')
            || self.base_domain.contains([':', '/'])
        {
            return Err(ValidationError::InvalidBaseDomain(self.base_domain.clone()));
        }

        if self.control_plane_label.is_empty() {
            return Err(ValidationError::EmptyControlPlaneLabel);
        }

        if self.upstream_timeout_secs == 0 {
            return Err(ValidationError::ZeroUpstreamTimeout);
        }

        if !(400..=599).contains(&self.unavailable_status) {
            return Err(ValidationError::InvalidUnavailableStatus(
                self.unavailable_status,
            ));
        }

        Ok(())
    }

    /// Only meaningful on a validated config.
    pub fn unavailable_status(&self) -> StatusCode {
        StatusCode::from_u16(self.unavailable_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}
