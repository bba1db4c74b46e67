use coordinator::errors::CoordinatorError;
use hyper::StatusCode;
use thiserror::Error;

/// Errors that can occur while routing a request
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No route matched for request")]
    NotFound,

    #[error("Forwarding to relay failed: {0}")]
    UpstreamForwardFailure(String),

    #[error("Relay timed out: {0}")]
    UpstreamTimeout(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("Hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RouterError {
    pub fn status(&self) -> StatusCode {
        match self {
            RouterError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RouterError::NotFound => StatusCode::NOT_FOUND,
            RouterError::UpstreamForwardFailure(_)
            | RouterError::UpstreamTimeout(_)
            | RouterError::Internal(_)
            | RouterError::Tls(_)
            | RouterError::Coordinator(_)
            | RouterError::Hyper(_)
            | RouterError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
