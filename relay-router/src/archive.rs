//! Best-effort capture of inbound project requests.
//!
//! Only request metadata is captured. The body is forwarded to the relay as a
//! stream and never buffered here.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::request::Parts;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error("archive unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoredRequest {
    pub project_name: String,
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// First value of every header that is valid UTF-8
    pub headers: BTreeMap<String, String>,
    pub received_at: DateTime<Utc>,
}

impl StoredRequest {
    pub fn capture(parts: &Parts, project: &str) -> Self {
        let mut headers = BTreeMap::new();
        for name in parts.headers.keys() {
            if let Some(value) = parts.headers.get(name).and_then(|v| v.to_str().ok()) {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }

        StoredRequest {
            project_name: project.to_string(),
            method: parts.method.to_string(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(String::from),
            headers,
            received_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait RequestArchive: Send + Sync {
    async fn store(&self, parts: &Parts, project: &str) -> Result<StoredRequest, ArchiveError>;
}

/// Writes every captured request to the log as a structured event.
#[derive(Default)]
pub struct TracingArchive;

#[async_trait]
impl RequestArchive for TracingArchive {
    async fn store(&self, parts: &Parts, project: &str) -> Result<StoredRequest, ArchiveError> {
        let stored = StoredRequest::capture(parts, project);
        let headers = serde_json::to_string(&stored.headers)?;

        tracing::info!(
            project = %stored.project_name,
            method = %stored.method,
            path = %stored.path,
            query = stored.query.as_deref(),
            headers = %headers,
            received_at = %stored.received_at.to_rfc3339(),
            "stored request"
        );

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, Method, Request};

    #[tokio::test]
    async fn test_capture_metadata() {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/hooks/github?delivery=42")
            .header("host", "acme.whook.dev")
            .header("x-github-event", "push")
            .header("x-multi", "first")
            .header("x-multi", "second")
            .body(())
            .unwrap();
        request
            .headers_mut()
            .insert("x-binary", HeaderValue::from_bytes(&[0xfa, 0xfb]).unwrap());
        let (parts, _) = request.into_parts();

        let stored = TracingArchive.store(&parts, "acme").await.unwrap();
        assert_eq!(stored.project_name, "acme");
        assert_eq!(stored.method, "POST");
        assert_eq!(stored.path, "/hooks/github");
        assert_eq!(stored.query.as_deref(), Some("delivery=42"));
        assert_eq!(stored.headers.get("x-github-event").unwrap(), "push");
        assert_eq!(stored.headers.get("x-multi").unwrap(), "first");
        assert!(!stored.headers.contains_key("x-binary"));
        assert_eq!(stored.headers.len(), 3);
    }
}
