use crate::api::handle_control_plane;
use crate::archive::RequestArchive;
use crate::config::Config;
use crate::errors::RouterError;
use crate::forwarder::{Forwarder, tls_config};
use crate::metrics_defs::{ARCHIVE_FAILURES, REQUEST_DURATION, REQUESTS_INFLIGHT};
use crate::{ResponseBody, RouterBody};
use coordinator::Coordinator;
use http::header::HOST;
use http::{HeaderMap, Uri};
use hyper::{Request, Response, StatusCode};
use shared::http::make_error_response;
use shared::{counter, gauge, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where a request is headed, decided from its host alone.
#[derive(Debug, PartialEq)]
pub enum RequestTarget {
    ControlPlane,
    Project(String),
}

impl RequestTarget {
    fn kind(&self) -> &'static str {
        match self {
            RequestTarget::ControlPlane => "control_plane",
            RequestTarget::Project(_) => "project",
        }
    }
}

/// Reads the inbound host from the Host header, falling back to the URI
/// authority for HTTP/2 requests.
pub fn request_host(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .map(String::from)
        .or_else(|| uri.authority().map(|a| a.as_str().to_string()))
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Classifies `host` against the base domain. `base_domain` and
/// `control_plane_label` must already be lowercase.
pub fn classify_host(
    host: &str,
    base_domain: &str,
    control_plane_label: &str,
) -> Result<RequestTarget, RouterError> {
    let host = strip_port(host).to_ascii_lowercase();

    if host == base_domain {
        return Err(RouterError::InvalidRequest(format!(
            "no project subdomain in host {host}"
        )));
    }

    let subdomain = host
        .strip_suffix(base_domain)
        .and_then(|rest| rest.strip_suffix('.'))
        .filter(|sub| !sub.is_empty())
        .ok_or_else(|| {
            RouterError::InvalidRequest(format!("host {host} is not under {base_domain}"))
        })?;

    let is_control_plane = subdomain == control_plane_label
        || subdomain
            .strip_prefix(control_plane_label)
            .is_some_and(|rest| rest.starts_with('.'));

    if is_control_plane {
        Ok(RequestTarget::ControlPlane)
    } else {
        Ok(RequestTarget::Project(subdomain.to_string()))
    }
}

/// Holds one unit of the in-flight gauge until dropped, so requests cancelled
/// mid-forward are released too.
struct InflightGuard;

impl InflightGuard {
    fn acquire() -> Self {
        gauge!(REQUESTS_INFLIGHT).increment(1.0);
        InflightGuard
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        gauge!(REQUESTS_INFLIGHT).decrement(1.0);
    }
}

/// Dispatches requests by host to the control plane API or a project's relay.
pub struct Router {
    coordinator: Coordinator,
    forwarder: Forwarder,
    archive: Arc<dyn RequestArchive>,
    base_domain: String,
    control_plane_label: String,
    unavailable_status: StatusCode,
}

impl Router {
    pub fn new(
        config: &Config,
        coordinator: Coordinator,
        archive: Arc<dyn RequestArchive>,
    ) -> Result<Self, RouterError> {
        let tls = tls_config(config.upstream_ca_file.as_deref())?;

        Ok(Self {
            coordinator,
            forwarder: Forwarder::new(Duration::from_secs(config.upstream_timeout_secs), tls),
            archive,
            base_domain: config.base_domain.to_ascii_lowercase(),
            control_plane_label: config.control_plane_label.to_ascii_lowercase(),
            unavailable_status: config.unavailable_status(),
        })
    }

    /// Every failure becomes a response here, the connection itself never errors.
    pub async fn handle(&self, request: Request<RouterBody>) -> Response<ResponseBody> {
        let started = Instant::now();
        let _inflight = InflightGuard::acquire();

        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let (kind, result) = self.route(request).await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let status = e.status();
                if status.is_server_error() {
                    tracing::warn!(%method, path, kind, error = %e, "request failed");
                } else {
                    tracing::debug!(%method, path, kind, error = %e, "request rejected");
                }
                make_error_response(status)
            }
        };

        histogram!(
            REQUEST_DURATION,
            "status" => response.status().as_str().to_string(),
            "kind" => kind
        )
        .record(started.elapsed().as_secs_f64());

        response
    }

    async fn route(
        &self,
        request: Request<RouterBody>,
    ) -> (&'static str, Result<Response<ResponseBody>, RouterError>) {
        let Some(host) = request_host(request.headers(), request.uri()) else {
            return (
                "unknown",
                Err(RouterError::InvalidRequest("missing host".to_string())),
            );
        };

        let target = match classify_host(&host, &self.base_domain, &self.control_plane_label) {
            Ok(target) => target,
            Err(e) => return ("unknown", Err(e)),
        };
        let kind = target.kind();

        let result = match target {
            RequestTarget::ControlPlane => handle_control_plane(&self.coordinator, request).await,
            RequestTarget::Project(project) => self.handle_project(request, &project).await,
        };
        (kind, result)
    }

    async fn handle_project(
        &self,
        request: Request<RouterBody>,
        project: &str,
    ) -> Result<Response<ResponseBody>, RouterError> {
        let (parts, body) = request.into_parts();
        tracing::info!(project, method = %parts.method, path = parts.uri.path(), "handling project request");

        if let Err(e) = self.archive.store(&parts, project).await {
            counter!(ARCHIVE_FAILURES).increment(1);
            tracing::error!(project, error = %e, "failed to archive request");
        }

        let relay_url = match self.coordinator.get_project_relay_server(project).await {
            Ok(relay_url) => relay_url,
            Err(e) => {
                tracing::error!(project, error = %e, "unable to resolve relay for project");
                return Ok(make_error_response(self.unavailable_status));
            }
        };

        self.forwarder
            .forward(Request::from_parts(parts, body), &relay_url, project)
            .await
    }
}
