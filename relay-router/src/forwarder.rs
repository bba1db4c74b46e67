use crate::errors::RouterError;
use crate::metrics_defs::FORWARD_FAILURES;
use crate::router::request_host;
use crate::{ResponseBody, RouterBody};
use http::header::{HOST, HeaderName, HeaderValue};
use http::{HeaderMap, Uri, Version};
use http_body_util::BodyExt;
use hyper::{Request, Response};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use rustls::{ClientConfig, RootCertStore};
use shared::counter;
use shared::http::{add_via_header, filter_hop_by_hop};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::timeout;

static X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
static X_ORIGINAL_URL: HeaderName = HeaderName::from_static("x-original-url");
static X_PROJECT_NAME: HeaderName = HeaderName::from_static("x-project-name");
static X_RECEIVED_AT: HeaderName = HeaderName::from_static("x-received-at");

/// Builds the relay URI for an inbound request.
///
/// Relay URLs without a scheme are treated as plain http. The inbound path and
/// query are appended to the relay base verbatim.
pub fn build_target_uri(relay_url: &str, path_and_query: &str) -> Result<Uri, RouterError> {
    let base = if relay_url.starts_with("http://") || relay_url.starts_with("https://") {
        relay_url.to_string()
    } else {
        format!("http://{relay_url}")
    };

    url::Url::parse(&base)
        .map_err(|e| RouterError::UpstreamForwardFailure(format!("invalid relay url {relay_url}: {e}")))?;

    let target = format!("{}{}", base.trim_end_matches('/'), path_and_query);
    target
        .parse::<Uri>()
        .map_err(|e| RouterError::UpstreamForwardFailure(format!("invalid target uri {target}: {e}")))
}

/// Client TLS settings for https relays: the webpki roots plus any CA
/// certificates found in `extra_ca_file`.
pub fn tls_config(extra_ca_file: Option<&Path>) -> Result<ClientConfig, RouterError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(path) = extra_ca_file {
        let file = File::open(path)
            .map_err(|e| RouterError::Tls(format!("cannot open {}: {e}", path.display())))?;

        let certs = rustls_pemfile::certs(&mut BufReader::new(file))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RouterError::Tls(format!("cannot read {}: {e}", path.display())))?;
        if certs.is_empty() {
            return Err(RouterError::Tls(format!(
                "no certificates in {}",
                path.display()
            )));
        }

        let (added, ignored) = roots.add_parsable_certificates(certs);
        tracing::info!(path = %path.display(), added, ignored, "loaded relay CA certificates");
    }

    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| RouterError::Tls(e.to_string()))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(config)
}

/// Proxies project requests to relays over a pooled client. Relay URLs may
/// use http or https.
pub struct Forwarder {
    client: Client<HttpsConnector<HttpConnector>, RouterBody>,
    /// Bounds the wait for response headers. The body streams without a deadline.
    response_timeout: Duration,
}

impl Forwarder {
    pub fn new(response_timeout: Duration, tls: ClientConfig) -> Self {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);

        let connector = HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            response_timeout,
        }
    }

    pub async fn forward(
        &self,
        request: Request<RouterBody>,
        relay_url: &str,
        project: &str,
    ) -> Result<Response<ResponseBody>, RouterError> {
        let (mut parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target = build_target_uri(relay_url, path_and_query).inspect_err(|_| {
            counter!(FORWARD_FAILURES, "reason" => "invalid_target").increment(1);
        })?;

        let inbound_host = request_host(&parts.headers, &parts.uri).unwrap_or_default();
        let original_url = parts.uri.to_string();
        let inbound_version = parts.version;

        filter_hop_by_hop(&mut parts.headers, inbound_version);
        parts.headers.remove(HOST);
        add_via_header(&mut parts.headers, inbound_version);
        insert_forwarding_headers(&mut parts.headers, &inbound_host, &original_url, project);

        tracing::debug!(project, %target, "forwarding request to relay");
        parts.uri = target;
        // Relays are reached over HTTP/1.1 regardless of the inbound protocol.
        parts.version = Version::HTTP_11;

        let response = timeout(
            self.response_timeout,
            self.client.request(Request::from_parts(parts, body)),
        )
        .await
        .map_err(|_| {
            counter!(FORWARD_FAILURES, "reason" => "timeout").increment(1);
            RouterError::UpstreamTimeout(relay_url.to_string())
        })?
        .map_err(|e| {
            counter!(FORWARD_FAILURES, "reason" => "request_failed").increment(1);
            RouterError::UpstreamForwardFailure(format!("{relay_url}: {e}"))
        })?;

        let (mut parts, body) = response.into_parts();
        let response_version = parts.version;
        filter_hop_by_hop(&mut parts.headers, response_version);
        add_via_header(&mut parts.headers, response_version);

        let relay = relay_url.to_string();
        let project = project.to_string();
        let body = body
            .map_err(move |e| {
                // Headers are already on the wire, all that is left is to cut the stream.
                tracing::warn!(%project, relay_url = %relay, error = %e, "relay response body failed");
                RouterError::Hyper(e)
            })
            .boxed();

        Ok(Response::from_parts(parts, body))
    }
}

fn insert_forwarding_headers(
    headers: &mut HeaderMap,
    inbound_host: &str,
    original_url: &str,
    project: &str,
) {
    let received_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let values = [
        (&X_FORWARDED_HOST, inbound_host.to_string()),
        (&X_ORIGINAL_URL, original_url.to_string()),
        (&X_PROJECT_NAME, project.to_string()),
        (&X_RECEIVED_AT, received_at.to_string()),
    ];

    for (name, value) in values {
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                headers.insert(name.clone(), value);
            }
            Err(_) => tracing::warn!(header = %name, "dropping header with invalid value"),
        }
    }
}
