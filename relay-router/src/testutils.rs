use crate::RouterBody;
use chrono::Utc;
use coordinator::Coordinator;
use coordinator::config::{Config as CoordinatorConfig, StoreConfig};
use coordinator::store::{MemoryStore, StateStore};
use coordinator::types::RelayRecord;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, SanType};
use rustls::ServerConfig;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

pub fn full_body(content: &'static str) -> RouterBody {
    Full::new(Bytes::from_static(content.as_bytes()))
        .map_err(|never| match never {})
        .boxed()
}

// Replies with a JSON description of the request it received.
async fn echo_handler(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body_bytes = body
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_else(|_| Bytes::new());

    let headers: BTreeMap<String, String> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();

    let echoed = serde_json::json!({
        "method": parts.method.as_str(),
        "uri": parts.uri.to_string(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body_bytes),
    });

    let mut response = Response::new(Full::new(Bytes::from(echoed.to_string())));
    response
        .headers_mut()
        .insert("content-type", "application/json".parse().unwrap());
    Ok(response)
}

pub async fn start_echo_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let io = TokioIo::new(stream);

            tokio::spawn(async move {
                let _ = Builder::new(TokioExecutor::new())
                    .serve_connection(io, service_fn(echo_handler))
                    .await;
            });
        }
    });

    port
}

/// Echo server behind TLS, with a certificate for 127.0.0.1 issued by a
/// throwaway CA. Returns the port and the CA certificate as PEM.
pub async fn start_tls_echo_server() -> (u16, String) {
    let ca_key = KeyPair::generate().unwrap();
    let mut ca_params = CertificateParams::default();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params
        .distinguished_name
        .push(DnType::CommonName, "conductor test CA");
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();

    let relay_key = KeyPair::generate().unwrap();
    let mut relay_params = CertificateParams::default();
    relay_params
        .distinguished_name
        .push(DnType::CommonName, "relay");
    relay_params.subject_alt_names = vec![SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST))];
    let relay_cert = relay_params
        .signed_by(&relay_key, &ca_cert, &ca_key)
        .unwrap();

    let server_config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(
        vec![relay_cert.der().clone()],
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(relay_key.serialize_der())),
    )
    .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(server_config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let acceptor = acceptor.clone();

            tokio::spawn(async move {
                let Ok(tls) = acceptor.accept(stream).await else {
                    return;
                };
                let _ = Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(tls), service_fn(echo_handler))
                    .await;
            });
        }
    });

    (port, ca_cert.pem())
}

/// Accepts connections and never answers.
pub async fn start_silent_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            held.push(stream);
        }
    });

    port
}

pub fn memory_coordinator() -> (Arc<MemoryStore>, Coordinator) {
    let store = Arc::new(MemoryStore::new());
    let config = CoordinatorConfig {
        store: StoreConfig::Memory,
        relay_registry_key: "relay_servers".into(),
        relay_assignment_key: "relay_assignments".into(),
    };
    let coordinator = Coordinator::new(store.clone(), &config);
    (store, coordinator)
}

pub async fn register_relay(store: &MemoryStore, relay_id: &str, relay_url: &str, load: i64) {
    let record = RelayRecord::new(relay_url, load, Utc::now());
    store
        .set_field(
            "relay_servers",
            relay_id,
            &serde_json::to_string(&record).unwrap(),
        )
        .await
        .unwrap();
}

pub async fn bind_project(store: &MemoryStore, project: &str, relay_id: &str) {
    store
        .set_field("relay_assignments", project, relay_id)
        .await
        .unwrap();
}
