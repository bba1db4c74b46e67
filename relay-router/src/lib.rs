//! Host based routing for webhook traffic.
//!
//! Requests to `<project>.<base domain>` are proxied to the relay bound to that
//! project. Requests to the control plane label (`api.<base domain>`) hit the
//! assignment API. Health and readiness are served on a separate admin listener.
pub mod api;
pub mod archive;
pub mod config;
pub mod errors;
pub mod forwarder;
mod metrics_defs;
pub mod router;

#[cfg(test)]
mod testutils;

use archive::RequestArchive;
use coordinator::Coordinator;
use errors::RouterError;
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response};
use router::Router;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use metrics_defs::ALL_METRICS;

/// Request body as seen by the router and sent on to relays.
pub type RouterBody = BoxBody<Bytes, hyper::Error>;
pub type ResponseBody = BoxBody<Bytes, RouterError>;

/// Serves the router and admin listeners until `cancel` fires.
pub async fn run(
    config: config::Config,
    coordinator: Coordinator,
    archive: Arc<dyn RequestArchive>,
    cancel: CancellationToken,
) -> Result<(), RouterError> {
    let router_service = RouterService {
        router: Arc::new(Router::new(&config, coordinator.clone(), archive)?),
    };
    let admin_service = AdminService::<_, RouterError>::new(move || coordinator.is_ready());

    let router_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        router_service,
        cancel.clone(),
    );
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
        cancel,
    );

    tokio::try_join!(router_task, admin_task)?;
    Ok(())
}

struct RouterService {
    router: Arc<Router>,
}

impl Service<Request<Incoming>> for RouterService {
    type Response = Response<ResponseBody>;
    type Error = RouterError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let router = self.router.clone();
        Box::pin(async move { Ok(router.handle(req.map(|body| body.boxed())).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::TracingArchive;
    use crate::config::{Config, Listener};
    use crate::testutils::{memory_coordinator, register_relay, start_echo_server};
    use std::time::Duration;

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_run_end_to_end() {
        let relay_port = start_echo_server().await;
        let (store, coordinator) = memory_coordinator();
        register_relay(&store, "r1", &format!("http://127.0.0.1:{relay_port}"), 0).await;

        let config = Config {
            listener: Listener {
                host: "127.0.0.1".into(),
                port: free_port(),
            },
            admin_listener: Listener {
                host: "127.0.0.1".into(),
                port: free_port(),
            },
            base_domain: "whook.test".into(),
            control_plane_label: "api".into(),
            upstream_timeout_secs: 5,
            unavailable_status: 500,
            upstream_ca_file: None,
        };
        let port = config.listener.port;
        let admin_port = config.admin_listener.port;

        let cancel = CancellationToken::new();
        let server = tokio::spawn(run(
            config,
            coordinator,
            Arc::new(TracingArchive),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .unwrap();

        let ready = client
            .get(format!("http://127.0.0.1:{admin_port}/ready"))
            .send()
            .await
            .unwrap();
        assert_eq!(ready.status(), 200);

        // Unknown project before assignment
        let response = client
            .post(format!("http://127.0.0.1:{port}/hooks"))
            .header("host", "acme.whook.test")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 500);

        let assigned: serde_json::Value = client
            .post(format!("http://127.0.0.1:{port}/relay"))
            .header("host", "api.whook.test")
            .body(r#"{"project_name": "acme"}"#)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(
            assigned["relay_url"],
            format!("http://127.0.0.1:{relay_port}")
        );

        let echoed: serde_json::Value = client
            .post(format!("http://127.0.0.1:{port}/hooks/stripe?id=9"))
            .header("host", "acme.whook.test:8080")
            .body("event")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(echoed["uri"], "/hooks/stripe?id=9");
        assert_eq!(echoed["body"], "event");
        assert_eq!(echoed["headers"]["x-project-name"], "acme");
        assert_eq!(echoed["headers"]["x-forwarded-host"], "acme.whook.test:8080");

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), server).await;
        assert!(result.unwrap().unwrap().is_ok());
    }
}
