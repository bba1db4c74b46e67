//! Control plane endpoint used by relays and clients to obtain a relay binding.
use crate::errors::RouterError;
use crate::{ResponseBody, RouterBody};
use coordinator::Coordinator;
use http::header::CONTENT_TYPE;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

const MAX_BODY_SIZE: usize = 64 * 1024;

#[derive(Deserialize)]
struct AssignRequest {
    project_name: String,
}

#[derive(Serialize)]
struct AssignResponse {
    relay_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    relay_ws_url: Option<String>,
}

/// `POST /relay` with `{"project_name": ...}` binds the project and returns the relay URL.
pub async fn handle_control_plane(
    coordinator: &Coordinator,
    request: Request<RouterBody>,
) -> Result<Response<ResponseBody>, RouterError> {
    if request.method() != Method::POST || request.uri().path() != "/relay" {
        return Err(RouterError::NotFound);
    }

    let body = Limited::new(request.into_body(), MAX_BODY_SIZE)
        .collect()
        .await
        .map_err(|e| RouterError::InvalidRequest(format!("failed to read body: {e}")))?
        .to_bytes();

    let AssignRequest { project_name } = serde_json::from_slice(&body)
        .map_err(|e| RouterError::InvalidRequest(format!("invalid request body: {e}")))?;

    if project_name.is_empty() {
        return Err(RouterError::InvalidRequest(
            "project_name is required".to_string(),
        ));
    }

    let binding = coordinator.assign_relay_server(&project_name).await?;

    let payload = serde_json::to_vec(&AssignResponse {
        relay_url: binding.relay_url,
        relay_ws_url: binding.relay_ws_url,
    })
    .map_err(|e| RouterError::Internal(e.to_string()))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/json")
        .body(
            Full::new(Bytes::from(payload))
                .map_err(|e| match e {})
                .boxed(),
        )
        .map_err(|e| RouterError::Internal(format!("failed to build response: {e}")))
}
