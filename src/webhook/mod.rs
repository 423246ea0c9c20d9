//! HTTP listener for Docker Hub push webhooks.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::upgrade::redeploy::Redeployer;
use crate::upgrade::{RejectReason, UpgradeOutcome};

pub mod callback;
pub mod payload;

use callback::CallbackBody;
use payload::PushEvent;

pub const WELCOME: &str = "Welcome to the Rancher auto-deployer!";

/// State shared across axum handlers.
pub struct WebhookState {
    pub redeployer: Arc<Redeployer>,
    pub key: String,
    pub http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct PushReply {
    event_id: Uuid,
    received_at: chrono::DateTime<chrono::Utc>,
    image: String,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/{key}", post(handle_push))
        .with_state(state)
}

pub async fn serve(
    addr: SocketAddr,
    state: Arc<WebhookState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Listening for Docker Hub webhooks on {addr}");
    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);

    axum::serve(listener, router(state))
        .await
        .map_err(|e| e.into())
}

async fn welcome() -> &'static str {
    WELCOME
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim() == "application/json")
}

fn status_for(outcome: &UpgradeOutcome) -> StatusCode {
    match outcome {
        UpgradeOutcome::Rejected(RejectReason::NotFound) => StatusCode::NOT_FOUND,
        UpgradeOutcome::Rejected(RejectReason::Busy) => StatusCode::CONFLICT,
        UpgradeOutcome::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::ACCEPTED,
    }
}

async fn handle_push(
    State(state): State<Arc<WebhookState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if key != state.key {
        return (StatusCode::FORBIDDEN, "Received request with invalid key.").into_response();
    }
    if !is_json(&headers) {
        return (
            StatusCode::NOT_IMPLEMENTED,
            "Received request with invalid content type.",
        )
            .into_response();
    }

    let event: PushEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            log::warn!("Unable to decode push event: {e}");
            return (StatusCode::NOT_ACCEPTABLE, e.to_string()).into_response();
        }
    };

    let event_id = Uuid::now_v7();
    let received_at = chrono::Utc::now();
    let repository = &event.repository.repo_name;
    let tag = &event.push_data.tag;
    let image = format!("{repository}:{tag}");
    match &event.push_data.pusher {
        Some(pusher) => log::info!("Received request {event_id} for {image} pushed by {pusher}"),
        None => log::info!("Received request {event_id} for {image}"),
    }

    let outcome = state.redeployer.redeploy(repository, tag).await;
    log::info!("Request {event_id} for {image}: {}", outcome.label());

    if let Some(url) = event.callback_url.clone() {
        callback::notify(
            state.http.clone(),
            url,
            CallbackBody::for_outcome(&image, &outcome),
        );
    }

    let reply = PushReply {
        event_id,
        received_at,
        image,
        outcome: outcome.label(),
        reason: match &outcome {
            UpgradeOutcome::Rejected(reason) => Some(reason.to_string()),
            _ => None,
        },
    };
    (status_for(&outcome), Json(reply)).into_response()
}
