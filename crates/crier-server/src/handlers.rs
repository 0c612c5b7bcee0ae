//! HTTP control surface for crier.
//!
//! Provision/deprovision and publish are the admin-facing operations; the
//! batch endpoint receives forwarded recipient batches from sibling nodes.
//! Publish and deprovision authorize against the channel's stored token; on
//! provision, the Authorization header *becomes* the channel token.

use crate::config::Config;
use crate::metrics;
use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use crier_core::{Broadcaster, EngineError, Store};
use crier_model::{validate_channel_name, BatchForward, Channel, Content};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The persistent store.
    pub store: Arc<dyn Store>,
    /// The fan-out engine.
    pub broadcaster: Arc<Broadcaster>,
    /// Server configuration.
    pub config: Config,
}

type ApiResponse = (StatusCode, Json<Value>);

/// Run the HTTP server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(state: Arc<AppState>) -> Result<()> {
    let addr = state.config.bind_addr();
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!("crier listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the route table.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/channels/:name", put(provision).delete(deprovision))
        .route("/channels/:name/broadcast", post(broadcast))
        .route("/internal/batch", post(batch_deliver))
        .route("/health", get(health))
        .with_state(state)
}

/// Health check handler.
async fn health() -> ApiResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

#[derive(Debug, Deserialize)]
struct ProvisionRequest {
    origin_id: String,
}

/// Provision a channel. The Authorization header becomes the channel's
/// publish token; the token is immutable afterwards.
async fn provision(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ProvisionRequest>,
) -> ApiResponse {
    if let Err(reason) = validate_channel_name(&name) {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": reason })));
    }
    let token = auth_header(&headers);
    if token.is_empty() {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "missing authorization" })),
        );
    }

    let channel = Channel::new(&name, token, &request.origin_id);
    match state.store.insert_channel(&channel).await {
        Ok(true) => {
            info!(channel = %name, "channel provisioned");
            (StatusCode::CREATED, Json(json!({ "channel": name })))
        }
        Ok(false) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "channel already exists" })),
        ),
        Err(e) => store_failure(e.into()),
    }
}

/// Deprovision a channel, cascading everything it owns.
async fn deprovision(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> ApiResponse {
    let channel = match authorized_channel(&state, &name, &headers).await {
        Ok(channel) => channel,
        Err(response) => return response,
    };

    match state.store.delete_channel(&channel.name).await {
        Ok(()) => {
            info!(channel = %name, "channel deprovisioned");
            (StatusCode::OK, Json(json!({ "channel": name })))
        }
        Err(e) => store_failure(e.into()),
    }
}

/// Publish content into a channel.
async fn broadcast(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(content): Json<Content>,
) -> ApiResponse {
    if let Err(response) = authorized_channel(&state, &name, &headers).await {
        return response;
    }

    let kind = content.kind();
    match state.broadcaster.publish(&name, content).await {
        Ok(report) => {
            metrics::record_broadcast(kind, &report);
            (
                StatusCode::OK,
                Json(json!({
                    "attempted": report.attempted,
                    "delivered": report.delivered,
                    "failed": report.failed,
                    "elapsed_ms": report.elapsed_ms,
                })),
            )
        }
        Err(e) => error_response(e),
    }
}

/// Deliver one forwarded batch locally on behalf of a sibling node.
async fn batch_deliver(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<BatchForward>,
) -> ApiResponse {
    let outcome = state
        .broadcaster
        .deliver_batch(&batch.recipients, &batch.content)
        .await;
    metrics::record_batch(batch.recipients.len());
    (
        StatusCode::OK,
        Json(json!({
            "delivered": outcome.delivered,
            "failed": outcome.failed,
        })),
    )
}

/// Look up a channel and check the Authorization header against its token.
async fn authorized_channel(
    state: &AppState,
    name: &str,
    headers: &HeaderMap,
) -> Result<Channel, ApiResponse> {
    let channel = match state.store.channel(name).await {
        Ok(Some(channel)) => channel,
        Ok(None) => {
            warn!(channel = %name, "unknown channel");
            return Err((
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "unknown channel" })),
            ));
        }
        Err(e) => return Err(store_failure(e.into())),
    };

    if !constant_time_eq(auth_header(headers), &channel.token) {
        warn!(channel = %name, "invalid authorization");
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "invalid authorization" })),
        ));
    }
    Ok(channel)
}

fn auth_header(headers: &HeaderMap) -> &str {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

/// Constant-time string comparison for token checks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Map an engine error onto a response without leaking channel internals.
fn error_response(e: EngineError) -> ApiResponse {
    match e {
        EngineError::ChannelNotFound(_)
        | EngineError::SubscriberNotFound(_)
        | EngineError::BroadcastNotFound(_) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "not found" })),
        ),
        EngineError::Unauthorized | EngineError::Rejected(_) => (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "forbidden" })),
        ),
        EngineError::NotActivated(_) => (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "channel not yet activated" })),
        ),
        EngineError::Store(_) => store_failure(e),
    }
}

fn store_failure(e: EngineError) -> ApiResponse {
    error!(error = %e, "store failure");
    metrics::record_error("store");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("s3cret", "s3cret"));
        assert!(!constant_time_eq("s3cret", "s3creT"));
        assert!(!constant_time_eq("s3cret", "s3cre"));
        assert!(!constant_time_eq("", "a"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn test_error_mapping() {
        let (status, _) = error_response(EngineError::ChannelNotFound("x".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = error_response(EngineError::BroadcastNotFound(Uuid::new_v4()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = error_response(EngineError::NotActivated("x".into()));
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.0["error"], "channel not yet activated");

        let (status, _) = error_response(EngineError::Unauthorized);
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_auth_header_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(auth_header(&headers), "");

        headers.insert(AUTHORIZATION, "s3cret".parse().unwrap());
        assert_eq!(auth_header(&headers), "s3cret");
    }
}
