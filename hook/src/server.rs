//! axum server wiring.
//!
//! The service exposes:
//! - `/healthz` and `/readyz`
//! - `POST /webhook/sendgrid`, which runs each delivery through [`crate::pipeline::ingest`]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::HookConfig,
    pipeline::{ingest, PipelineError, QueueTarget},
    queue::LazyQueue,
};

pub const WEBHOOK_PATH: &str = "/webhook/sendgrid";

#[derive(Clone)]
pub struct AppState {
    queue: Arc<LazyQueue>,
    target: QueueTarget,
    max_body_bytes: usize,
}

impl AppState {
    pub fn new(queue: Arc<LazyQueue>, target: QueueTarget, max_body_bytes: usize) -> Self {
        Self {
            queue,
            target,
            max_body_bytes,
        }
    }
}

#[derive(Debug, Error)]
/// Reasons a webhook delivery is answered with something other than 200.
pub enum IngestError {
    #[error("request body too large")]
    BodyTooLarge,
    #[error("invalid events array")]
    InvalidEvents,
    #[error("queue unavailable: {0:#}")]
    QueueUnavailable(anyhow::Error),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl IngestError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InvalidEvents => StatusCode::BAD_REQUEST,
            Self::QueueUnavailable(_) | Self::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            Self::BodyTooLarge => "Request body too large",
            Self::InvalidEvents => "Invalid events array",
            Self::QueueUnavailable(_) | Self::Pipeline(_) => "Internal server error",
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.public_message() }))).into_response()
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }))
        .route(WEBHOOK_PATH, post(handle_webhook))
        .with_state(state)
}

pub async fn run(cfg: HookConfig) -> anyhow::Result<()> {
    let state = AppState::new(
        Arc::new(LazyQueue::sqs(cfg.queue_settings())),
        cfg.queue_target()?,
        cfg.max_body_bytes,
    );

    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(cfg.listen_addr).await?;
    tracing::info!(
        event = "listening",
        addr = %cfg.listen_addr,
        deployment_env = ?cfg.deployment_env,
        "sendgrid hook listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(event = "signal_error", error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!(event = "shutdown", "shutting down");
}

/// `true` for `application/json`, with or without parameters such as `charset`.
fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

/// Parse a delivery body into its events. Anything but a JSON array is rejected.
fn parse_events(body: &Bytes) -> Result<Vec<Value>, IngestError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Array(events)) => Ok(events),
        _ => Err(IngestError::InvalidEvents),
    }
}

async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let request_id = Uuid::new_v4();
    match process(&state, &headers, body, request_id).await {
        Ok(()) => (StatusCode::OK, Json("success")).into_response(),
        Err(err) => {
            match &err {
                IngestError::BodyTooLarge | IngestError::InvalidEvents => tracing::warn!(
                    event = "webhook_rejected",
                    request_id = %request_id,
                    reason = %err,
                    "rejected webhook delivery"
                ),
                _ => tracing::error!(
                    event = "webhook_failed",
                    request_id = %request_id,
                    error = %err,
                    "error processing SendGrid events"
                ),
            }
            err.into_response()
        }
    }
}

async fn process(
    state: &AppState,
    headers: &HeaderMap,
    body: Body,
    request_id: Uuid,
) -> Result<(), IngestError> {
    // Non-JSON deliveries are never read, so they are rejected as invalid before any size check.
    if !is_json(headers) {
        return Err(IngestError::InvalidEvents);
    }
    let body = to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|_| IngestError::BodyTooLarge)?;
    let events = parse_events(&body)?;

    tracing::debug!(
        event = "webhook_received",
        request_id = %request_id,
        events = events.len(),
        "received SendGrid events"
    );

    let sender = state
        .queue
        .get()
        .await
        .map_err(IngestError::QueueUnavailable)?;
    ingest(sender.as_ref(), &state.target, events).await?;
    Ok(())
}
