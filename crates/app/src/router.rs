use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::reply::ReplyOrchestrator;
use crate::{telemetry, webhook};

/// Immutable per-process state shared by every request.
#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    channel_secret: Arc<[u8]>,
    orchestrator: ReplyOrchestrator,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        channel_secret: Arc<[u8]>,
        orchestrator: ReplyOrchestrator,
    ) -> Self {
        Self {
            metrics,
            channel_secret,
            orchestrator,
        }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn channel_secret(&self) -> &[u8] {
        &self.channel_secret
    }

    pub fn orchestrator(&self) -> &ReplyOrchestrator {
        &self.orchestrator
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/webhook", post(webhook::handle))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
}
