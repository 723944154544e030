// Read-only operator surface: health, the latest snapshot, and the handful
// of control actions `control.rs` already exposes. Grounded on
// `api::rest`'s router-construction shape (permissive CORS, `Router::new()`
// chained with `.route(...).layer(cors).with_state(state)`, a plain
// `Json(..)` health handler) but trimmed down to what this runtime actually
// has behind it — no bearer-auth dashboard, no feature-flag surface, no
// websocket push, since none of those are wired up here.

use crate::context::RuntimeContext;
use crate::observability::DependencyStatus;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

pub fn router(ctx: Arc<RuntimeContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/snapshot", get(snapshot))
        .route("/control", get(control_state))
        .route("/control/pause", post(control_pause))
        .route("/control/resume", post(control_resume))
        .route("/control/kill", post(control_kill))
        .layer(cors)
        .with_state(ctx)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    server_time: i64,
    sources: Vec<SourceStatus>,
}

#[derive(Serialize)]
struct SourceStatus {
    source: String,
    status: &'static str,
}

async fn healthz(State(ctx): State<Arc<RuntimeContext>>) -> impl IntoResponse {
    let sources = ctx
        .health_registry
        .snapshot()
        .into_iter()
        .map(|(source, status)| SourceStatus { source, status: status.as_str() })
        .collect();

    let overall = ctx.health_registry.overall();
    let status_code = match overall {
        DependencyStatus::Healthy => StatusCode::OK,
        DependencyStatus::Degraded => StatusCode::OK,
        DependencyStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };

    let body = HealthResponse {
        status: overall.as_str(),
        server_time: chrono::Utc::now().timestamp_millis(),
        sources,
    };
    (status_code, Json(body))
}

/// Returns the most recently persisted snapshot, not a freshly computed
/// one — the driver loop writes it once per cycle, which is fresh enough
/// for an operator poll and avoids locking every tracker on every request.
async fn snapshot(State(ctx): State<Arc<RuntimeContext>>) -> impl IntoResponse {
    match ctx.snapshot_writer.read() {
        Some(snapshot) => Json(snapshot).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "no snapshot written yet" })),
        )
            .into_response(),
    }
}

async fn control_state(State(ctx): State<Arc<RuntimeContext>>) -> impl IntoResponse {
    Json(ctx.control.current())
}

async fn control_pause(State(ctx): State<Arc<RuntimeContext>>) -> impl IntoResponse {
    ctx.control.pause();
    info!("trading paused via api");
    Json(ctx.control.current())
}

async fn control_resume(State(ctx): State<Arc<RuntimeContext>>) -> impl IntoResponse {
    ctx.control.resume();
    info!("trading resumed via api");
    Json(ctx.control.current())
}

#[derive(serde::Deserialize, Default)]
struct KillRequest {
    #[serde(default)]
    reason: Option<String>,
}

async fn control_kill(
    State(ctx): State<Arc<RuntimeContext>>,
    body: Option<Json<KillRequest>>,
) -> impl IntoResponse {
    let reason = body
        .and_then(|Json(req)| req.reason)
        .unwrap_or_else(|| "killed via api".to_string());
    warn!(reason = %reason, "trading killed via api");
    ctx.control.kill(reason);
    Json(ctx.control.current())
}
