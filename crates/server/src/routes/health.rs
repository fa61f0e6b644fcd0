use crate::error::ServerResult;
use crate::state::{ServerMetadata, ServerState};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use std::time::SystemTime;

static SERVER_START_TIME: once_cell::sync::Lazy<SystemTime> =
    once_cell::sync::Lazy::new(SystemTime::now);

fn uptime_seconds() -> u64 {
    SERVER_START_TIME
        .elapsed()
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Liveness probe. Always 200 while the process is serving.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "picweave-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds(),
    }))
}

/// Readiness probe. Reports per-component status; the embedding provider is
/// the only component that can be unavailable.
pub async fn readiness_check(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<impl IntoResponse> {
    let provider_status = if state.provider.is_available() {
        "ready"
    } else {
        "unavailable"
    };

    Ok(Json(json!({
        "status": "ready",
        "service": "picweave-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds(),
        "components": {
            "api": "ready",
            "index": "ready",
            "embedding_provider": provider_status,
        },
        "indexed_images": state.index.len(),
    })))
}

/// Prometheus metrics endpoint.
pub async fn metrics(State(state): State<Arc<ServerState>>) -> ServerResult<impl IntoResponse> {
    if let Some(handle) = &state.metrics_handle {
        return Ok(handle.render().into_response());
    }

    // Recorder not installed; return basic uptime instead of an error
    Ok(Json(json!({ "uptime_seconds": uptime_seconds() })).into_response())
}

/// Authenticated metadata endpoint: version, uptime, library size, and
/// embedding cache counters.
pub async fn server_metadata(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<impl IntoResponse> {
    let (cache_hits, cache_misses) = state.cache.stats();

    let metadata = ServerMetadata {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime_seconds(),
        provider: state.provider.identity(),
        indexed_images: state.index.len(),
        cache_hits,
        cache_misses,
    };

    Ok(Json(serde_json::to_value(metadata)?))
}
