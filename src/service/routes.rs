//! Axum routes for the resolution service.

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::audience::{select, RequestProfile};
use crate::store::ReadOptions;
use crate::types::{ResolveError, SnapshotStats};
use crate::ENGINE_SCHEMA_VERSION;

use super::state::ServiceState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to resolve an entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    /// The store id of the entry to resolve.
    pub entry: String,
    /// Request profile for audience selection.
    #[serde(default)]
    pub profile: RequestProfile,
    /// Bypass the cached snapshot for this request.
    #[serde(default)]
    pub fresh: bool,
}

/// Response containing a resolved value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveResponse {
    /// The resolved value (or short-circuit payload).
    pub value: Value,
    /// True if a resolver short-circuited the resolution.
    pub short_circuit: bool,
}

/// Snapshot stats response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    /// Current snapshot stats.
    pub snapshot: SnapshotStats,
    /// Engine schema version.
    pub schema_version: String,
}

/// Service health response (detailed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" once a snapshot has loaded, "degraded" before.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Engine schema version.
    pub schema_version: String,
    /// Number of configured audiences.
    pub audience_count: usize,
    /// Stats of the current snapshot, if one has loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotStats>,
}

/// Simple liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    /// Always "alive".
    pub status: String,
}

/// Readiness response with dependency status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// True once a snapshot is available to serve from.
    pub ready: bool,
    /// Failure detail when not ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Structured error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
    /// Additional error details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response with code and message.
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        tracing::warn!(
            code = %self.code,
            error = %self.error,
            "Request error"
        );
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

fn resolve_error_response(err: ResolveError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match &err {
        ResolveError::MissingReference { .. } => (StatusCode::NOT_FOUND, "MISSING_REFERENCE"),
        ResolveError::UnregisteredType { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "UNREGISTERED_TYPE")
        }
        ResolveError::MalformedType { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "MALFORMED_TYPE")
        }
        ResolveError::CycleDetected { .. } | ResolveError::DepthExceeded { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "GRAPH_BOUND_EXCEEDED")
        }
        ResolveError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE"),
        ResolveError::Fault { .. } | ResolveError::ShortCircuit(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "RESOLVER_FAULT")
        }
    };
    (status, Json(ErrorResponse::new(code, err.to_string())))
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Resolve an entry against the current snapshot.
async fn resolve_handler(
    State(state): State<Arc<ServiceState>>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, (StatusCode, Json<ErrorResponse>)> {
    let options = if request.fresh {
        ReadOptions::fresh()
    } else {
        ReadOptions::default()
    };

    let snapshot = state.store.snapshot(options).await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("STORE_UNAVAILABLE", e.to_string())),
        )
    })?;

    let selection = select(&state.audiences, &request.profile);
    let ctx = state
        .engine
        .context_with_overrides(snapshot, selection.overrides);

    let start = std::time::Instant::now();
    let resolved = state
        .engine
        .resolve_entry(&request.entry, &ctx)
        .await
        .map_err(resolve_error_response)?;
    let latency_ms = start.elapsed().as_millis() as u64;

    let short_circuit = resolved.is_short_circuit();
    super::middleware::record_resolution_metrics(&request.entry, short_circuit, latency_ms);

    Ok(Json(ResolveResponse {
        value: resolved.into_value(),
        short_circuit,
    }))
}

/// Current snapshot stats.
async fn snapshot_handler(
    State(state): State<Arc<ServiceState>>,
) -> Result<Json<SnapshotResponse>, (StatusCode, Json<ErrorResponse>)> {
    let snapshot = state
        .store
        .snapshot(ReadOptions::default())
        .await
        .map_err(|e| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new("STORE_UNAVAILABLE", e.to_string())),
            )
        })?;

    Ok(Json(SnapshotResponse {
        snapshot: snapshot.stats(),
        schema_version: ENGINE_SCHEMA_VERSION.to_string(),
    }))
}

/// Health check endpoint (detailed).
async fn health_handler(State(state): State<Arc<ServiceState>>) -> Json<HealthResponse> {
    let snapshot = state.store.current();
    Json(HealthResponse {
        status: if snapshot.is_some() {
            "healthy"
        } else {
            "degraded"
        }
        .to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        schema_version: ENGINE_SCHEMA_VERSION.to_string(),
        audience_count: state.audiences.len(),
        snapshot: snapshot.map(|s| s.stats()),
    })
}

/// Liveness probe endpoint. Does NOT check dependencies.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Ready once a snapshot is available to serve from; 503 otherwise.
async fn readiness_handler(
    State(state): State<Arc<ServiceState>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    if state.store.current().is_some() {
        Ok(Json(ReadinessResponse {
            ready: true,
            details: None,
        }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                details: Some("No snapshot loaded yet".to_string()),
            }),
        ))
    }
}

/// Build the service router.
pub fn create_router(state: ServiceState) -> Router {
    let state = Arc::new(state);

    Router::new()
        // Resolution
        .route("/api/resolve", post(resolve_handler))
        // Snapshot diagnostics
        .route("/api/snapshot", get(snapshot_handler))
        // Health checks
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .with_state(state)
}
