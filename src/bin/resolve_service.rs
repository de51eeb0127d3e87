//! Resolution Service Binary
//!
//! Runs the resolution engine as a REST API service:
//! - Structured JSON logging
//! - Request tracing with correlation IDs
//! - Graceful shutdown handling
//! - Health check endpoints
//!
//! ## Configuration
//!
//! Environment variables:
//! - `STATE_FILE`: Path to the JSON state document (required)
//! - `PORT`: Service port (default: 8002)
//! - `HOST`: Service host (default: 0.0.0.0)
//! - `REFRESH_SECONDS`: Background poll interval (default: 30)
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! STATE_FILE=state.json cargo run --bin resolve_service --features service
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use resolve_engine::service::{create_router, metrics_middleware, ServiceState};
use resolve_engine::{
    ConfigStore, Engine, FileSource, HintStore, ReadOptions, ResolverRegistry, TYPE_FIELD,
};

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "resolve_service=info,resolve_engine=info,tower_http=info".into());

    if log_format == "pretty" {
        // Pretty format for local development
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init();
    } else {
        // JSON format for production
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true),
            )
            .init();
    }
}

/// Request logging middleware that adds correlation ID and timing
async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let trace_id = request
        .headers()
        .get("X-Request-Id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let method = request.method().clone();
    let uri = request.uri().path().to_string();

    let span = info_span!(
        "request",
        trace_id = %trace_id,
        method = %method,
        path = %uri,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let response = next.run(request).instrument(span.clone()).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    span.record("status", status);
    span.record("latency_ms", latency.as_millis() as u64);

    info!(
        target: "resolve_service::access",
        trace_id = %trace_id,
        method = %method,
        path = %uri,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request completed"
    );

    response
}

/// Pass-through resolvers the standalone service ships with.
///
/// An embedding application replaces these with real handlers; the
/// standalone binary returns resolved props unchanged for every tag found
/// in the state document.
fn passthrough_registry(tags: impl IntoIterator<Item = String>) -> ResolverRegistry {
    let mut registry = ResolverRegistry::new();
    for tag in tags {
        registry.register_fn(tag, |props, _ctx| async move { Ok(props) });
    }
    registry
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let version = env!("CARGO_PKG_VERSION");
    info!(version = version, "Starting Resolution Service");

    // Load configuration from environment
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8002);

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

    let refresh_seconds: u64 = std::env::var("REFRESH_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);

    let state_file = match std::env::var("STATE_FILE") {
        Ok(path) if !path.is_empty() => path,
        _ => {
            tracing::error!("STATE_FILE not set");
            return Err("STATE_FILE environment variable is required".into());
        }
    };

    // First load with bounded retry
    let store = Arc::new(ConfigStore::new(Arc::new(FileSource::new(&state_file))));
    let load_start = Instant::now();
    let snapshot = match store.snapshot(ReadOptions::default()).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!(error = %e, state_file = %state_file, "Initial snapshot load failed");
            return Err(e.into());
        }
    };
    info!(
        latency_ms = load_start.elapsed().as_millis() as u64,
        entries = snapshot.state.len(),
        fingerprint = %snapshot.fingerprint(),
        "Initial snapshot loaded"
    );

    // Background refresh keeps serving the last good snapshot on failure
    store.spawn_refresh(Duration::from_secs(refresh_seconds));

    // Hints generated once from the initial snapshot
    let hints = HintStore::generate(&snapshot.state);
    info!(hinted_shapes = hints.len(), "Shape hints generated");

    // Register a pass-through handler per tag observed in the state
    let tags: std::collections::BTreeSet<String> = snapshot
        .state
        .values()
        .filter_map(|v| v.get(TYPE_FIELD))
        .filter_map(|t| t.as_str())
        .map(str::to_string)
        .collect();
    if tags.is_empty() {
        warn!("State document contains no tagged entries");
    }
    let engine = Engine::builder(passthrough_registry(tags)).hints(hints).build();

    let state = ServiceState::new(engine, store);

    // Build router with middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!(address = %addr, version = version, "Resolution Service listening");

    let listener = TcpListener::bind(addr).await?;

    // Graceful shutdown handling
    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        info!("Shutdown signal received, draining connections");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Resolution Service stopped");
    Ok(())
}
