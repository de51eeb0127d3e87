//! Resolution REST Service
//!
//! Exposes the engine over HTTP for request-time resolution.
//!
//! ## Endpoints
//!
//! - `POST /api/resolve` - Resolve an entry against the current snapshot
//! - `GET /api/snapshot` - Current snapshot stats
//! - `GET /health` - Detailed service health check
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{metrics_middleware, record_resolution_metrics};
pub use routes::create_router;
pub use state::ServiceState;
