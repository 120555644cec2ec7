//! shelob-api — the HTTP front of a shelob instance.
//!
//! Every instance is both a prober and a probe target, so the same router
//! answers peer probes and serves the scrape endpoint.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Probe target and liveness check (`200 ok`) |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use shelob_metrics::MetricsSink;

/// Shared state for handlers.
#[derive(Clone)]
pub struct ApiState {
    pub sink: Arc<MetricsSink>,
}

/// Build the complete router (probe target + metrics).
pub fn build_router(sink: Arc<MetricsSink>) -> Router {
    let state = ApiState { sink };

    Router::new()
        .route("/", get(handlers::liveness))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
}
