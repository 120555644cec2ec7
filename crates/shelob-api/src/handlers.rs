//! Route handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use tracing::debug;

use shelob_metrics::{REQUEST_DURATION_HELP, REQUEST_DURATION_METRIC, render_prometheus};

use crate::ApiState;

/// Content type of the Prometheus text exposition format.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// GET /
pub async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// GET /metrics
///
/// Always answers with the best state accumulated so far.
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.sink.snapshot().await;
    debug!(series = snapshot.series.len(), "rendering metrics");
    let body = render_prometheus(REQUEST_DURATION_METRIC, REQUEST_DURATION_HELP, &snapshot);
    (StatusCode::OK, [(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use shelob_metrics::MetricsSink;
    use tower::ServiceExt;

    use super::*;
    use crate::build_router;

    async fn get_body(router: axum::Router, uri: &str) -> (StatusCode, String) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = router.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn liveness_returns_ok() {
        let router = build_router(Arc::new(MetricsSink::new()));
        let (status, body) = get_body(router, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn metrics_sets_prometheus_content_type() {
        let router = build_router(Arc::new(MetricsSink::new()));
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(CONTENT_TYPE).unwrap(),
            PROMETHEUS_CONTENT_TYPE
        );
    }

    #[tokio::test]
    async fn metrics_renders_observed_series() {
        let sink = Arc::new(MetricsSink::new());
        sink.observe("10.0.0.1", "10.0.0.2", 12.0).await;
        let router = build_router(sink);

        let (status, body) = get_body(router, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(
            "test_request_druation_ms_bucket{source=\"10.0.0.1\",destination=\"10.0.0.2\",le=\"12\"} 1"
        ));
        assert!(body.contains(
            "test_request_druation_ms_bucket{source=\"10.0.0.1\",destination=\"10.0.0.2\",le=\"11\"} 0"
        ));
        assert!(body.contains(
            "test_request_druation_ms_count{source=\"10.0.0.1\",destination=\"10.0.0.2\"} 1"
        ));
    }
}
