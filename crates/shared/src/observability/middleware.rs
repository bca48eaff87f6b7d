//! HTTP 中间件
//!
//! 为接收服务的每个请求创建追踪 span 并记录指标。

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::{Instrument, debug, info_span};

use super::metrics;

/// HTTP 请求追踪和指标中间件
///
/// # Example
///
/// ```ignore
/// use axum::{Router, middleware, routing::post};
/// use postback_shared::observability::middleware::http_tracing;
///
/// let app = Router::new()
///     .route("/ingest", post(ingest))
///     .layer(middleware::from_fn(http_tracing));
/// ```
pub async fn http_tracing(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let span = info_span!(
        "http_request",
        method = %method,
        path = %path,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let start = Instant::now();
    let response = next.run(request).instrument(span.clone()).await;
    let latency = start.elapsed();
    let status = response.status().as_u16();

    span.record("status", status);
    span.record("latency_ms", latency.as_millis() as u64);
    span.in_scope(|| debug!(status, "请求处理完成"));

    metrics::record_http_request(&method, &path, status, latency.as_secs_f64());

    response
}
