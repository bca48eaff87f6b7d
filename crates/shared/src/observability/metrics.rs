//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册指标描述，会出现在 /metrics 端点的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "postback_deliveries_total",
        "Total number of postback deliveries that received an HTTP response"
    );
    metrics::describe_histogram!(
        "postback_delivery_duration_seconds",
        "Postback delivery round-trip duration in seconds"
    );
    metrics::describe_counter!(
        "postback_dropped_total",
        "Total number of postbacks dropped without a response"
    );
    metrics::describe_counter!(
        "queue_pop_errors_total",
        "Total number of failed queue pops"
    );
    metrics::describe_counter!(
        "postback_ingested_total",
        "Total number of postbacks appended to the queue"
    );
    metrics::describe_counter!(
        "http_requests_total",
        "Total number of HTTP requests handled by the ingest service"
    );
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 指标记录函数
// ============================================================================

/// 记录一次收到响应的投递（任意状态码）
#[inline]
pub fn record_delivery(method: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "postback_deliveries_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "postback_delivery_duration_seconds",
        "method" => method.to_string()
    )
    .record(duration_secs);
}

/// 记录被丢弃的 postback
///
/// reason: empty_entry / malformed / unsupported_method / transport
#[inline]
pub fn record_dropped(reason: &'static str) {
    metrics::counter!("postback_dropped_total", "reason" => reason).increment(1);
}

#[inline]
pub fn record_queue_error() {
    metrics::counter!("queue_pop_errors_total").increment(1);
}

#[inline]
pub fn record_ingested(count: u64) {
    metrics::counter!("postback_ingested_total").increment(count);
}

/// 记录 HTTP 请求（接收服务）
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_secs);
}
