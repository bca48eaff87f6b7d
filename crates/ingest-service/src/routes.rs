//! 路由配置模块

use axum::{
    Router, middleware,
    routing::{get, post},
};

use postback_shared::observability::middleware::http_tracing;

use crate::{handlers, state::AppState};

/// 构建接收服务的完整路由
///
/// `POST /` 与 `POST /ingest` 等价。
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(handlers::ingest))
        .route("/ingest", post(handlers::ingest))
        .route("/health", get(handlers::health))
        .layer(middleware::from_fn(http_tracing))
        .with_state(state)
}
