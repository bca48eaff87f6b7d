//! Postback 接收服务入口

use std::sync::Arc;

use ingest_service::{routes, state::AppState};
use postback_shared::{config::AppConfig, observability, queue::RedisListQueue};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("ingest-service")?;
    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!("Starting ingest-service on {}", config.ingest_addr());

    let queue = match RedisListQueue::connect(&config.redis, &config.queue).await {
        Ok(queue) => queue,
        Err(e) => {
            error!(error = %e, url = %config.redis.url, "无法连接 Redis，服务退出");
            return Err(e.into());
        }
    };

    let app = routes::build_router(AppState::new(Arc::new(queue)));

    let listener = TcpListener::bind(config.ingest_addr()).await?;
    info!("ingest-service listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("ingest-service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("注册 Ctrl+C 处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("注册 SIGTERM 处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
