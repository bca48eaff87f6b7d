//! Postback 投递服务入口

use std::sync::Arc;

use delivery_worker::consumer::{ConsumerOptions, DeliveryConsumer};
use delivery_worker::dispatcher::Dispatcher;
use postback_shared::{config::AppConfig, observability, queue::RedisListQueue};
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("delivery-worker")?;

    // 日志文件打不开时直接退出，不在没有日志的情况下运行
    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!(
        environment = %config.environment,
        list = %config.queue.list_name,
        workers = config.delivery.workers,
        "Starting delivery-worker..."
    );

    let queue = match RedisListQueue::connect(&config.redis, &config.queue).await {
        Ok(queue) => queue,
        Err(e) => {
            error!(error = %e, url = %config.redis.url, "无法连接 Redis，服务退出");
            return Err(e.into());
        }
    };

    let dispatcher = Dispatcher::from_config(&config.delivery)?;
    let consumer = DeliveryConsumer::new(
        Arc::new(queue),
        Arc::new(dispatcher),
        ConsumerOptions::from_config(&config),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_handle = tokio::spawn(consumer.run(shutdown_rx));

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    let stats = consumer_handle.await?;
    info!(
        delivered = stats.delivered,
        failed = stats.failed,
        dropped = stats.dropped,
        "delivery-worker stopped"
    );
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
