//! 队列消费者
//!
//! 一个轮询任务从队列逐条弹出记录，经有界通道交给固定数量的 worker 并发投递。
//! 通道满时轮询任务等待，未取出的记录留在队列中，进程内积压有上限。
//!
//! 等待队列返回时同样响应关闭信号，此时被取消的那次读取最多丢失一条记录。
//! 队列为空时按 `idle_backoff` 休眠且不输出日志；
//! 队列读取失败时记录警告，并按指数退避等待后重试，成功一次即重置。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use postback_shared::config::AppConfig;
use postback_shared::observability::metrics;
use postback_shared::queue::PostbackQueue;
use postback_shared::retry::{Backoff, BackoffPolicy};

use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;

/// 消费者运行参数
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub workers: usize,
    pub channel_capacity: usize,
    pub idle_backoff: Duration,
    pub error_backoff: BackoffPolicy,
}

impl ConsumerOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            workers: config.delivery.workers.max(1),
            channel_capacity: config.delivery.channel_capacity.max(1),
            idle_backoff: config.queue.idle_backoff(),
            error_backoff: BackoffPolicy::from_queue_config(&config.queue),
        }
    }
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// 运行期间的计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// 从队列取出的记录数
    pub popped: u64,
    /// 收到 HTTP 响应的记录数（不论状态码）
    pub delivered: u64,
    /// 网络错误或超时
    pub failed: u64,
    /// 空记录、格式错误、不支持的方法
    pub dropped: u64,
    pub queue_errors: u64,
}

#[derive(Default)]
struct StatsCounters {
    popped: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    queue_errors: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> ConsumerStats {
        ConsumerStats {
            popped: self.popped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            queue_errors: self.queue_errors.load(Ordering::Relaxed),
        }
    }
}

/// 投递消费者
pub struct DeliveryConsumer {
    queue: Arc<dyn PostbackQueue>,
    dispatcher: Arc<Dispatcher>,
    options: ConsumerOptions,
}

impl DeliveryConsumer {
    pub fn new(
        queue: Arc<dyn PostbackQueue>,
        dispatcher: Arc<Dispatcher>,
        options: ConsumerOptions,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            options,
        }
    }

    /// 运行直到收到关闭信号
    ///
    /// 收到信号后停止从队列取数，已取出的记录全部投递完成后返回。
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> ConsumerStats {
        let (tx, rx) = mpsc::channel::<Vec<u8>>(self.options.channel_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let stats = Arc::new(StatsCounters::default());

        info!(
            workers = self.options.workers,
            channel_capacity = self.options.channel_capacity,
            "投递消费者已启动"
        );

        let workers: Vec<JoinHandle<()>> = (0..self.options.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    rx.clone(),
                    self.dispatcher.clone(),
                    stats.clone(),
                ))
            })
            .collect();

        poll_loop(
            self.queue.as_ref(),
            tx,
            shutdown,
            self.options.idle_backoff,
            Backoff::new(self.options.error_backoff.clone()),
            &stats,
        )
        .await;

        // tx 已在 poll_loop 结束时释放，worker 处理完通道中剩余的记录后退出
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "worker 异常退出");
            }
        }

        let stats = stats.snapshot();
        info!(
            popped = stats.popped,
            delivered = stats.delivered,
            failed = stats.failed,
            dropped = stats.dropped,
            queue_errors = stats.queue_errors,
            "投递消费者已停止"
        );
        stats
    }
}

/// 轮询队列，把记录送入通道
async fn poll_loop(
    queue: &dyn PostbackQueue,
    tx: mpsc::Sender<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
    idle_backoff: Duration,
    mut backoff: Backoff,
    stats: &StatsCounters,
) {
    loop {
        if *shutdown.borrow() {
            info!("收到关闭信号，停止从队列取数");
            break;
        }

        let popped = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => {
                info!("收到关闭信号，停止从队列取数");
                break;
            }
            popped = queue.pop() => popped,
        };

        let delay = match popped {
            Ok(Some(entry)) => {
                backoff.on_success();
                stats.popped.fetch_add(1, Ordering::Relaxed);
                // 已取出的记录不丢弃：通道满时在此等待 worker 腾出位置
                if tx.send(entry).await.is_err() {
                    error!("所有 worker 已退出，停止轮询");
                    break;
                }
                continue;
            }
            Ok(None) => {
                backoff.on_success();
                idle_backoff
            }
            Err(e) => {
                let delay = backoff.on_failure();
                stats.queue_errors.fetch_add(1, Ordering::Relaxed);
                metrics::record_queue_error();
                warn!(
                    error = %e,
                    consecutive_failures = backoff.consecutive_failures(),
                    retry_in_ms = delay.as_millis() as u64,
                    "读取队列失败，稍后重试"
                );
                delay
            }
        };

        let stop = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => true,
            _ = tokio::time::sleep(delay) => false,
        };
        if stop {
            info!("收到关闭信号，停止从队列取数");
            break;
        }
    }
}

/// 等待关闭信号，发送端被丢弃同样视为关闭
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<StatsCounters>,
) {
    loop {
        let entry = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(entry) = entry else {
            debug!(worker_id, "通道已关闭，worker 退出");
            break;
        };

        let span = info_span!("postback", worker_id);
        match dispatcher.handle_entry(&entry).instrument(span).await {
            Ok(_) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(DispatchError::Delivery(_)) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
