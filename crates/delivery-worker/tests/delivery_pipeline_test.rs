//! 投递流水线集成测试
//!
//! 队列 → 消费者 → 本地 webhook 接收端，覆盖 GET/POST 示例、
//! 非 2xx 响应、超时和不支持的方法。Redis 相关用例需要本地 Redis。

use std::sync::Arc;
use std::time::Duration;

use delivery_worker::consumer::{ConsumerOptions, ConsumerStats, DeliveryConsumer};
use delivery_worker::dispatcher::Dispatcher;
use postback_shared::config::{DeliveryConfig, QueueConfig};
use postback_shared::queue::{InMemoryQueue, PostbackQueue, RedisListQueue};
use postback_shared::retry::BackoffPolicy;
use postback_shared::test_utils::{
    RecordedRequest, ResponsePlan, TestDataGenerator, WebhookRecorder, test_redis_config,
};
use serde_json::json;
use tokio::sync::watch;

fn options() -> ConsumerOptions {
    ConsumerOptions {
        workers: 2,
        channel_capacity: 2,
        idle_backoff: Duration::from_millis(5),
        error_backoff: BackoffPolicy {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
        },
    }
}

/// 运行消费者直到接收端收到 expected 个请求（或超时），然后关闭
async fn run_until(
    queue: Arc<dyn PostbackQueue>,
    delivery: &DeliveryConfig,
    recorder: &WebhookRecorder,
    expected: usize,
) -> (Vec<RecordedRequest>, ConsumerStats) {
    let dispatcher = Arc::new(Dispatcher::from_config(delivery).unwrap());
    let consumer = DeliveryConsumer::new(queue, dispatcher, options());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(consumer.run(shutdown_rx));

    recorder
        .wait_for_requests(expected, Duration::from_secs(5))
        .await;
    shutdown_tx.send(true).unwrap();
    let stats = handle.await.unwrap();
    (recorder.requests(), stats)
}

#[tokio::test]
async fn test_sample_get_postback() {
    let recorder = WebhookRecorder::start().await;
    let queue = InMemoryQueue::new();
    queue
        .push(&[TestDataGenerator::sample_postback("GET", &recorder.base_url())])
        .await
        .unwrap();

    let (requests, stats) =
        run_until(Arc::new(queue), &DeliveryConfig::default(), &recorder, 1).await;

    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(
        requests[0].path_and_query,
        "/data?key=Azureus&value=Dendrobates&foo="
    );
    assert_eq!(stats.delivered, 1);
}

#[tokio::test]
async fn test_sample_post_postback() {
    let recorder = WebhookRecorder::start().await;
    let queue = InMemoryQueue::new();
    queue
        .push(&[TestDataGenerator::sample_postback("POST", &recorder.base_url())])
        .await
        .unwrap();

    let (requests, _) =
        run_until(Arc::new(queue), &DeliveryConfig::default(), &recorder, 1).await;

    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(
        requests[0].path_and_query,
        "/data?key=Azureus&value=Dendrobates&foo="
    );
    assert_eq!(requests[0].header("content-type"), Some("application/json"));
    assert_eq!(
        requests[0].json_body(),
        json!({"key": "Azureus", "value": "Dendrobates", "bar": ""})
    );
}

#[tokio::test]
async fn test_configured_placeholder_default() {
    let recorder = WebhookRecorder::start().await;
    let queue = InMemoryQueue::new();
    queue
        .push(&[TestDataGenerator::sample_postback("GET", &recorder.base_url())])
        .await
        .unwrap();

    let delivery = DeliveryConfig {
        unmatched_placeholder_value: "none".to_string(),
        ..DeliveryConfig::default()
    };
    let (requests, _) = run_until(Arc::new(queue), &delivery, &recorder, 1).await;

    assert_eq!(
        requests[0].path_and_query,
        "/data?key=Azureus&value=Dendrobates&foo=none"
    );
}

#[tokio::test]
async fn test_error_status_is_logged_not_retried() {
    let recorder = WebhookRecorder::start_with(ResponsePlan {
        status: 503,
        body: "unavailable".to_string(),
        ..ResponsePlan::default()
    })
    .await;
    let queue = InMemoryQueue::new();
    queue
        .push(&[TestDataGenerator::postback("GET", &recorder.url("/down"), &[])])
        .await
        .unwrap();

    let (requests, stats) =
        run_until(Arc::new(queue), &DeliveryConfig::default(), &recorder, 1).await;

    // 只尝试一次
    assert_eq!(requests.len(), 1);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn test_timeout_counts_as_failure_and_moves_on() {
    let recorder = WebhookRecorder::start_with(ResponsePlan {
        delay: Duration::from_secs(2),
        ..ResponsePlan::default()
    })
    .await;
    let queue = InMemoryQueue::new();
    queue
        .push(&[
            TestDataGenerator::postback("GET", &recorder.url("/slow/1"), &[]),
            TestDataGenerator::postback("GET", &recorder.url("/slow/2"), &[]),
        ])
        .await
        .unwrap();

    let delivery = DeliveryConfig {
        request_timeout_ms: 100,
        ..DeliveryConfig::default()
    };
    let (requests, stats) = run_until(Arc::new(queue.clone()), &delivery, &recorder, 2).await;

    assert_eq!(requests.len(), 2);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.delivered, 0);
    assert!(queue.is_empty(), "超时的记录不会重新入队");
}

#[tokio::test]
async fn test_unsupported_method_is_dropped() {
    let recorder = WebhookRecorder::start().await;
    let queue = InMemoryQueue::new();
    queue
        .push(&[
            TestDataGenerator::postback("PATCH", &recorder.url("/patch"), &[]),
            TestDataGenerator::postback("get", &recorder.url("/after"), &[]),
        ])
        .await
        .unwrap();

    let (requests, stats) =
        run_until(Arc::new(queue), &DeliveryConfig::default(), &recorder, 1).await;

    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path_and_query, "/after");
    assert_eq!(stats.dropped, 1);
}

#[tokio::test]
#[ignore = "需要 Redis"]
async fn test_redis_backed_pipeline() {
    let recorder = WebhookRecorder::start().await;
    let list_name = format!(
        "test:pipeline:{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    );
    let queue = RedisListQueue::connect(
        &test_redis_config(),
        &QueueConfig {
            list_name,
            ..QueueConfig::default()
        },
    )
    .await
    .expect("连接 Redis 失败");

    queue
        .push(&[
            TestDataGenerator::sample_postback("GET", &recorder.base_url()),
            TestDataGenerator::sample_postback("POST", &recorder.base_url()),
        ])
        .await
        .unwrap();

    let (requests, stats) = run_until(
        Arc::new(queue.clone()),
        &DeliveryConfig::default(),
        &recorder,
        2,
    )
    .await;

    assert_eq!(requests.len(), 2);
    assert_eq!(stats.delivered, 2);
    assert!(queue.pop().await.unwrap().is_none());
}
