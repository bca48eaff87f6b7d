//! 投递策略
//!
//! 通过 `PostbackSender` trait 抽象投递行为，GET 与 POST 各自实现。
//! 两种策略共用同一个 reqwest Client（连接池与超时配置在启动时确定），
//! 每次投递只尝试一次：网络错误记录警告后返回，不重试也不重新入队。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};
use tracing::{info, trace, warn};

use postback_shared::config::DeliveryConfig;
use postback_shared::observability::metrics;

use crate::error::DeliveryError;
use crate::postback::{DeliveryMethod, Postback};

/// 投递结果
///
/// 只要收到 HTTP 响应即视为已投递，非 2xx 状态码同样记录在这里，不单独处理。
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub method: DeliveryMethod,
    pub url: String,
    pub status: u16,
    pub body: String,
    pub elapsed: Duration,
    pub delivered_at: DateTime<Utc>,
}

/// 投递策略 trait
#[async_trait]
pub trait PostbackSender: Send + Sync {
    /// 投递一条已完成占位符替换的 postback
    async fn send(&self, postback: &Postback) -> Result<DeliveryOutcome, DeliveryError>;

    /// 该策略对应的方法
    fn method(&self) -> DeliveryMethod;
}

/// 按配置构建共享的 HTTP 客户端
///
/// 超时覆盖整个请求（连接、发送、读取响应），慢端点不会无限占用 worker。
pub fn build_http_client(config: &DeliveryConfig) -> Result<Client, DeliveryError> {
    Client::builder()
        .timeout(config.request_timeout())
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(|e| DeliveryError::Client(e.to_string()))
}

// ---------------------------------------------------------------------------
// GET 策略
// ---------------------------------------------------------------------------

/// GET 投递：请求解析后的 URL，无请求体，无自定义请求头
pub struct GetSender {
    client: Client,
}

impl GetSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PostbackSender for GetSender {
    async fn send(&self, postback: &Postback) -> Result<DeliveryOutcome, DeliveryError> {
        let request = self.client.get(&postback.url);
        execute(DeliveryMethod::Get, &postback.url, request).await
    }

    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Get
    }
}

// ---------------------------------------------------------------------------
// POST 策略
// ---------------------------------------------------------------------------

/// POST 投递：data（含默认值补齐的 key）序列化为 JSON 对象作为请求体
pub struct PostSender {
    client: Client,
}

impl PostSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PostbackSender for PostSender {
    async fn send(&self, postback: &Postback) -> Result<DeliveryOutcome, DeliveryError> {
        let body = serde_json::to_vec(&postback.data)?;
        trace!(body = %String::from_utf8_lossy(&body), "POST 请求体");

        let request = self
            .client
            .post(&postback.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        execute(DeliveryMethod::Post, &postback.url, request).await
    }

    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Post
    }
}

/// 发送请求并记录结果
///
/// 开始投递、收到响应（状态码 + 完整响应体）、网络失败各记录一条日志。
async fn execute(
    method: DeliveryMethod,
    url: &str,
    request: RequestBuilder,
) -> Result<DeliveryOutcome, DeliveryError> {
    info!(url = %url, method = %method, "开始投递");

    let delivered_at = Utc::now();
    let started = Instant::now();

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            let err = DeliveryError::from_reqwest(url, e);
            warn!(url = %url, method = %method, error = %err, "投递请求发送失败");
            return Err(err);
        }
    };

    let status = response.status().as_u16();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            warn!(url = %url, status, error = %e, "读取响应体失败");
            String::new()
        }
    };
    let elapsed = started.elapsed();

    info!(
        url = %url,
        method = %method,
        status,
        elapsed_ms = elapsed.as_millis() as u64,
        body = %body,
        "收到投递响应"
    );
    metrics::record_delivery(method.as_str(), status, elapsed.as_secs_f64());

    Ok(DeliveryOutcome {
        method,
        url: url.to_string(),
        status,
        body,
        elapsed,
        delivered_at,
    })
}

// ---------------------------------------------------------------------------
// 策略注册表
// ---------------------------------------------------------------------------

/// 按方法查找投递策略
#[derive(Clone, Default)]
pub struct SenderRegistry {
    senders: HashMap<DeliveryMethod, Arc<dyn PostbackSender>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册 GET 与 POST 两种策略，共用同一个客户端
    pub fn with_client(client: Client) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GetSender::new(client.clone())));
        registry.register(Arc::new(PostSender::new(client)));
        registry
    }

    /// 注册策略，同一方法后注册的覆盖先注册的
    pub fn register(&mut self, sender: Arc<dyn PostbackSender>) {
        self.senders.insert(sender.method(), sender);
    }

    pub fn get(&self, method: DeliveryMethod) -> Option<&Arc<dyn PostbackSender>> {
        self.senders.get(&method)
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
