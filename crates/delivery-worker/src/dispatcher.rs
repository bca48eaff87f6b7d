//! 单条记录的处理流程
//!
//! 解析 → 占位符替换 → 按方法选择投递策略 → 投递。
//! 任何一步失败都只影响当前记录：记录日志、计入丢弃指标，然后返回。

use tracing::{debug, error, trace, warn};

use postback_shared::config::DeliveryConfig;
use postback_shared::observability::metrics;

use crate::error::{DeliveryError, DispatchError};
use crate::postback::Postback;
use crate::resolver::PlaceholderResolver;
use crate::sender::{DeliveryOutcome, SenderRegistry, build_http_client};

/// 记录分发器
pub struct Dispatcher {
    resolver: PlaceholderResolver,
    senders: SenderRegistry,
}

impl Dispatcher {
    pub fn new(resolver: PlaceholderResolver, senders: SenderRegistry) -> Self {
        Self { resolver, senders }
    }

    /// 按配置创建：共享 HTTP 客户端 + GET/POST 策略
    pub fn from_config(config: &DeliveryConfig) -> Result<Self, DeliveryError> {
        let client = build_http_client(config)?;
        Ok(Self::new(
            PlaceholderResolver::new(config.unmatched_placeholder_value.as_str()),
            SenderRegistry::with_client(client),
        ))
    }

    /// 处理一条原始队列记录
    pub async fn process_entry(&self, raw: &[u8]) -> Result<DeliveryOutcome, DispatchError> {
        trace!(entry = %String::from_utf8_lossy(raw), "收到队列记录");

        let entry = std::str::from_utf8(raw)
            .map_err(|e| DispatchError::Malformed(format!("记录不是合法的 UTF-8: {e}")))?;
        let mut postback = Postback::from_entry(entry)?;
        trace!(postback = ?postback, "postback 已解析");

        self.resolver.resolve(&mut postback);
        trace!(url = %postback.url, "解析后的 URL");

        let method = postback.delivery_method()?;
        let sender = self
            .senders
            .get(method)
            .ok_or_else(|| DispatchError::UnsupportedMethod {
                method: postback.method.clone(),
            })?;

        Ok(sender.send(&postback).await?)
    }

    /// 处理一条记录，失败时记录日志和指标
    pub async fn handle_entry(&self, raw: &[u8]) -> Result<DeliveryOutcome, DispatchError> {
        let result = self.process_entry(raw).await;
        if let Err(err) = &result {
            report_failure(err, raw);
        }
        result
    }
}

fn report_failure(err: &DispatchError, raw: &[u8]) {
    match err {
        DispatchError::EmptyEntry => {
            warn!("收到空的队列记录，已丢弃");
        }
        DispatchError::Malformed(reason) => {
            warn!(
                reason = %reason,
                entry = %String::from_utf8_lossy(raw),
                "postback 格式错误，已丢弃"
            );
        }
        DispatchError::UnsupportedMethod { method } => {
            error!(method = %method, "不支持的投递方法，已丢弃");
        }
        // 发送失败时 sender 已记录过警告
        DispatchError::Delivery(e) => {
            debug!(error = %e, "投递失败，已丢弃");
        }
    }
    metrics::record_dropped(err.drop_reason());
}
