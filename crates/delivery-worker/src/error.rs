//! 投递服务错误类型
//!
//! 区分"记录本身有问题"（解析失败、方法不支持）与"投递过程失败"（网络、超时），
//! 两类错误都只记录日志并丢弃该条 postback，不会重新入队。

use thiserror::Error;

/// 单次 HTTP 投递失败
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("投递超时: url={url}")]
    Timeout { url: String },

    #[error("投递失败: url={url}, 原因={reason}")]
    Transport { url: String, reason: String },

    #[error("请求体序列化失败: {0}")]
    Body(#[from] serde_json::Error),

    #[error("HTTP 客户端初始化失败: {0}")]
    Client(String),
}

impl DeliveryError {
    /// 从 reqwest 错误转换，超时单独归类
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// 处理一条队列记录时的错误
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("收到空的队列记录")]
    EmptyEntry,

    #[error("postback 反序列化失败: {0}")]
    Malformed(String),

    #[error("不支持的投递方法: {method:?}")]
    UnsupportedMethod { method: String },

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl DispatchError {
    /// 指标中使用的丢弃原因
    pub fn drop_reason(&self) -> &'static str {
        match self {
            Self::EmptyEntry => "empty_entry",
            Self::Malformed(_) => "malformed",
            Self::UnsupportedMethod { .. } => "unsupported_method",
            Self::Delivery(_) => "transport",
        }
    }
}
