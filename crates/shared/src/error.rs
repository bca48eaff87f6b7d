//! 统一错误处理模块
//!
//! 定义投递系统共享的错误类型，使用 thiserror 提供良好的错误信息。

use thiserror::Error;

/// 队列访问错误
#[derive(Debug, Error)]
pub enum PostbackError {
    #[error("Redis 错误: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("队列不可用: {0}")]
    QueueUnavailable(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, PostbackError>;

impl PostbackError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Redis(_) => "REDIS_ERROR",
            Self::QueueUnavailable(_) => "QUEUE_UNAVAILABLE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = PostbackError::QueueUnavailable("PING 返回异常: LOADING".to_string());
        assert_eq!(err.code(), "QUEUE_UNAVAILABLE");
        assert_eq!(err.to_string(), "队列不可用: PING 返回异常: LOADING");
    }

    #[test]
    fn test_redis_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset");
        let redis_err = redis::RedisError::from(io_err);
        let err: PostbackError = redis_err.into();
        assert_eq!(err.code(), "REDIS_ERROR");
    }
}
