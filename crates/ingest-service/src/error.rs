//! 接收服务错误类型

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use postback_shared::error::PostbackError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("请求体不是合法的 JSON: {0}")]
    NotJson(String),

    #[error("endpoint.url 不是合法的 URL: {0:?}")]
    InvalidUrl(String),

    #[error("endpoint.method 只支持 GET 或 POST，收到: {0:?}")]
    UnsupportedMethod(String),

    #[error("data 格式错误: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Queue(#[from] PostbackError),
}

impl IngestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotJson(_)
            | Self::InvalidUrl(_)
            | Self::UnsupportedMethod(_)
            | Self::InvalidData(_) => StatusCode::BAD_REQUEST,
            Self::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotJson(_) => "NOT_JSON",
            Self::InvalidUrl(_) => "INVALID_URL",
            Self::UnsupportedMethod(_) => "UNSUPPORTED_METHOD",
            Self::InvalidData(_) => "INVALID_DATA",
            Self::Queue(e) => e.code(),
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 队列错误只返回通用提示，详细信息记录日志
        let message = match &self {
            Self::Queue(e) => {
                tracing::error!(error = %e, "写入队列失败");
                "队列暂不可用，请稍后重试".to_string()
            }
            other => {
                tracing::warn!(error = %other, "拒绝接收请求");
                other.to_string()
            }
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
