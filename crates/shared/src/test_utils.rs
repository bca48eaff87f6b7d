//! 测试工具模块
//!
//! 提供集成测试所需的辅助函数、测试数据生成器和本地 webhook 接收端。
//! 用于简化测试代码编写，提高测试的可重复性和可维护性。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use crate::config::RedisConfig;

// ==================== 测试配置辅助 ====================

/// 创建测试用 Redis 配置
pub fn test_redis_config() -> RedisConfig {
    RedisConfig {
        url: std::env::var("TEST_REDIS_URL")
            .unwrap_or_else(|_| "redis://localhost:6379/1".to_string()),
    }
}

// ==================== 测试数据生成器 ====================

/// 测试数据生成器
pub struct TestDataGenerator;

impl TestDataGenerator {
    /// 生成一条队列中的 postback 记录
    pub fn postback(method: &str, url: &str, data: &[(&str, &str)]) -> String {
        let data: serde_json::Map<String, Value> = data
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();

        json!({
            "method": method,
            "url": url,
            "data": data,
        })
        .to_string()
    }

    /// 经典示例：key/value 两个字段，bar 在 data 中缺失
    pub fn sample_postback(method: &str, base_url: &str) -> String {
        Self::postback(
            method,
            &format!("{base_url}/data?key={{key}}&value={{value}}&foo={{bar}}"),
            &[("key", "Azureus"), ("value", "Dendrobates")],
        )
    }

    /// 生成接收服务的请求体
    pub fn ingest_request(method: &str, url: &str, data: Value) -> Value {
        json!({
            "endpoint": {
                "method": method,
                "url": url,
            },
            "data": data,
        })
    }
}

// ==================== 本地 webhook 接收端 ====================

/// 接收端记录下的一次请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// 路径加查询串，如 `/data?key=Azureus`
    pub path_and_query: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn json_body(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

/// 接收端的响应方式
#[derive(Debug, Clone)]
pub struct ResponsePlan {
    pub status: u16,
    pub body: String,
    /// 响应前的等待时间，用于模拟慢端点
    pub delay: Duration,
}

impl Default for ResponsePlan {
    fn default() -> Self {
        Self {
            status: 200,
            body: "ok".to_string(),
            delay: Duration::ZERO,
        }
    }
}

#[derive(Clone)]
struct RecorderState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    plan: ResponsePlan,
}

/// 绑定在 127.0.0.1 随机端口上的 HTTP 服务器，记录收到的每个请求
pub struct WebhookRecorder {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    server: tokio::task::JoinHandle<()>,
}

impl WebhookRecorder {
    pub async fn start() -> Self {
        Self::start_with(ResponsePlan::default()).await
    }

    pub async fn start_with(plan: ResponsePlan) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = RecorderState {
            requests: requests.clone(),
            plan,
        };

        let app = Router::new().fallback(record_request).with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("绑定测试端口失败");
        let addr = listener.local_addr().expect("获取测试端口失败");

        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            requests,
            server,
        }
    }

    /// 拼接指向本接收端的完整 URL
    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// 等待至少收到 n 个请求，超时后返回当前已收到的请求
    pub async fn wait_for_requests(&self, n: usize, timeout: Duration) -> Vec<RecordedRequest> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let requests = self.requests();
            if requests.len() >= n || tokio::time::Instant::now() >= deadline {
                return requests;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for WebhookRecorder {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn record_request(
    State(state): State<RecorderState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    state.requests.lock().push(RecordedRequest {
        method: method.to_string(),
        path_and_query: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string()),
        headers,
        body: body.to_vec(),
    });

    if !state.plan.delay.is_zero() {
        tokio::time::sleep(state.plan.delay).await;
    }

    let status = StatusCode::from_u16(state.plan.status).unwrap_or(StatusCode::OK);
    (status, state.plan.body.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postback_generation() {
        let entry = TestDataGenerator::postback("POST", "http://e.com/{a}", &[("a", "1")]);
        let value: Value = serde_json::from_str(&entry).unwrap();

        assert_eq!(value["method"], "POST");
        assert_eq!(value["url"], "http://e.com/{a}");
        assert_eq!(value["data"]["a"], "1");
    }

    #[test]
    fn test_sample_postback_has_unmatched_placeholder() {
        let entry = TestDataGenerator::sample_postback("GET", "http://e.com");
        let value: Value = serde_json::from_str(&entry).unwrap();

        assert_eq!(
            value["url"],
            "http://e.com/data?key={key}&value={value}&foo={bar}"
        );
        assert!(value["data"].get("bar").is_none());
    }

    #[test]
    fn test_ingest_request_generation() {
        let body = TestDataGenerator::ingest_request("GET", "http://e.com", json!([{"k": "v"}]));
        assert_eq!(body["endpoint"]["method"], "GET");
        assert_eq!(body["data"][0]["k"], "v");
    }
}
