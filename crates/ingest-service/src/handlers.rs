//! 接收端处理器
//!
//! 请求体格式：
//!
//! ```json
//! {
//!   "endpoint": { "method": "GET", "url": "http://sample-domain-endpoint.com/data?key={key}" },
//!   "data": [ { "key": "Azureus" }, { "key": "Phyllobates" } ]
//! }
//! ```
//!
//! data 中每个对象生成一条 `{method, url, data}` 记录，按顺序追加到队列。

use axum::{Json, body::Bytes, extract::State};
use reqwest::Url;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{info, trace};

use postback_shared::observability::metrics;

use crate::error::{IngestError, Result};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub success: bool,
    /// 本次追加的记录数
    pub queued: usize,
}

/// 接收请求并写入队列
pub async fn ingest(State(state): State<AppState>, body: Bytes) -> Result<Json<IngestResponse>> {
    trace!(body = %String::from_utf8_lossy(&body), "收到接收请求");

    let entries = build_entries(&body)?;
    if !entries.is_empty() {
        let queue_length = state.queue.push(&entries).await?;
        info!(queued = entries.len(), queue_length, "postback 已入队");
    }
    metrics::record_ingested(entries.len() as u64);

    Ok(Json(IngestResponse {
        success: true,
        queued: entries.len(),
    }))
}

/// 存活探针
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "ingest-service"
    }))
}

/// 校验请求体并生成队列记录
///
/// 校验顺序：JSON 格式 → endpoint.url → endpoint.method → data。
/// 任一项不通过整个请求被拒绝，不会写入部分记录。
pub fn build_entries(body: &[u8]) -> Result<Vec<String>> {
    let request: Value =
        serde_json::from_slice(body).map_err(|e| IngestError::NotJson(e.to_string()))?;
    let Value::Object(mut request) = request else {
        return Err(IngestError::NotJson("顶层必须是 JSON 对象".to_string()));
    };

    let endpoint = request.remove("endpoint").unwrap_or(Value::Null);

    let url = endpoint
        .get("url")
        .and_then(Value::as_str)
        .unwrap_or_default();
    validate_url(url)?;

    let method = endpoint
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !method.eq_ignore_ascii_case("GET") && !method.eq_ignore_ascii_case("POST") {
        return Err(IngestError::UnsupportedMethod(method.to_string()));
    }

    let items = match request.remove("data") {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(IngestError::InvalidData("data 必须是数组".to_string())),
        None => return Err(IngestError::InvalidData("缺少 data 字段".to_string())),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(data) => Ok(postback_entry(method, url, data)),
            _ => Err(IngestError::InvalidData(format!(
                "data[{index}] 必须是 JSON 对象"
            ))),
        })
        .collect()
}

/// 只接受带主机名的 http/https 绝对地址，`{key}` 占位符允许出现在路径和查询串中
fn validate_url(url: &str) -> Result<()> {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => Ok(()),
        _ => Err(IngestError::InvalidUrl(url.to_string())),
    }
}

/// 写入队列的记录保留调用方原样提供的 method 和 url
fn postback_entry(method: &str, url: &str, data: Map<String, Value>) -> String {
    json!({
        "method": method,
        "url": url,
        "data": data,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(entry: &str) -> Value {
        serde_json::from_str(entry).unwrap()
    }

    #[test]
    fn test_one_entry_per_data_item_in_order() {
        let body = json!({
            "endpoint": {
                "method": "GET",
                "url": "http://sample-domain-endpoint.com/data?key={key}&value={value}&foo={bar}"
            },
            "data": [
                { "key": "Azureus", "value": "Dendrobates" },
                { "key": "Phyllobates", "value": "Terribilis" }
            ]
        });

        let entries = build_entries(body.to_string().as_bytes()).unwrap();

        assert_eq!(entries.len(), 2);
        let first = parse(&entries[0]);
        assert_eq!(first["method"], "GET");
        assert_eq!(
            first["url"],
            "http://sample-domain-endpoint.com/data?key={key}&value={value}&foo={bar}"
        );
        assert_eq!(first["data"], json!({ "key": "Azureus", "value": "Dendrobates" }));
        assert_eq!(parse(&entries[1])["data"]["key"], "Phyllobates");
    }

    #[test]
    fn test_method_is_kept_as_given() {
        let body = json!({
            "endpoint": { "method": "post", "url": "https://e.com/hook" },
            "data": [ {} ]
        });

        let entries = build_entries(body.to_string().as_bytes()).unwrap();

        assert_eq!(parse(&entries[0])["method"], "post");
    }

    #[test]
    fn test_empty_data_array_yields_no_entries() {
        let body = json!({
            "endpoint": { "method": "GET", "url": "http://e.com" },
            "data": []
        });

        assert!(build_entries(body.to_string().as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_non_json() {
        for body in ["", "not json", "[1, 2]", "42"] {
            assert!(
                matches!(build_entries(body.as_bytes()), Err(IngestError::NotJson(_))),
                "body={body:?}"
            );
        }
    }

    #[test]
    fn test_rejects_invalid_url() {
        for url in [
            json!("not a url"),
            json!("/relative/path"),
            json!("ftp://e.com/file"),
            json!(""),
            json!(42),
            Value::Null,
        ] {
            let body = json!({
                "endpoint": { "method": "GET", "url": url },
                "data": [ {} ]
            });
            assert!(
                matches!(
                    build_entries(body.to_string().as_bytes()),
                    Err(IngestError::InvalidUrl(_))
                ),
                "url={url}"
            );
        }
    }

    #[test]
    fn test_url_checked_before_method() {
        let body = json!({
            "endpoint": { "method": "PUT", "url": "nope" },
            "data": [ {} ]
        });

        assert!(matches!(
            build_entries(body.to_string().as_bytes()),
            Err(IngestError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_rejects_unsupported_method() {
        for method in [json!("PUT"), json!(""), json!("GETS"), Value::Null] {
            let body = json!({
                "endpoint": { "method": method, "url": "http://e.com" },
                "data": [ {} ]
            });
            assert!(
                matches!(
                    build_entries(body.to_string().as_bytes()),
                    Err(IngestError::UnsupportedMethod(_))
                ),
                "method={method}"
            );
        }
    }

    #[test]
    fn test_rejects_malformed_data() {
        let endpoint = json!({ "method": "GET", "url": "http://e.com" });

        for body in [
            json!({ "endpoint": endpoint }),
            json!({ "endpoint": endpoint, "data": { "key": "a" } }),
            json!({ "endpoint": endpoint, "data": [ { "key": "a" }, "b" ] }),
        ] {
            assert!(
                matches!(
                    build_entries(body.to_string().as_bytes()),
                    Err(IngestError::InvalidData(_))
                ),
                "body={body}"
            );
        }
    }
}
