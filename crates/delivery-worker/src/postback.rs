//! Postback 数据模型
//!
//! 队列中的每条记录是一个 JSON 对象：
//!
//! ```json
//! {
//!   "method": "GET",
//!   "url": "http://sample-domain-endpoint.com/data?key={key}&value={value}&foo={bar}",
//!   "data": { "key": "Azureus", "value": "Dendrobates" }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::DispatchError;

/// 一条待投递的 postback
///
/// `data` 使用 BTreeMap，POST 请求体按 key 排序输出，便于排查和比对。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Postback {
    /// 缺失或为 null 时视为空字符串，后续按不支持的方法处理
    #[serde(default, deserialize_with = "deserialize_method")]
    pub method: String,
    pub url: String,
    #[serde(default, deserialize_with = "deserialize_data")]
    pub data: BTreeMap<String, String>,
}

impl Postback {
    /// 从队列记录解析
    pub fn from_entry(entry: &str) -> Result<Self, DispatchError> {
        if entry.is_empty() {
            return Err(DispatchError::EmptyEntry);
        }
        serde_json::from_str(entry).map_err(|e| DispatchError::Malformed(e.to_string()))
    }

    /// 解析投递方法，大小写不敏感
    pub fn delivery_method(&self) -> Result<DeliveryMethod, DispatchError> {
        DeliveryMethod::parse(&self.method).ok_or_else(|| DispatchError::UnsupportedMethod {
            method: self.method.clone(),
        })
    }
}

/// 支持的投递方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryMethod {
    Get,
    Post,
}

impl DeliveryMethod {
    pub fn parse(method: &str) -> Option<Self> {
        if method.eq_ignore_ascii_case("GET") {
            Some(Self::Get)
        } else if method.eq_ignore_ascii_case("POST") {
            Some(Self::Post)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 反序列化 method 字段，null 与缺失一样视为空字符串
fn deserialize_method<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// 反序列化 data 字段
///
/// 字符串原样保留；数值、布尔等转为其 JSON 文本；null 视为空字符串。
/// 接收端写入的 data 可能来自弱类型的上游，这里不因类型不匹配而丢弃整条记录。
fn deserialize_data<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;

    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}
