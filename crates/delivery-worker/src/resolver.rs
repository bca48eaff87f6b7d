//! URL 占位符解析
//!
//! 将 postback URL 中的 `{key}` 替换为 data 中对应的值：
//!
//! ```ignore
//! let resolver = PlaceholderResolver::new("");
//! // url:  http://e.com/data?key={key}&value={value}&foo={bar}
//! // data: { "key": "Azureus", "value": "Dendrobates" }
//! resolver.resolve(&mut postback);
//! // url:  http://e.com/data?key=Azureus&value=Dendrobates&foo=
//! // data: { "bar": "", "key": "Azureus", "value": "Dendrobates" }
//! ```
//!
//! data 中不存在的 key 使用配置的默认值替换，并把默认值写回 data，
//! 使 POST 请求体与 URL 中实际使用的值保持一致。

use regex::{Captures, Regex};
use tracing::trace;

use crate::postback::Postback;

/// 占位符解析器
pub struct PlaceholderResolver {
    /// 匹配 `{...}`，非贪婪，遇到第一个 `}` 即结束
    placeholder_regex: Regex,
    /// data 中缺失的 key 使用的替换值
    unmatched_value: String,
}

/// 一次解析的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// 替换的占位符总数
    pub substituted: usize,
    /// 使用默认值补齐的 key（按出现顺序，不重复）
    pub defaulted: Vec<String>,
}

impl Default for PlaceholderResolver {
    fn default() -> Self {
        Self::new("")
    }
}

impl PlaceholderResolver {
    pub fn new(unmatched_value: impl Into<String>) -> Self {
        Self {
            placeholder_regex: Regex::new(r"\{(.*?)\}").expect("占位符正则无效"),
            unmatched_value: unmatched_value.into(),
        }
    }

    /// 原地替换 postback 的 URL 占位符
    ///
    /// 只对原始模板扫描一遍：替换进去的值即使包含 `{...}` 也不会被再次展开。
    /// data 中已有的值从不被覆盖，只会新增缺失 key 的默认值。
    pub fn resolve(&self, postback: &mut Postback) -> Resolution {
        let data = &mut postback.data;
        let mut resolution = Resolution::default();

        let resolved = self
            .placeholder_regex
            .replace_all(&postback.url, |caps: &Captures| {
                let key = &caps[1];
                resolution.substituted += 1;

                if let Some(value) = data.get(key) {
                    return value.clone();
                }

                data.insert(key.to_string(), self.unmatched_value.clone());
                resolution.defaulted.push(key.to_string());
                self.unmatched_value.clone()
            })
            .into_owned();

        if resolution.substituted > 0 {
            trace!(
                template = %postback.url,
                resolved = %resolved,
                substituted = resolution.substituted,
                defaulted = ?resolution.defaulted,
                "URL 占位符已替换"
            );
            postback.url = resolved;
        }

        resolution
    }
}
