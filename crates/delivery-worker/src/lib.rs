//! Postback 投递服务
//!
//! 从 Redis 列表逐条取出 postback，替换 URL 占位符后按记录中的方法
//! 以 GET 或 POST 投递到目标端点。每条记录最多投递一次，失败只记录日志。

pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod postback;
pub mod resolver;
pub mod sender;
