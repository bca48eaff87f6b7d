//! Postback 接收服务
//!
//! 通过 HTTP 接收 postback 请求，校验后按 data 拆分为多条记录写入 Redis 列表，
//! 由投递服务异步消费。

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
