//! 共享库
//!
//! 包含投递服务与接收服务共用的配置、错误处理、队列客户端、退避策略与可观测性代码。

pub mod config;
pub mod error;
pub mod observability;
pub mod queue;
pub mod retry;
pub mod test_utils;
