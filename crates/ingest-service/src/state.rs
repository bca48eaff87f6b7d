//! 应用状态定义

use std::sync::Arc;

use postback_shared::queue::PostbackQueue;

/// Axum 应用共享状态
#[derive(Clone)]
pub struct AppState {
    /// 待投递 postback 的队列，与投递服务读取的是同一个列表
    pub queue: Arc<dyn PostbackQueue>,
}

impl AppState {
    pub fn new(queue: Arc<dyn PostbackQueue>) -> Self {
        Self { queue }
    }
}
