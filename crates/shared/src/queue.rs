//! Postback 队列模块
//!
//! 待投递的 postback 以 JSON 字符串形式存放在 Redis List 中：
//! 接收端 RPUSH 追加到队尾，投递端 LPOP 从队头取出，保证先进先出。
//! 取出即删除，没有确认机制，投递语义为至多一次。

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::Client;
use redis::aio::MultiplexedConnection;
use tracing::{info, instrument};

use crate::config::{QueueConfig, RedisConfig};
use crate::error::{PostbackError, Result};

/// 队列存储抽象
///
/// `pop` 返回 `Ok(None)` 表示队列为空，这不是错误。
/// 取出的记录是原始字节，编码校验由消费方负责：记录出队后即从存储中删除，
/// 内容有问题只影响这一条，不应被当成队列故障。
#[async_trait]
pub trait PostbackQueue: Send + Sync {
    /// 取出最早入队的一条记录
    async fn pop(&self) -> Result<Option<Vec<u8>>>;

    /// 按顺序追加记录到队尾，返回追加后的队列长度
    async fn push(&self, entries: &[String]) -> Result<u64>;
}

// ---------------------------------------------------------------------------
// Redis List 实现
// ---------------------------------------------------------------------------

/// 基于 Redis List 的队列
///
/// 持有一条长生命周期的多路复用连接，启动时建立，clone 只复制句柄，
/// 不会为每个任务新建连接。
#[derive(Clone)]
pub struct RedisListQueue {
    conn: MultiplexedConnection,
    list_name: String,
}

impl RedisListQueue {
    /// 连接 Redis 并执行一次 PING 验证连通性
    pub async fn connect(redis: &RedisConfig, queue: &QueueConfig) -> Result<Self> {
        let client = Client::open(redis.url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;

        let this = Self {
            conn,
            list_name: queue.list_name.clone(),
        };
        this.health_check().await?;

        info!(list = %this.list_name, "Redis queue connected");
        Ok(this)
    }

    /// 健康检查，PING 必须返回 PONG
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        check_ping_reply(&reply)
    }
}

fn check_ping_reply(reply: &str) -> Result<()> {
    if reply.eq_ignore_ascii_case("PONG") {
        Ok(())
    } else {
        Err(PostbackError::QueueUnavailable(format!(
            "PING 返回异常: {reply}"
        )))
    }
}

#[async_trait]
impl PostbackQueue for RedisListQueue {
    async fn pop(&self) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let entry: Option<Vec<u8>> = redis::cmd("LPOP")
            .arg(self.list_name.as_str())
            .query_async(&mut conn)
            .await?;
        Ok(entry)
    }

    #[instrument(skip(self, entries), fields(list = %self.list_name, count = entries.len()))]
    async fn push(&self, entries: &[String]) -> Result<u64> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut cmd = redis::cmd("RPUSH");
        cmd.arg(self.list_name.as_str());
        for entry in entries {
            cmd.arg(entry.as_str());
        }

        let mut conn = self.conn.clone();
        let len: u64 = cmd.query_async(&mut conn).await?;
        Ok(len)
    }
}

// ---------------------------------------------------------------------------
// 内存实现
// ---------------------------------------------------------------------------

/// 进程内 FIFO 队列，用于测试和本地调试
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    entries: Arc<Mutex<VecDeque<String>>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// 当前队列内容的快照（队头在前）
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.lock().iter().cloned().collect()
    }
}

#[async_trait]
impl PostbackQueue for InMemoryQueue {
    async fn pop(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().pop_front().map(String::into_bytes))
    }

    async fn push(&self, entries: &[String]) -> Result<u64> {
        let mut queue = self.entries.lock();
        queue.extend(entries.iter().cloned());
        Ok(queue.len() as u64)
    }
}
