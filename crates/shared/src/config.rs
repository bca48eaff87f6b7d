//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Redis 配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
        }
    }
}

/// 队列轮询配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// 存放待投递 postback 的 Redis List 名称
    pub list_name: String,
    /// 队列为空时下一次轮询前的等待时间
    pub idle_backoff_ms: u64,
    /// 连续出错时的首次退避时间
    pub error_backoff_initial_ms: u64,
    /// 退避时间上限
    pub error_backoff_max_ms: u64,
    pub error_backoff_multiplier: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            list_name: "request".to_string(),
            idle_backoff_ms: 100,
            error_backoff_initial_ms: 500,
            error_backoff_max_ms: 30_000,
            error_backoff_multiplier: 2.0,
        }
    }
}

impl QueueConfig {
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

/// 投递配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// 并发投递 worker 数量
    pub workers: usize,
    /// 轮询器与 worker 之间的缓冲通道容量
    pub channel_capacity: usize,
    /// 单次 HTTP 投递的超时时间
    pub request_timeout_ms: u64,
    /// URL 中 {key} 在 data 里找不到时使用的替换值
    pub unmatched_placeholder_value: String,
    pub user_agent: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            channel_capacity: 64,
            request_timeout_ms: 10_000,
            unmatched_placeholder_value: String::new(),
            user_agent: concat!("postback-delivery/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl DeliveryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// 接收服务配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub host: String,
    pub port: u16,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
    /// 追加写入的日志文件路径
    pub log_file: String,
    /// 是否在控制台输出 TRACE 级别日志
    pub show_traces: bool,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            log_file: "postback.log".to_string(),
            show_traces: false,
            metrics_enabled: false,
            metrics_port: 9090,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub redis: RedisConfig,
    pub queue: QueueConfig,
    pub delivery: DeliveryConfig,
    pub ingest: IngestConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（POSTBACK_ 前缀，如 POSTBACK_QUEUE__LIST_NAME -> queue.list_name）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let env = std::env::var("POSTBACK_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(service_name, &env, Path::new(&config_dir))
    }

    /// 从指定目录加载配置，不读取 POSTBACK_ENV / CONFIG_DIR
    pub fn load_from(service_name: &str, env: &str, config_dir: &Path) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            // 双下划线分隔层级，单下划线保留给字段名（list_name、log_file 等）
            .add_source(
                Environment::with_prefix("POSTBACK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 接收服务监听地址
    pub fn ingest_addr(&self) -> String {
        format!("{}:{}", self.ingest.host, self.ingest.port)
    }
}
