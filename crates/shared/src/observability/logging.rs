//! 日志初始化
//!
//! 同时输出到两个目的地：
//! - 追加写入的日志文件（不含 ANSI 颜色，不记录 TRACE）
//! - 控制台：ERROR 写 stderr，其余级别写 stdout；TRACE 仅在 `show_traces` 开启时输出

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::LevelFilter,
    fmt::{self, MakeWriter, writer::MakeWriterExt},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::config::ObservabilityConfig;

/// 开启 show_traces 时放开到 TRACE 的 crate
const TRACE_TARGETS: &[&str] = &["delivery_worker", "ingest_service", "postback_shared"];

/// 以追加模式打开日志文件，不存在时创建
///
/// 本系统从不截断或轮转日志文件。
pub fn open_log_file(path: impl AsRef<Path>) -> Result<File> {
    let path = path.as_ref();
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("无法打开日志文件: {}", path.display()))
}

/// 初始化全局 tracing subscriber
///
/// 日志文件无法打开时返回错误，调用方应中止启动。
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let file = Arc::new(open_log_file(&config.log_file)?);

    let mut env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if config.show_traces {
        for target in TRACE_TARGETS {
            env_filter = env_filter.add_directive(format!("{target}=trace").parse()?);
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(output_layers(
            config,
            file,
            std::io::stdout,
            std::io::stderr,
        ))
        .try_init()
        .context("初始化日志失败")?;

    Ok(())
}

/// 组装文件与控制台两个输出层
///
/// 文件只记录 DEBUG 及以上；控制台 ERROR 写 `stderr`、其余写 `stdout`，
/// 仅在 `show_traces` 开启时放行 TRACE。
pub fn output_layers<S, F, O, E>(
    config: &ObservabilityConfig,
    file: F,
    stdout: O,
    stderr: E,
) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    F: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    O: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    E: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let json = config.log_format.eq_ignore_ascii_case("json");
    let console_filter = if config.show_traces {
        LevelFilter::TRACE
    } else {
        LevelFilter::DEBUG
    };
    let console_writer = stderr.with_max_level(Level::ERROR).or_else(stdout);

    fmt_layer(file, json, false)
        .with_filter(LevelFilter::DEBUG)
        .and_then(fmt_layer(console_writer, json, true).with_filter(console_filter))
        .boxed()
}

/// 构建单个输出目的地的格式化层
fn fmt_layer<S, W>(writer: W, json: bool, ansi: bool) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    if json {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_current_span(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(ansi)
            .boxed()
    }
}
