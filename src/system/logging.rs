//! 日志初始化
//!
//! tracing + EnvFilter，输出目标三选一：控制台、追加文件、按天滚动。
//! 返回的 WorkerGuard 要活到进程退出，否则非阻塞写入会丢掉尾部日志。

use crate::config::StaticConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;

/// 按 logging 配置挑输出目标
fn log_writer(config: &StaticConfig) -> Box<dyn std::io::Write + Send + Sync> {
    let Some(path) = config.logging.file.as_deref().filter(|f| !f.is_empty()) else {
        return Box::new(std::io::stdout());
    };

    if config.logging.enable_rotation {
        let path = std::path::Path::new(path);
        let dir = path.parent().unwrap_or(std::path::Path::new("."));
        let prefix = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("qrify.log")
            .trim_end_matches(".log");
        let appender = rolling::Builder::new()
            .rotation(rolling::Rotation::DAILY)
            .filename_prefix(prefix)
            .filename_suffix("log")
            .max_log_files(config.logging.max_backups as usize)
            .build(dir)
            .expect("Failed to create rolling log appender");
        return Box::new(appender);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("Failed to open log file");
    Box::new(file)
}

/// 初始化全局日志订阅器，启动时调用一次
///
/// 写文件时关掉 ANSI 色彩；`logging.format = "json"` 输出结构化日志。
/// 重复调用或 appender 创建失败会 panic。
pub fn init_logging(config: &StaticConfig) -> WorkerGuard {
    let to_console = config.logging.file.as_deref().is_none_or(|f| f.is_empty());
    let (writer, guard) = tracing_appender::non_blocking(log_writer(config));

    let builder = tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.logging.level))
        .with_level(true)
        .with_ansi(to_console);

    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }

    guard
}
