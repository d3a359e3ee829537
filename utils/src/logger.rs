use slog::o;
use slog::Drain;
use slog::Level;
use slog::LevelFilter;
#[cfg(all(target_os = "linux", feature = "journald"))]
use slog_journald::JournaldDrain;
#[cfg(feature = "syslog")]
use slog_syslog::Facility;

use std::fs::OpenOptions;
use std::path::PathBuf;

use super::error::Result;
use crate::app_config::{AppConfig, LogConfig};

const CHANNEL_SIZE: usize = 1024;

pub fn setup_logging() -> Result<slog_scope::GlobalLoggerGuard> {
    let guard = slog_scope::set_global_logger(default_root_logger()?);
    slog_stdlog::init()?;

    Ok(guard)
}

pub fn default_root_logger() -> Result<slog::Logger> {
    let log_config = AppConfig::get::<LogConfig>("log").ok();
    let log_level = log_config
        .as_ref()
        .map(|c| parse_level(&c.level))
        .unwrap_or(Level::Info);

    let term_drain = default_term_drain().unwrap_or(default_discard()?);

    // 日志文件不可写时退化为丢弃，不影响命令执行
    let file_drain = default_file_drain(log_config.as_ref()).unwrap_or(default_discard()?);

    let drain = slog::Duplicate(term_drain, file_drain).fuse();

    #[cfg(feature = "syslog")]
    let drain = slog::Duplicate(default_syslog_drain().unwrap_or(default_discard()?), drain).fuse();
    #[cfg(feature = "journald")]
    #[cfg(target_os = "linux")]
    let drain = slog::Duplicate(
        default_journald_drain().unwrap_or(default_discard()?),
        drain,
    )
    .fuse();

    let drain = LevelFilter::new(drain, log_level).fuse();

    Ok(slog::Logger::root(drain, o!("app" => "ntacl")))
}

/// Map a `log.level` value onto a slog level; unknown values fall back to info.
pub fn parse_level(level: &str) -> Level {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Level::Trace,
        "debug" => Level::Debug,
        "info" => Level::Info,
        "warn" | "warning" => Level::Warning,
        "error" => Level::Error,
        _ => Level::Info,
    }
}

fn default_discard() -> Result<slog_async::Async> {
    let drain = slog_async::Async::new(slog::Discard)
        .chan_size(CHANNEL_SIZE)
        .build();

    Ok(drain)
}

// term drain: Log to Terminal
#[cfg(not(feature = "termlog"))]
fn default_term_drain() -> Result<slog_async::Async> {
    let plain = slog_term::PlainSyncDecorator::new(std::io::stderr());
    let term = slog_term::FullFormat::new(plain)
        .use_custom_timestamp(slog_term::timestamp_local);

    let drain = slog_async::Async::new(term.build().fuse())
        .chan_size(CHANNEL_SIZE)
        .build();

    Ok(drain)
}

// term drain: Log to Terminal with file locations
#[cfg(feature = "termlog")]
fn default_term_drain() -> Result<slog_async::Async> {
    let plain = slog_term::PlainSyncDecorator::new(std::io::stderr());
    let term = slog_term::FullFormat::new(plain)
        .use_file_location()
        .use_custom_timestamp(slog_term::timestamp_local);

    let drain = slog_async::Async::new(term.build().fuse())
        .chan_size(CHANNEL_SIZE)
        .build();

    Ok(drain)
}

/// 日志目录：相对路径基于可执行文件所在目录
fn log_dir(config: Option<&LogConfig>) -> Result<PathBuf> {
    let dir = config.map(|c| c.dir.as_str()).unwrap_or("logs");
    let dir = PathBuf::from(dir);
    if dir.is_absolute() {
        return Ok(dir);
    }

    let mut exe_dir = std::env::current_exe()?;
    exe_dir.pop();
    if !exe_dir.exists() {
        exe_dir = std::env::current_dir()?;
    }

    Ok(exe_dir.join(dir))
}

// file drain: Log to file
fn default_file_drain(config: Option<&LogConfig>) -> Result<slog_async::Async> {
    let log_dir = log_dir(config)?;
    std::fs::create_dir_all(&log_dir)?;

    let file_name = config.map(|c| c.file.as_str()).unwrap_or("ntacl.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(file_name))?;

    let decorator = slog_term::PlainSyncDecorator::new(file);
    let formatter = slog_term::FullFormat::new(decorator)
        .use_file_location()
        .use_custom_timestamp(slog_term::timestamp_local)
        .build()
        .fuse();

    let drain = slog_async::Async::new(formatter)
        .chan_size(CHANNEL_SIZE)
        .build();

    Ok(drain)
}

// syslog drain: Log to syslog
#[cfg(feature = "syslog")]
fn default_syslog_drain() -> Result<slog_async::Async> {
    let syslog = slog_syslog::unix_3164(Facility::LOG_USER)?;

    let drain = slog_async::Async::new(syslog.fuse())
        .chan_size(CHANNEL_SIZE)
        .build();

    Ok(drain)
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn default_journald_drain() -> Result<slog_async::Async> {
    let journald = JournaldDrain.ignore_res();
    let drain = slog_async::Async::new(journald)
        .chan_size(CHANNEL_SIZE)
        .build();

    Ok(drain)
}
