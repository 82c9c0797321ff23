//! 日志初始化
//!
//! `RUST_LOG` 优先；未设置时使用 `CHATLINGO_LOG_LEVEL`

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::env::{core::LogLevel, EnvVar};

/// 初始化全局日志，重复调用时忽略
pub fn init(verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        LogLevel::get().unwrap_or_else(|e| {
            eprintln!("Warning: {}", e);
            "info".to_string()
        })
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chatlingo={},warn", level)));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    if tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("日志系统已初始化");
    }
}
