//! 可观测性：tracing 订阅器初始化
//!
//! 默认 info 级别，RUST_LOG 可覆盖（如 `RUST_LOG=hive=debug` 查看历史裁剪与参数修复）。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化全局订阅器；重复调用时忽略
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}
