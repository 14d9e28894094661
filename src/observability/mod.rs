//! 日志初始化：tracing-subscriber + EnvFilter（RUST_LOG 优先，缺省 info）

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// HTTP 服务：日志写 stdout
pub fn init() {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer())
        .init();
}

/// 终端对话：日志写 stderr，不与回复混在一起
pub fn init_stderr() {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
