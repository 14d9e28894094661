//! Taskbee HTTP 服务
//!
//! 启动: cargo run --bin taskbee-web
//! 端口取 [web].port，可用 TASKBEE_WEB_PORT 覆盖。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use taskbee::{config::load_config, create_agent_components, observability, server::create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let components = create_agent_components(&cfg).context("Failed to create agent")?;

    let app = create_router(Arc::new(components), &cfg.web.allowed_origins);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cfg.web.port));
    tracing::info!("Taskbee API: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
