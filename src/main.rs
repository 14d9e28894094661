//! Taskbee - 对话式任务助手（终端）
//!
//! 入口：加载 .env 与配置、初始化日志（stderr）、装配组件，然后逐行读取用户输入跑对话。
//! 可选参数：配置文件路径。

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use taskbee::{config::load_config, create_agent_components, observability, process_message};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    observability::init_stderr();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let components = create_agent_components(&cfg).context("Failed to create agent")?;
    let mut conversation = components.new_conversation();

    let prompt = format!("Chat with AI ({} to quit): ", components.quit_token);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{}", prompt);
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == components.quit_token {
            break;
        }

        match process_message(&components, &mut conversation, input).await {
            Ok(outcome) => println!("{}", outcome.response),
            Err(e) => {
                tracing::error!(error = %e, "turn failed");
                println!("Error: {}", e);
            }
        }
    }

    Ok(())
}
