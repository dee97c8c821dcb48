//! steward 命令行入口
//!
//! 加载配置、初始化日志、组装编排器，然后逐行读取标准输入，每行作为一轮用户输入处理。

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use steward::config::load_config;
use steward::core::{StewardBuilder, Turn};
use steward::observability;

#[derive(Debug, Parser)]
#[command(
    name = "steward",
    about = "Decision-and-execution engine for a conversational agent",
    after_help = "Examples:\n  steward --thread demo\n  echo 'hello' | steward --json"
)]
struct Cli {
    #[arg(long, default_value = "local", help = "Conversation thread id")]
    thread: String,
    #[arg(long, default_value = "local", help = "User id used to look up connected accounts")]
    user: String,
    #[arg(long, help = "Print the full response envelope as JSON")]
    json: bool,
    #[arg(long, help = "Extra config file layered over config/default.toml")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    observability::init();

    let cfg = load_config(cli.config.clone()).context("Failed to load configuration")?;
    tracing::info!(app = %cfg.app.name, thread = %cli.thread, "Starting");

    let orchestrator = StewardBuilder::new(cfg)
        .with_system_prompt_from_file()
        .build()
        .context("Failed to build runtime")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "/quit" | "/exit") {
            break;
        }

        let envelope = orchestrator
            .handle_turn(Turn::new(&cli.thread, &cli.user, text))
            .await;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&envelope).context("Failed to encode envelope")?
            );
        } else {
            println!("{}\n", envelope.response_text);
        }
    }
    Ok(())
}
