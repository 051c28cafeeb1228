//! CodeHelper 终端对话
//!
//! 逐行读取标准输入并流式打印回答；`/clear` 清空历史，`exit` 或提示符处按 Ctrl+C 退出，生成中按 Ctrl+C 停止本次回答。

use std::io::Write;

use anyhow::Context;
use codehelper::agent::create_orchestrator;
use codehelper::config::{load_config, AppConfig};
use codehelper::llm::StreamEvent;
use tokio::io::{AsyncBufReadExt, BufReader};

const SESSION_ID: &str = "cli";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    codehelper::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let orchestrator = create_orchestrator(&cfg).await;

    println!("CodeHelper ready. Type a question, /clear to reset, exit to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().context("flush stdout")?;
        let line = tokio::select! {
            line = lines.next_line() => line.context("read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "exit" | "quit" => break,
            "/clear" => {
                orchestrator.clear_history(SESSION_ID).await;
                println!("(history cleared)");
                continue;
            }
            _ => {}
        }

        let mut session = orchestrator.chat_stream(SESSION_ID, input);
        loop {
            tokio::select! {
                ev = session.next_event() => match ev {
                    Some(StreamEvent::Fragment(text)) => {
                        print!("{}", text);
                        std::io::stdout().flush().context("flush stdout")?;
                    }
                    Some(StreamEvent::Completed) | None => {
                        println!();
                        break;
                    }
                    Some(StreamEvent::Failed(message)) => {
                        println!("{}", message);
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    session.cancel();
                    println!("\n(stopped)");
                    break;
                }
            }
        }
    }
    Ok(())
}
