//! Hive - 受监管的 Monologue Actor 群体
//!
//! 入口：初始化日志与配置，创建编排器并启动 Main（可选 Comms），
//! 在终端上消费注入事件与提问，stdin 的每一行作为用户输入送入群体。
//! `@<cid> 回答` 解析对应的待决提问，普通行直接进 Main 邮箱。

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use hive::config::load_config;
use hive::core::Orchestrator;
use hive::llm::{CompletionClient, MockClient, OpenAiCompatClient};
use hive::tools::builtin_tools;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;

    let llm: Arc<dyn CompletionClient> = match cfg.llm.provider.as_str() {
        "mock" => Arc::new(MockClient::new()),
        _ => Arc::new(OpenAiCompatClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            None,
        )),
    };
    let tools = builtin_tools(&cfg.tools);

    let orch = Arc::new(
        Orchestrator::new(llm, tools, cfg.runtime.clone())
            .with_injection_hook(Box::new(|event, main| {
                Box::pin(async move {
                    println!("[{} -> {}] {}", event.from_id, main.id, event.content);
                })
            }))
            .with_question_hook(Box::new(|cid, question, choices| {
                Box::pin(async move {
                    if choices.is_empty() {
                        println!("[ASK {}] {}", cid, question);
                    } else {
                        println!("[ASK {}] {} {:?}", cid, question, choices);
                    }
                    println!("  (answer with: @{} <text>)", cid);
                })
            })),
    );

    let goal = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let goal = if goal.is_empty() {
        "Coordinate the population and wait for user input.".to_string()
    } else {
        goal
    };
    let main_id = orch.start(&goal, true).await;
    println!("hive started, main={}  (Ctrl-C to quit)", main_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("stdin read failed")? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Some(rest) = line.strip_prefix('@') {
                    let mut parts = rest.splitn(2, char::is_whitespace);
                    let cid = parts.next().unwrap_or_default();
                    let answer = parts.next().unwrap_or_default().trim();
                    orch.on_user_message(answer, Some(cid));
                } else {
                    orch.on_user_message(line, None);
                }
            }
        }
    }

    orch.shutdown().await;
    Ok(())
}
