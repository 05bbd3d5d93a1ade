//! Kiln 回放工具
//!
//! 用法: kiln [FILE] [--chunk N] [--config PATH] [--message-id ID] [--history PATH]
//! 读取一条助手回复（文件或 stdin），按 N 个字符一块回放进管线，逐行输出解析事件、执行结果与最终版本（JSON）。
//! 指定 --history 时先从聊天历史回溯版本，回放结束后把这条回复追加进历史文件。

use std::io::Read;
use std::num::NonZero;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use kiln::config::{load_config, AppConfig};
use kiln::core::WorkbenchBuilder;
use kiln::dispatch::MemoryWorkspace;
use kiln::llm::chunk_text;
use kiln::memory::{ChatHistory, ChatHistoryPersistence, ChatMessage};

#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(about = "Replay an assistant reply through the artifact pipeline")]
#[command(version)]
struct Cli {
    /// Reply file (reads stdin when omitted)
    file: Option<PathBuf>,

    /// Characters per replayed chunk
    #[arg(long, default_value = "24")]
    chunk: NonZero<usize>,

    /// Config file (defaults to config/default.toml lookup)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Message id used for the replayed reply
    #[arg(long, default_value = "replay-1")]
    message_id: String,

    /// Chat history JSON; versions are derived from it and the reply is appended
    #[arg(long)]
    history: Option<PathBuf>,
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kiln::observability::init();

    let args = Cli::parse();
    let cfg = load_config(args.config.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let reply = match &args.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut s = String::new();
            std::io::stdin()
                .read_to_string(&mut s)
                .context("Failed to read stdin")?;
            s
        }
    };

    let debounce = cfg.versions.snapshot_options().debounce;
    let mut builder = WorkbenchBuilder::new(cfg.clone(), "replay");
    if cfg.workspace.root.is_none() {
        builder = builder.with_workspace(Arc::new(MemoryWorkspace::new()));
    }
    let mut workbench = builder.build().await.context("Failed to build workbench")?;

    let history_store = args.history.as_ref().map(ChatHistoryPersistence::new);
    if let Some(store) = &history_store {
        let messages = store.load().context("Failed to load chat history")?;
        let adopted = workbench
            .versions()
            .adopt_history(&messages, &cfg.parser.options())
            .await
            .context("Failed to derive versions from history")?;
        tracing::info!(messages = messages.len(), adopted, "chat history loaded");
        workbench = workbench.with_history(ChatHistory::from_messages(messages));
    }

    let mut text = String::new();
    for chunk in chunk_text(&reply, args.chunk.get()) {
        let report = workbench.push_chunk(&args.message_id, &chunk).await;
        text.push_str(&report.text);
        for event in &report.events {
            print_json(event)?;
        }
        for outcome in &report.outcomes {
            print_json(outcome)?;
        }
    }
    let report = workbench.finish_message(&args.message_id).await;
    text.push_str(&report.text);
    for event in &report.events {
        print_json(event)?;
    }
    for outcome in &report.outcomes {
        print_json(outcome)?;
    }

    // 等待防抖快照落定
    tokio::time::sleep(debounce + std::time::Duration::from_millis(200)).await;
    for version in workbench.versions().list().await {
        print_json(&serde_json::json!({
            "type": "version",
            "id": version.id,
            "message_id": version.message_id,
            "title": version.title,
            "description": version.description,
            "files": version.file_count(),
            "is_latest": version.is_latest,
        }))?;
    }
    print_json(&serde_json::json!({ "type": "text", "content": text.trim() }))?;

    if let Some(store) = &history_store {
        let mut messages = workbench.history().messages().to_vec();
        messages.push(ChatMessage::assistant(reply).with_id(args.message_id.clone()));
        store.save(&messages).context("Failed to save chat history")?;
    }
    Ok(())
}
