//! chatpick 控制台驱动
//!
//! 标准输入的每一行作为同一会话的一条消息，回复打印到标准输出，便于本地调试工作流。
//! 可选参数：配置文件路径（默认查找 config/default.toml）。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chatpick::config::load_config;
use chatpick::core::shutdown::sweep_artifacts;
use chatpick::core::{ShutdownManager, ShutdownReason};
use chatpick::messaging::console::{read_stdin, ConsoleMessenger};
use chatpick::{driver, observability, Bot, Sources};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    tokio::fs::create_dir_all(&cfg.app.downloads_dir)
        .await
        .with_context(|| format!("Failed to create {:?}", cfg.app.downloads_dir))?;
    sweep_artifacts(&cfg.app.downloads_dir).await;

    let sources = Sources::from_config(&cfg).context("Failed to create tool adapters")?;
    let bot = Arc::new(Bot::new(Arc::new(ConsoleMessenger::new()), sources, &cfg));

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let (tx, rx) = mpsc::channel(64);
    // 输入结束（EOF）时发送端被丢弃，事件循环处理完已收到的消息后退出
    let reader = tokio::spawn(read_stdin(tx));

    tracing::info!(
        "{} ready. Try: {} <query>, {} <query>, {} <title>",
        cfg.app.name,
        cfg.triggers.play,
        cfg.triggers.movie,
        cfg.triggers.info
    );

    driver::run(
        bot,
        rx,
        shutdown.token(),
        Duration::from_secs(cfg.session.sweep_interval_secs),
    )
    .await;

    if !shutdown.is_shutdown() {
        shutdown.shutdown(ShutdownReason::UserInitiated);
    }
    reader.abort();
    sweep_artifacts(&cfg.app.downloads_dir).await;
    Ok(())
}
