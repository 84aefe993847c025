//! chatpick WhatsApp 服务
//!
//! 通过 WhatsApp Cloud API 接收消息（Webhook）并回复。
//!
//! 配置（config/default.toml 的 [whatsapp] 段，或环境变量）:
//! - CHATPICK__WHATSAPP__ACCESS_TOKEN: Meta WhatsApp API 访问令牌
//! - CHATPICK__WHATSAPP__PHONE_NUMBER_ID: 企业电话号码 ID
//! - CHATPICK__WHATSAPP__VERIFY_TOKEN: Webhook 验证令牌 (默认 "chatpick")
//! - CHATPICK__TOOLS__METADATA__API_KEY: .info 使用的 OMDb API Key
//!
//! 启动: cargo run --bin chatpick-whatsapp --features whatsapp

#[cfg(feature = "whatsapp")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Context;
    use chatpick::config::load_config;
    use chatpick::core::shutdown::sweep_artifacts;
    use chatpick::core::ShutdownManager;
    use chatpick::messaging::whatsapp::{create_router, WebhookState, WhatsappMessenger};
    use chatpick::{driver, observability, Bot, Sources};
    use tokio::sync::mpsc;

    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    tokio::fs::create_dir_all(&cfg.app.downloads_dir)
        .await
        .with_context(|| format!("Failed to create {:?}", cfg.app.downloads_dir))?;
    sweep_artifacts(&cfg.app.downloads_dir).await;

    let messenger = WhatsappMessenger::new(&cfg.whatsapp).context("Invalid [whatsapp] config")?;
    let sources = Sources::from_config(&cfg).context("Failed to create tool adapters")?;
    let bot = Arc::new(Bot::new(Arc::new(messenger), sources, &cfg));

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let (tx, rx) = mpsc::channel(256);
    let state = Arc::new(WebhookState {
        verify_token: cfg.whatsapp.verify_token.clone(),
        inbound: tx,
    });
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.whatsapp.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.whatsapp.listen_addr))?;
    tracing::info!("chatpick WhatsApp server listening on http://{}", cfg.whatsapp.listen_addr);
    tracing::info!("Webhook URL: http://YOUR_HOST/webhook");

    let server = {
        let token = shutdown.token();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        })
    };

    driver::run(
        bot,
        rx,
        shutdown.token(),
        Duration::from_secs(cfg.session.sweep_interval_secs),
    )
    .await;

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("HTTP server error: {}", e),
        Err(e) => tracing::error!("HTTP server task failed: {}", e),
    }
    sweep_artifacts(&cfg.app.downloads_dir).await;
    Ok(())
}

#[cfg(not(feature = "whatsapp"))]
fn main() {
    eprintln!("请使用 --features whatsapp 编译: cargo run --bin chatpick-whatsapp --features whatsapp");
    std::process::exit(1);
}
