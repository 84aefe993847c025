//! 会话驱动：消费入站消息、定期清理过期会话、关闭时排空在途任务
//!
//! 每条消息在独立任务中处理（同一会话的获取由 TaskSerializer 串行），
//! 单条消息处理 panic 只会被记录，不会影响事件循环或其他会话。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::bot::Bot;
use crate::messaging::InboundMessage;

/// 关闭时等待在途任务的最长时间
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// 运行事件循环，直到入站通道关闭或收到关闭信号
pub async fn run(
    bot: Arc<Bot>,
    mut inbound: mpsc::Receiver<InboundMessage>,
    shutdown: CancellationToken,
    sweep_interval: Duration,
) {
    let mut tasks = JoinSet::new();
    let mut sweep_timer = tokio::time::interval(sweep_interval.max(Duration::from_secs(1)));
    // 第一次 tick 立即完成
    sweep_timer.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Shutdown requested, no longer accepting messages");
                break;
            }
            msg = inbound.recv() => {
                let Some(msg) = msg else {
                    tracing::info!("Inbound channel closed");
                    break;
                };
                let bot = Arc::clone(&bot);
                tasks.spawn(async move { bot.handle(msg).await });
            }
            _ = sweep_timer.tick() => {
                let expired = bot.sessions().sweep_expired().await;
                if expired > 0 {
                    tracing::info!("Cleaned up {} expired search sessions", expired);
                }
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                log_joined(joined);
            }
        }
    }

    drain(&mut tasks).await;
}

/// 等待在途任务结束；超时后中止剩余任务
async fn drain(tasks: &mut JoinSet<()>) {
    if tasks.is_empty() {
        return;
    }
    tracing::info!("Waiting for {} in-flight handler(s)", tasks.len());
    let finished = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while let Some(joined) = tasks.join_next().await {
            log_joined(joined);
        }
    })
    .await;
    if finished.is_err() {
        tracing::warn!("Drain timed out, aborting {} handler(s)", tasks.len());
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }
}

fn log_joined(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!("Message handler panicked: {}", e);
        }
    }
}
