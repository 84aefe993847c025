//! 控制台通道：标准输入每行作为同一会话的一条消息，回复打印到标准输出
//!
//! 用于在没有 WhatsApp 账号时本地调试工作流。

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};

use super::{Attachment, InboundMessage, MessageRef, Messenger};
use crate::core::TransportError;

/// 控制台会话 ID
pub const CONSOLE_CONVERSATION: &str = "console";

/// 打印到标准输出的 Messenger
pub struct ConsoleMessenger {
    stdout: Mutex<tokio::io::Stdout>,
}

impl ConsoleMessenger {
    pub fn new() -> Self {
        Self {
            stdout: Mutex::new(tokio::io::stdout()),
        }
    }

    async fn print(&self, line: &str) -> Result<(), TransportError> {
        let mut out = self.stdout.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
        Ok(())
    }
}

impl Default for ConsoleMessenger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Messenger for ConsoleMessenger {
    async fn send_text(
        &self,
        _to: &str,
        text: &str,
        _quoted: Option<&MessageRef>,
    ) -> Result<(), TransportError> {
        self.print(&format!("bot> {}", text)).await
    }

    async fn send_binary(
        &self,
        _to: &str,
        attachment: Attachment,
        _quoted: Option<&MessageRef>,
    ) -> Result<(), TransportError> {
        self.print(&format!(
            "bot> [{}] {} ({} bytes, {})",
            if attachment.voice_note { "voice note" } else { "file" },
            attachment.filename,
            attachment.bytes.len(),
            attachment.mime_type
        ))
        .await
    }

    async fn send_image(&self, _to: &str, image_url: &str, caption: &str) -> Result<(), TransportError> {
        self.print(&format!("bot> [image] {}\n{}", image_url, caption)).await
    }

    async fn send_reaction(
        &self,
        _to: &str,
        emoji: &str,
        target: &MessageRef,
    ) -> Result<(), TransportError> {
        self.print(&format!("bot> [reaction {} on #{}]", emoji, target)).await
    }
}

/// 读取标准输入，逐行转为入站消息；输入结束（EOF）时返回
pub async fn read_stdin(tx: mpsc::Sender<InboundMessage>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut seq: u64 = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                seq += 1;
                let msg = InboundMessage::new(CONSOLE_CONVERSATION, line).with_ref(seq.to_string());
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }
}
