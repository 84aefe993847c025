//! 消息通道：入站消息与出站回复原语
//!
//! 核心只依赖 Messenger trait；具体通道有控制台（本地调试）与 WhatsApp Cloud API。

pub mod console;
#[cfg(feature = "whatsapp")]
pub mod whatsapp;

use async_trait::async_trait;

use crate::core::TransportError;
use crate::session::ConversationId;

/// 平台侧消息 ID，用于引用回复与表情回应
pub type MessageRef = String;

/// 入站消息（仅文本；非文本与空消息由通道丢弃）
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub conversation_id: ConversationId,
    pub body: String,
    /// 用于引用回复 / 表情回应；控制台等通道可能没有
    pub message_ref: Option<MessageRef>,
}

impl InboundMessage {
    pub fn new(conversation_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            body: body.into(),
            message_ref: None,
        }
    }

    pub fn with_ref(mut self, message_ref: impl Into<String>) -> Self {
        self.message_ref = Some(message_ref.into());
        self
    }
}

/// 二进制附件
#[derive(Debug, Clone)]
pub struct Attachment {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub filename: String,
    /// 以语音消息（PTT）形式发送
    pub voice_note: bool,
}

/// 出站回复原语；每次调用都需等待完成，失败由调用方记录
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(
        &self,
        to: &str,
        text: &str,
        quoted: Option<&MessageRef>,
    ) -> Result<(), TransportError>;

    async fn send_binary(
        &self,
        to: &str,
        attachment: Attachment,
        quoted: Option<&MessageRef>,
    ) -> Result<(), TransportError>;

    async fn send_image(&self, to: &str, image_url: &str, caption: &str)
        -> Result<(), TransportError>;

    async fn send_reaction(
        &self,
        to: &str,
        emoji: &str,
        target: &MessageRef,
    ) -> Result<(), TransportError>;
}
