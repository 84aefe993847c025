//! WhatsApp Cloud API 通道
//!
//! 通过 Webhook 接收消息（立即返回 200，消息投递到事件循环的 mpsc 通道），
//! 通过 Graph API 发送文本、附件、图片与表情回应。

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{Attachment, InboundMessage, MessageRef, Messenger};
use crate::config::WhatsappSection;
use crate::core::TransportError;

/// WhatsApp 单条文本长度上限（4096 字符），按字符分段
const MAX_TEXT_CHARS: usize = 4000;

/// Webhook 服务状态
pub struct WebhookState {
    pub verify_token: String,
    pub inbound: mpsc::Sender<InboundMessage>,
}

/// Webhook 验证参数
#[derive(Debug, Deserialize)]
pub struct WebhookVerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// WhatsApp Webhook 请求体
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub object: Option<String>,
    pub entry: Option<Vec<WebhookEntry>>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEntry {
    pub id: Option<String>,
    pub changes: Option<Vec<WebhookChange>>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookChange {
    pub value: Option<WebhookValue>,
    pub field: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookValue {
    pub messages: Option<Vec<WebhookMessage>>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookMessage {
    pub from: String,
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub msg_type: Option<String>,
    pub text: Option<WebhookText>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookText {
    pub body: String,
}

/// 提取 payload 中的文本消息（非文本、空文本丢弃）
pub fn extract_messages(payload: WebhookPayload) -> Vec<InboundMessage> {
    if payload.object.as_deref() != Some("whatsapp_business_account") {
        return Vec::new();
    }
    payload
        .entry
        .unwrap_or_default()
        .into_iter()
        .flat_map(|e| e.changes.unwrap_or_default())
        .filter_map(|c| c.value)
        .flat_map(|v| v.messages.unwrap_or_default())
        .filter(|m| m.msg_type.as_deref() == Some("text"))
        .filter_map(|m| {
            let body = m.text?.body;
            if body.trim().is_empty() {
                return None;
            }
            Some(InboundMessage {
                conversation_id: m.from,
                body,
                message_ref: m.id,
            })
        })
        .collect()
}

/// 创建 Webhook 路由
pub fn create_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/webhook", get(webhook_verify).post(webhook_receive))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

/// GET /webhook - Meta 验证 Webhook
async fn webhook_verify(
    State(state): State<Arc<WebhookState>>,
    Query(query): Query<WebhookVerifyQuery>,
) -> Result<String, StatusCode> {
    if query.mode.as_deref() == Some("subscribe")
        && query.verify_token.as_deref() == Some(state.verify_token.as_str())
    {
        Ok(query.challenge.unwrap_or_default())
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}

/// POST /webhook - 接收消息，交给事件循环后立即返回
async fn webhook_receive(
    State(state): State<Arc<WebhookState>>,
    Json(payload): Json<WebhookPayload>,
) -> StatusCode {
    for msg in extract_messages(payload) {
        if let Err(e) = state.inbound.send(msg).await {
            tracing::error!("Event loop closed, dropping inbound message: {}", e);
            return StatusCode::SERVICE_UNAVAILABLE;
        }
    }
    StatusCode::OK
}

/// 发送文本的请求体
#[derive(Debug, Serialize)]
struct SendTextRequest<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    msg_type: &'static str,
    text: SendText,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<ReplyContext<'a>>,
}

#[derive(Debug, Serialize)]
struct SendText {
    body: String,
}

#[derive(Debug, Serialize)]
struct ReplyContext<'a> {
    message_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    id: String,
}

/// Graph API 客户端
pub struct WhatsappMessenger {
    client: reqwest::Client,
    api_base: String,
    access_token: String,
    phone_number_id: String,
}

impl WhatsappMessenger {
    pub fn new(settings: &WhatsappSection) -> Result<Self, TransportError> {
        let access_token = settings
            .access_token
            .clone()
            .ok_or_else(|| TransportError::Request("whatsapp.access_token must be set".into()))?;
        let phone_number_id = settings
            .phone_number_id
            .clone()
            .ok_or_else(|| TransportError::Request("whatsapp.phone_number_id must be set".into()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            access_token,
            phone_number_id,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/{}", self.api_base, self.phone_number_id, path)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(TransportError::Api {
            status: status.as_u16(),
            body,
        })
    }

    async fn post_message<T: Serialize + ?Sized>(&self, body: &T) -> Result<(), TransportError> {
        let resp = self
            .client
            .post(self.endpoint("messages"))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// 上传媒体，返回 media id
    async fn upload_media(&self, attachment: Attachment) -> Result<String, TransportError> {
        let part = Part::bytes(attachment.bytes)
            .file_name(attachment.filename)
            .mime_str(&attachment.mime_type)?;
        let form = Form::new()
            .text("messaging_product", "whatsapp")
            .text("type", attachment.mime_type)
            .part("file", part);
        let resp = self
            .client
            .post(self.endpoint("media"))
            .bearer_auth(&self.access_token)
            .multipart(form)
            .send()
            .await?;
        let uploaded: MediaUploadResponse = Self::check(resp).await?.json().await?;
        Ok(uploaded.id)
    }
}

fn recipient(to: &str) -> String {
    to.replace('+', "")
}

fn context_json(quoted: Option<&MessageRef>) -> serde_json::Value {
    match quoted {
        Some(id) => serde_json::json!({ "message_id": id }),
        None => serde_json::Value::Null,
    }
}

#[async_trait]
impl Messenger for WhatsappMessenger {
    async fn send_text(
        &self,
        to: &str,
        text: &str,
        quoted: Option<&MessageRef>,
    ) -> Result<(), TransportError> {
        let to = recipient(to);
        let chars: Vec<char> = text.chars().collect();
        for (i, chunk) in chars.chunks(MAX_TEXT_CHARS).enumerate() {
            let req = SendTextRequest {
                messaging_product: "whatsapp",
                to: &to,
                msg_type: "text",
                text: SendText {
                    body: chunk.iter().collect(),
                },
                // 仅第一段引用原消息
                context: quoted
                    .filter(|_| i == 0)
                    .map(|id| ReplyContext { message_id: id }),
            };
            self.post_message(&req).await?;
        }
        Ok(())
    }

    async fn send_binary(
        &self,
        to: &str,
        attachment: Attachment,
        quoted: Option<&MessageRef>,
    ) -> Result<(), TransportError> {
        let voice_note = attachment.voice_note;
        let filename = attachment.filename.clone();
        let media_id = self.upload_media(attachment).await?;

        let mut body = if voice_note {
            serde_json::json!({
                "messaging_product": "whatsapp",
                "to": recipient(to),
                "type": "audio",
                "audio": { "id": media_id },
            })
        } else {
            serde_json::json!({
                "messaging_product": "whatsapp",
                "to": recipient(to),
                "type": "document",
                "document": { "id": media_id, "filename": filename },
            })
        };
        if quoted.is_some() {
            body["context"] = context_json(quoted);
        }
        self.post_message(&body).await
    }

    async fn send_image(&self, to: &str, image_url: &str, caption: &str) -> Result<(), TransportError> {
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": recipient(to),
            "type": "image",
            "image": { "link": image_url, "caption": caption },
        });
        self.post_message(&body).await
    }

    async fn send_reaction(
        &self,
        to: &str,
        emoji: &str,
        target: &MessageRef,
    ) -> Result<(), TransportError> {
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": recipient(to),
            "type": "reaction",
            "reaction": { "message_id": target, "emoji": emoji },
        });
        self.post_message(&body).await
    }
}
