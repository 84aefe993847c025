//! .play：搜索音频 → 选择 → 下载 mp3 → 按大小以语音消息或音频文件发送

use super::{checked_query, format, slot_of, Bot};
use crate::core::{BotError, ToolError};
use crate::messaging::{Attachment, InboundMessage};
use crate::router::Workflow;
use crate::session::{Candidate, SessionSlot};
use crate::tools::{TempArtifact, TrackHit};

/// 可直接转 mp3 的结果：非直播、有时长、有链接、不是 Shorts
fn eligible(hit: TrackHit) -> Option<Candidate> {
    if hit.is_live {
        return None;
    }
    let duration = hit.duration?;
    let url = hit.url.filter(|u| !u.contains("shorts"))?;
    Some(Candidate::Track {
        title: hit.title,
        duration,
        url,
    })
}

impl Bot {
    pub(super) async fn search_tracks(&self, msg: &InboundMessage, query: &str) -> Result<(), BotError> {
        let query = checked_query(query)?;
        let hits = {
            let _permit = self.serializer.tool_permit().await;
            self.sources.media.search(&query, self.settings.search_limit).await?
        };
        let items: Vec<Candidate> = hits
            .into_iter()
            .filter_map(eligible)
            .take(self.settings.max_results)
            .collect();
        if items.is_empty() {
            return Err(BotError::NoResults);
        }

        let text = format::result_list(Workflow::Play, &query, &items);
        self.sessions
            .cache(slot_of(Workflow::Play))
            .put(&msg.conversation_id, items)
            .await;
        self.messenger
            .send_text(&msg.conversation_id, &text, None)
            .await?;
        Ok(())
    }

    pub(super) async fn fetch_track(
        &self,
        msg: &InboundMessage,
        origin: Option<(SessionSlot, u64)>,
        title: &str,
        url: &str,
    ) -> Result<(), BotError> {
        let conversation_id = &msg.conversation_id;
        tokio::fs::create_dir_all(&self.settings.downloads_dir)
            .await
            .map_err(ToolError::from)?;
        // 离开作用域时删除（含失败路径）
        let artifact = TempArtifact::new(&self.settings.downloads_dir, "mp3");
        self.sources.media.download(url, &artifact).await?;

        let path = artifact.path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => {
                return Err(ToolError::MissingOutput(format!("{} is empty", path.display())).into())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::MissingOutput(path.display().to_string()).into())
            }
            Err(e) => return Err(ToolError::Io(e).into()),
        };

        self.ensure_not_replaced(conversation_id, origin).await?;

        let voice_note = bytes.len() as u64 > self.settings.voice_note_threshold_bytes;
        tracing::debug!(
            conversation = %conversation_id,
            size = bytes.len(),
            voice_note,
            "delivering audio"
        );
        let attachment = Attachment {
            bytes,
            mime_type: "audio/mpeg".to_string(),
            filename: format::safe_filename(title, "mp3"),
            voice_note,
        };
        self.messenger
            .send_binary(conversation_id, attachment, msg.message_ref.as_ref())
            .await?;

        if let Some(target) = &msg.message_ref {
            if let Err(e) = self
                .messenger
                .send_reaction(conversation_id, "✅", target)
                .await
            {
                tracing::warn!(conversation = %conversation_id, "reaction failed: {}", e);
            }
        }
        Ok(())
    }
}
