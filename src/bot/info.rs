//! .info：元数据 API 按标题搜索 → 选择 → 详情卡片（有海报时以图片发送）
//!
//! 只有一个候选时跳过选择，直接进入会话队列获取详情，不创建会话。

use std::sync::Arc;

use super::{checked_query, format, slot_of, Bot, Step};
use crate::core::BotError;
use crate::messaging::InboundMessage;
use crate::router::Workflow;
use crate::session::{Candidate, SessionSlot};
use crate::tools::TitleHit;

/// 游戏条目不展示
fn eligible(hit: TitleHit) -> Option<Candidate> {
    if hit.kind.eq_ignore_ascii_case("game") || hit.imdb_id.trim().is_empty() {
        return None;
    }
    Some(Candidate::Title {
        title: hit.title,
        year: hit.year,
        imdb_id: hit.imdb_id,
        kind: hit.kind,
    })
}

impl Bot {
    pub(super) async fn search_titles(
        self: &Arc<Self>,
        msg: &InboundMessage,
        query: &str,
    ) -> Result<(), BotError> {
        let query = checked_query(query)?;
        let hits = {
            let _permit = self.serializer.tool_permit().await;
            self.sources.metadata.search(&query).await?
        };
        let mut items: Vec<Candidate> = hits
            .into_iter()
            .filter_map(eligible)
            .take(self.settings.max_results)
            .collect();
        let cache = self.sessions.cache(slot_of(Workflow::Info));

        match items.len() {
            0 => Err(BotError::NoResults),
            1 => {
                // 新搜索替换旧列表
                cache.clear(&msg.conversation_id).await;
                let candidate = items.remove(0);
                self.fetch_single(msg, candidate).await;
                Ok(())
            }
            _ => {
                let text = format::result_list(Workflow::Info, &query, &items);
                cache.put(&msg.conversation_id, items).await;
                self.messenger
                    .send_text(&msg.conversation_id, &text, None)
                    .await?;
                Ok(())
            }
        }
    }

    /// 唯一候选：仍经由会话队列，与其他获取保持串行
    async fn fetch_single(self: &Arc<Self>, msg: &InboundMessage, candidate: Candidate) {
        let Candidate::Title { imdb_id, .. } = candidate else {
            return;
        };
        let bot = Arc::clone(self);
        let owned = msg.clone();
        let handle = self.serializer.enqueue(&msg.conversation_id, async move {
            let result = bot.fetch_details(&owned, None, &imdb_id).await;
            bot.finish(&owned, Step::Fetch(Workflow::Info), result).await;
        });
        if let Err(e) = handle.await {
            tracing::error!(conversation = %msg.conversation_id, "detail task panicked: {}", e);
            self.notify(msg, format::GENERIC_ERROR).await;
        }
    }

    pub(super) async fn fetch_details(
        &self,
        msg: &InboundMessage,
        origin: Option<(SessionSlot, u64)>,
        imdb_id: &str,
    ) -> Result<(), BotError> {
        let conversation_id = &msg.conversation_id;
        let details = self.sources.metadata.details(imdb_id).await?;
        self.ensure_not_replaced(conversation_id, origin).await?;

        let card = format::info_card(&details);
        if let Some(poster) = &details.poster {
            match self.messenger.send_image(conversation_id, poster, &card).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(conversation = %conversation_id, "poster send failed, sending text card: {}", e)
                }
            }
        }
        self.messenger.send_text(conversation_id, &card, None).await?;
        Ok(())
    }
}
