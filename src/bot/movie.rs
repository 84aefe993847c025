//! .movie：爬虫搜索影片 → 选择 → 获取下载链接（一次性，结束即清除会话）

use super::{checked_query, format, slot_of, Bot};
use crate::core::BotError;
use crate::messaging::InboundMessage;
use crate::router::Workflow;
use crate::session::{Candidate, SessionSlot};
use crate::tools::MovieHit;

fn eligible(hit: MovieHit) -> Option<Candidate> {
    if hit.link.trim().is_empty() || hit.title.trim().is_empty() {
        return None;
    }
    Some(Candidate::Movie {
        title: hit.title,
        year: hit.year,
        quality: hit.quality,
        link: hit.link,
    })
}

impl Bot {
    pub(super) async fn search_movies(&self, msg: &InboundMessage, query: &str) -> Result<(), BotError> {
        let query = checked_query(query)?;
        self.notify(msg, &format::searching(&query)).await;

        let hits = {
            let _permit = self.serializer.tool_permit().await;
            self.sources.movies.search(&query).await?
        };
        let items: Vec<Candidate> = hits
            .into_iter()
            .filter_map(eligible)
            .take(self.settings.max_results)
            .collect();
        if items.is_empty() {
            return Err(BotError::NoResults);
        }

        let text = format::result_list(Workflow::Movie, &query, &items);
        self.sessions
            .cache(slot_of(Workflow::Movie))
            .put(&msg.conversation_id, items)
            .await;
        self.messenger
            .send_text(&msg.conversation_id, &text, None)
            .await?;
        Ok(())
    }

    pub(super) async fn fetch_links(
        &self,
        msg: &InboundMessage,
        origin: Option<(SessionSlot, u64)>,
        link: &str,
    ) -> Result<(), BotError> {
        let links = self.sources.movies.links(link).await?;
        if links.is_empty() {
            return Err(BotError::NoLinks);
        }
        self.ensure_not_replaced(&msg.conversation_id, origin).await?;
        self.messenger
            .send_text(&msg.conversation_id, &format::link_list(&links), None)
            .await?;
        Ok(())
    }
}
