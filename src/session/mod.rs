//! 会话状态：候选结果、结果缓存、两个缓存槽位
//!
//! .play / .movie 共用 Search 槽位，.info 使用独立的 Lookup 槽位，互不覆盖。
//! 数字回复时若两个槽位都有活跃会话，以最近写入（代次更大）的为准。

pub mod cache;
pub mod candidate;

use std::time::Duration;

pub use cache::{ResultCache, SearchSession};
pub use candidate::{Candidate, ConversationId};

/// 缓存槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionSlot {
    /// .play / .movie
    Search,
    /// .info
    Lookup,
}

/// 两个槽位的结果缓存
pub struct SessionSlots {
    search: ResultCache,
    lookup: ResultCache,
}

impl SessionSlots {
    pub fn new(ttl: Duration, max_items: usize) -> Self {
        Self {
            search: ResultCache::new(ttl, max_items),
            lookup: ResultCache::new(ttl, max_items),
        }
    }

    pub fn cache(&self, slot: SessionSlot) -> &ResultCache {
        match slot {
            SessionSlot::Search => &self.search,
            SessionSlot::Lookup => &self.lookup,
        }
    }

    /// 数字回复应解析到的会话：两个槽位都活跃时取代次更大的一个
    pub async fn active(&self, conversation_id: &str) -> Option<(SessionSlot, SearchSession)> {
        let search = self.search.get(conversation_id).await;
        let lookup = self.lookup.get(conversation_id).await;
        match (search, lookup) {
            (Some(s), Some(l)) if l.generation > s.generation => Some((SessionSlot::Lookup, l)),
            (Some(s), _) => Some((SessionSlot::Search, s)),
            (None, Some(l)) => Some((SessionSlot::Lookup, l)),
            (None, None) => None,
        }
    }

    /// 清理两个槽位中的过期会话
    pub async fn sweep_expired(&self) -> usize {
        self.search.sweep_expired().await + self.lookup.sweep_expired().await
    }
}
