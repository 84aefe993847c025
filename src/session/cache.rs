//! 结果缓存
//!
//! 每个会话最多保存一份最近的候选列表（SearchSession），带创建时间与过期判断：
//! - put：无条件替换，重置创建时间
//! - get：仅返回未过期的会话，读到过期项时顺带删除
//! - clear：幂等删除；clear_if 只删除指定代次，避免误删新搜索
//! - current_generation：排队任务据此判断自己的搜索是否已被替换

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use super::candidate::{Candidate, ConversationId};

/// 进程内全局递增的会话代次（跨缓存槽位可比较先后）
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// 一次搜索产生的会话
#[derive(Debug, Clone)]
pub struct SearchSession {
    pub conversation_id: ConversationId,
    /// 展示顺序即选择编号
    pub items: Vec<Candidate>,
    pub created_at: Instant,
    /// 标识「这一次」搜索；重新搜索会得到更大的代次
    pub generation: u64,
}

impl SearchSession {
    /// 按 1 开始的编号取候选
    pub fn item(&self, choice: usize) -> Option<&Candidate> {
        choice.checked_sub(1).and_then(|i| self.items.get(i))
    }

    /// 会话是否过期
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }
}

/// 会话 -> 搜索结果 的缓存
pub struct ResultCache {
    sessions: RwLock<HashMap<ConversationId, SearchSession>>,
    ttl: Duration,
    max_items: usize,
}

impl ResultCache {
    pub fn new(ttl: Duration, max_items: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            max_items: max_items.max(1),
        }
    }

    /// 写入新会话，替换同一会话已有的搜索；返回新代次
    pub async fn put(&self, conversation_id: &str, mut items: Vec<Candidate>) -> u64 {
        items.truncate(self.max_items);
        let generation = next_generation();
        let session = SearchSession {
            conversation_id: conversation_id.to_string(),
            items,
            created_at: Instant::now(),
            generation,
        };
        let replaced = self
            .sessions
            .write()
            .await
            .insert(conversation_id.to_string(), session);
        if let Some(old) = replaced {
            tracing::debug!(
                conversation = %conversation_id,
                old_generation = old.generation,
                generation,
                "search session replaced"
            );
        }
        generation
    }

    /// 获取未过期的会话；过期项会被移除
    pub async fn get(&self, conversation_id: &str) -> Option<SearchSession> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(conversation_id) {
                None => return None,
                Some(s) if !s.is_expired(self.ttl) => return Some(s.clone()),
                Some(_) => {}
            }
        }

        let mut sessions = self.sessions.write().await;
        // 释放读锁后可能已被替换，重新检查
        match sessions.get(conversation_id) {
            Some(s) if !s.is_expired(self.ttl) => Some(s.clone()),
            Some(_) => {
                sessions.remove(conversation_id);
                tracing::debug!(conversation = %conversation_id, "expired search session evicted");
                None
            }
            None => None,
        }
    }

    /// 删除会话（不存在时无操作）
    pub async fn clear(&self, conversation_id: &str) {
        self.sessions.write().await.remove(conversation_id);
    }

    /// 仅当当前会话仍是指定代次时删除；返回是否删除
    pub async fn clear_if(&self, conversation_id: &str, generation: u64) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(conversation_id) {
            Some(s) if s.generation == generation => {
                sessions.remove(conversation_id);
                true
            }
            _ => false,
        }
    }

    /// 该会话当前搜索的代次（不判断是否过期：选择发生在有效期内，执行可能更晚）
    pub async fn current_generation(&self, conversation_id: &str) -> Option<u64> {
        self.sessions
            .read()
            .await
            .get(conversation_id)
            .map(|s| s.generation)
    }

    /// 清理所有过期会话，返回清理数量
    pub async fn sweep_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(self.ttl));
        before - sessions.len()
    }

    /// 当前缓存的会话数（含尚未清理的过期项）
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
