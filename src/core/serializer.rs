//! 任务串行器：同一会话的长耗时操作按提交顺序逐个执行
//!
//! 每个会话维护一条「链」：入队时取走上一个任务的完成信号并登记自己的，
//! 新任务在前一个任务结束（成功、失败或 panic）之后才开始。不同会话之间完全并行，
//! 仅受全局工具许可（Semaphore）限制。

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::session::ConversationId;

/// 某会话链尾：最后入队任务的编号与完成信号
struct Tail {
    ticket: u64,
    done: oneshot::Receiver<()>,
}

/// 按会话串行、跨会话并行的任务队列
pub struct TaskSerializer {
    tails: Mutex<HashMap<ConversationId, Tail>>,
    /// 外部工具并发限制（默认 3）
    tool_permits: Arc<Semaphore>,
    next_ticket: AtomicU64,
}

impl TaskSerializer {
    pub fn new(max_concurrent_tools: usize) -> Self {
        Self {
            tails: Mutex::new(HashMap::new()),
            tool_permits: Arc::new(Semaphore::new(max_concurrent_tools.max(1))),
            next_ticket: AtomicU64::new(0),
        }
    }

    fn lock_tails(&self) -> MutexGuard<'_, HashMap<ConversationId, Tail>> {
        self.tails.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 入队：返回的 JoinHandle 在该任务执行完毕后完成
    ///
    /// 任务在同一会话此前入队的所有任务结束后才开始，并在执行期间持有一个工具许可。
    pub fn enqueue<F, T>(self: &Arc<Self>, conversation_id: &str, work: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = oneshot::channel();
        let previous = self.lock_tails().insert(
            conversation_id.to_string(),
            Tail {
                ticket,
                done: done_rx,
            },
        );
        if previous.is_some() {
            tracing::debug!(conversation = %conversation_id, ticket, "work queued behind previous");
        }

        let guard = TailGuard {
            serializer: Arc::clone(self),
            conversation_id: conversation_id.to_string(),
            ticket,
            done: Some(done_tx),
        };
        let permits = Arc::clone(&self.tool_permits);

        tokio::spawn(async move {
            let _guard = guard;
            if let Some(prev) = previous {
                // 发送端被丢弃（前一个任务 panic）同样视为完成
                let _ = prev.done.await;
            }
            let _permit = permits.acquire_owned().await.ok();
            work.await
        })
    }

    /// 只占用一个工具许可、不进入会话链（搜索类调用）；许可在返回值 drop 时归还
    pub async fn tool_permit(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.tool_permits).acquire_owned().await.ok()
    }

    /// 该会话是否有尚未结束的任务
    pub fn is_busy(&self, conversation_id: &str) -> bool {
        self.lock_tails().contains_key(conversation_id)
    }

    /// 有未结束任务的会话数
    pub fn busy_conversations(&self) -> usize {
        self.lock_tails().len()
    }

    fn release(&self, conversation_id: &str, ticket: u64) {
        let mut tails = self.lock_tails();
        if tails.get(conversation_id).is_some_and(|t| t.ticket == ticket) {
            tails.remove(conversation_id);
        }
    }
}

impl Default for TaskSerializer {
    fn default() -> Self {
        Self::new(3)
    }
}

/// 任务结束（含 panic 展开）时：若自己仍是链尾则移除，并通知下一个任务
struct TailGuard {
    serializer: Arc<TaskSerializer>,
    conversation_id: ConversationId,
    ticket: u64,
    done: Option<oneshot::Sender<()>>,
}

impl Drop for TailGuard {
    fn drop(&mut self) {
        self.serializer.release(&self.conversation_id, self.ticket);
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}
