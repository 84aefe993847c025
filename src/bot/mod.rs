//! 对话机器人：消息分类后分派到搜索 / 选择 / 获取
//!
//! - 命令：立即执行搜索工作流，写入结果缓存并回复编号列表
//! - 数字：解析到活跃会话中的候选，按值捕获后交给 TaskSerializer 串行执行获取
//! - 每一步的错误在这里统一转换为回复，不会逃逸到事件循环

mod format;
mod info;
mod movie;
mod play;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::AbortHandle;

use crate::config::AppConfig;
use crate::core::{BotError, TaskSerializer, ToolError};
use crate::messaging::{InboundMessage, Messenger};
use crate::router::{Inbound, Triggers, Workflow};
use crate::session::{Candidate, SessionSlot, SessionSlots};
use crate::tools::{MediaSource, MetadataSource, MovieSource, OmdbSource, ScraperSource, YtDlpSource};

/// 三类外部工具
#[derive(Clone)]
pub struct Sources {
    pub media: Arc<dyn MediaSource>,
    pub movies: Arc<dyn MovieSource>,
    pub metadata: Arc<dyn MetadataSource>,
}

impl Sources {
    /// 按配置创建 yt-dlp / 爬虫脚本 / OMDb 适配器
    pub fn from_config(cfg: &AppConfig) -> Result<Self, ToolError> {
        let search_timeout = Duration::from_secs(cfg.tools.search_timeout_secs);
        let fetch_timeout = Duration::from_secs(cfg.tools.fetch_timeout_secs);
        Ok(Self {
            media: Arc::new(YtDlpSource::new(
                cfg.tools.ytdlp.clone(),
                search_timeout,
                fetch_timeout,
            )),
            movies: Arc::new(ScraperSource::new(
                &cfg.tools.scraper,
                search_timeout,
                fetch_timeout,
            )),
            metadata: Arc::new(OmdbSource::new(&cfg.tools.metadata, search_timeout)?),
        })
    }
}

/// 工作流参数
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub downloads_dir: PathBuf,
    pub voice_note_threshold_bytes: u64,
    /// 向搜索工具请求的原始结果数（过滤前）
    pub search_limit: usize,
    /// 展示的最大候选数
    pub max_results: usize,
}

impl BotSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            downloads_dir: cfg.app.downloads_dir.clone(),
            voice_note_threshold_bytes: cfg.delivery.voice_note_threshold_bytes(),
            search_limit: cfg.tools.ytdlp.search_limit,
            max_results: cfg.session.max_results.clamp(1, 9),
        }
    }
}

/// 出错时所处的步骤，决定回复文案
#[derive(Debug, Clone, Copy)]
enum Step {
    Search(Workflow),
    Fetch(Workflow),
    Select,
}

/// 候选来自哪个工作流
fn workflow_of(candidate: &Candidate) -> Workflow {
    match candidate {
        Candidate::Track { .. } => Workflow::Play,
        Candidate::Movie { .. } => Workflow::Movie,
        Candidate::Title { .. } => Workflow::Info,
    }
}

/// 结果缓存槽位
fn slot_of(workflow: Workflow) -> SessionSlot {
    match workflow {
        Workflow::Play | Workflow::Movie => SessionSlot::Search,
        Workflow::Info => SessionSlot::Lookup,
    }
}

pub struct Bot {
    messenger: Arc<dyn Messenger>,
    sources: Sources,
    triggers: Triggers,
    sessions: SessionSlots,
    serializer: Arc<TaskSerializer>,
    settings: BotSettings,
}

impl Bot {
    pub fn new(messenger: Arc<dyn Messenger>, sources: Sources, cfg: &AppConfig) -> Self {
        let settings = BotSettings::from_config(cfg);
        Self {
            messenger,
            sources,
            triggers: Triggers::new(&cfg.triggers, settings.max_results),
            sessions: SessionSlots::new(cfg.session.ttl(), settings.max_results),
            serializer: Arc::new(TaskSerializer::new(cfg.tools.max_concurrent)),
            settings,
        }
    }

    pub fn sessions(&self) -> &SessionSlots {
        &self.sessions
    }

    pub fn serializer(&self) -> &Arc<TaskSerializer> {
        &self.serializer
    }

    /// 处理一条入站消息；返回时该消息触发的工作（含排队的获取）已全部结束
    pub async fn handle(self: &Arc<Self>, msg: InboundMessage) {
        match self.triggers.classify(&msg.body) {
            Inbound::Command { workflow, query } => {
                tracing::info!(
                    conversation = %msg.conversation_id,
                    workflow = workflow.name(),
                    "search: {}",
                    query
                );
                let result = match workflow {
                    Workflow::Play => self.search_tracks(&msg, &query).await,
                    Workflow::Movie => self.search_movies(&msg, &query).await,
                    Workflow::Info => self.search_titles(&msg, &query).await,
                };
                self.finish(&msg, Step::Search(workflow), result).await;
            }
            Inbound::Usage(workflow) => {
                let text = format::usage(workflow, self.triggers.keyword(workflow));
                self.notify(&msg, &text).await;
            }
            Inbound::Selection(choice) => self.select(&msg, choice).await,
            Inbound::OutOfRange(choice) => {
                let err = match self.sessions.active(&msg.conversation_id).await {
                    Some((_, session)) => BotError::InvalidChoice {
                        choice,
                        max: session.items.len(),
                    },
                    None => BotError::NoActiveSearch,
                };
                self.finish(&msg, Step::Select, Err(err)).await;
            }
            Inbound::Unrecognized => {}
        }
    }

    /// 数字回复：取候选（按值），在会话队列中执行获取并等待其结束
    async fn select(self: &Arc<Self>, msg: &InboundMessage, choice: usize) {
        let conversation_id = &msg.conversation_id;
        let Some((slot, session)) = self.sessions.active(conversation_id).await else {
            self.finish(msg, Step::Select, Err(BotError::NoActiveSearch)).await;
            return;
        };
        let Some(candidate) = session.item(choice).cloned() else {
            let err = BotError::InvalidChoice {
                choice,
                max: session.items.len(),
            };
            self.finish(msg, Step::Select, Err(err)).await;
            return;
        };

        let workflow = workflow_of(&candidate);
        let generation = session.generation;
        tracing::info!(
            conversation = %conversation_id,
            workflow = workflow.name(),
            choice,
            generation,
            "selected: {}",
            candidate.title()
        );

        let bot = Arc::clone(self);
        let owned = msg.clone();
        let handle = self.serializer.enqueue(conversation_id, async move {
            let result = bot.run_fetch(&owned, slot, generation, candidate).await;
            bot.finish(&owned, Step::Fetch(workflow), result).await;
        });
        // 事件循环关闭超时中止本任务时，排队中的获取一并中止
        let _abort = AbortOnDrop(handle.abort_handle());
        if let Err(e) = handle.await {
            tracing::error!(conversation = %conversation_id, "fetch task panicked: {}", e);
            self.sessions.cache(slot).clear_if(conversation_id, generation).await;
            self.notify(msg, format::GENERIC_ERROR).await;
        }
    }

    /// 队列中执行的获取：开始前确认会话仍在且未被替换，结束后按工作流决定是否清除会话
    async fn run_fetch(
        &self,
        msg: &InboundMessage,
        slot: SessionSlot,
        generation: u64,
        candidate: Candidate,
    ) -> Result<(), BotError> {
        let conversation_id = &msg.conversation_id;
        let cache = self.sessions.cache(slot);
        match cache.current_generation(conversation_id).await {
            Some(current) if current == generation => {}
            Some(_) => return Err(BotError::Superseded),
            // 前一个获取成功后已清除，或排队期间过期
            None => return Err(BotError::NoActiveSearch),
        }

        self.notify(msg, &format::working(&candidate)).await;
        let origin = Some((slot, generation));
        let workflow = workflow_of(&candidate);
        let started = std::time::Instant::now();
        let result = match &candidate {
            Candidate::Track { title, url, .. } => self.fetch_track(msg, origin, title, url).await,
            Candidate::Movie { link, .. } => self.fetch_links(msg, origin, link).await,
            Candidate::Title { imdb_id, .. } => self.fetch_details(msg, origin, imdb_id).await,
        };
        tracing::info!(
            conversation = %conversation_id,
            workflow = workflow.name(),
            duration_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "fetch finished"
        );

        match &result {
            Ok(()) => {
                cache.clear_if(conversation_id, generation).await;
            }
            Err(BotError::Superseded) => {}
            // 音频列表保留，便于换一个编号重试
            Err(_) if workflow == Workflow::Play => {}
            Err(_) => {
                cache.clear_if(conversation_id, generation).await;
            }
        }
        result
    }

    /// 交付前检查：所属会话已被另一次搜索替换时放弃交付（会话被清理或过期则照常交付）
    async fn ensure_not_replaced(
        &self,
        conversation_id: &str,
        origin: Option<(SessionSlot, u64)>,
    ) -> Result<(), BotError> {
        let Some((slot, generation)) = origin else {
            return Ok(());
        };
        match self.sessions.cache(slot).current_generation(conversation_id).await {
            Some(current) if current != generation => Err(BotError::Superseded),
            _ => Ok(()),
        }
    }

    /// 工作流边界：把错误转换为一条回复
    async fn finish(&self, msg: &InboundMessage, step: Step, result: Result<(), BotError>) {
        let Err(err) = result else {
            return;
        };
        let conversation_id = &msg.conversation_id;

        if let BotError::Transport(e) = &err {
            tracing::error!(conversation = %conversation_id, ?step, "reply failed: {}", e);
            return;
        }
        if err.is_user_error() {
            tracing::debug!(conversation = %conversation_id, ?step, "{}", err);
        } else {
            tracing::error!(conversation = %conversation_id, ?step, error = %err, "workflow failed");
        }

        let text = match (&err, step) {
            (BotError::EmptyQuery, Step::Search(w)) => format::usage(w, self.triggers.keyword(w)),
            (BotError::InvalidQuery(_), _) => format::INVALID_QUERY.to_string(),
            (BotError::InvalidChoice { max, .. }, _) => format::invalid_choice(*max),
            (BotError::NoActiveSearch, _) => format::NO_ACTIVE_SEARCH.to_string(),
            (BotError::Superseded, _) => format::SUPERSEDED.to_string(),
            (BotError::NoResults, Step::Search(w) | Step::Fetch(w)) => {
                format::no_results(w).to_string()
            }
            (BotError::NoLinks, _) => format::NO_LINKS.to_string(),
            (BotError::Tool(_), Step::Search(w)) => format::search_failed(w).to_string(),
            (BotError::Tool(_), Step::Fetch(w)) => format::fetch_failed(w).to_string(),
            _ => format::GENERIC_ERROR.to_string(),
        };
        self.notify(msg, &text).await;
    }

    /// 发送一条提示；失败只记录
    async fn notify(&self, msg: &InboundMessage, text: &str) {
        if let Err(e) = self
            .messenger
            .send_text(&msg.conversation_id, text, None)
            .await
        {
            tracing::warn!(conversation = %msg.conversation_id, "notify failed: {}", e);
        }
    }
}

/// drop 时中止对应任务；任务已结束时无影响
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// 校验用户搜索词：空白 → EmptyQuery，其余不合规 → InvalidQuery
fn checked_query(raw: &str) -> Result<String, BotError> {
    if raw.trim().is_empty() {
        return Err(BotError::EmptyQuery);
    }
    crate::tools::args::validate_query(raw).map_err(|e| BotError::InvalidQuery(e.to_string()))
}
