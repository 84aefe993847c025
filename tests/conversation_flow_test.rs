//! 会话流程集成测试：录制回复的 Messenger + 脚本化的外部工具

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chatpick::config::AppConfig;
use chatpick::core::{ToolError, TransportError};
use chatpick::messaging::{Attachment, InboundMessage, MessageRef, Messenger};
use chatpick::session::SessionSlot;
use chatpick::tools::{
    MediaSource, MetadataSource, MovieHit, MovieSource, TempArtifact, TitleDetails, TitleHit,
    TrackHit,
};
use chatpick::{driver, Bot, Sources};
use tokio_util::sync::CancellationToken;

const CHAT: &str = "15550001111";

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Text(String),
    Binary {
        filename: String,
        size: usize,
        voice_note: bool,
        quoted: Option<String>,
    },
    Image {
        url: String,
        caption: String,
    },
    Reaction {
        emoji: String,
        target: String,
    },
}

#[derive(Default)]
struct RecordingMessenger {
    sent: Mutex<Vec<(String, Sent)>>,
    fail_images: bool,
    fail_binary: bool,
    /// 以该前缀开头的文本发送失败
    fail_text_prefix: Option<&'static str>,
}

impl RecordingMessenger {
    fn sent(&self, conversation_id: &str) -> Vec<Sent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == conversation_id)
            .map(|(_, s)| s.clone())
            .collect()
    }

    fn texts(&self, conversation_id: &str) -> Vec<String> {
        self.sent(conversation_id)
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    fn last_text(&self, conversation_id: &str) -> String {
        self.texts(conversation_id).pop().unwrap_or_default()
    }

    fn record(&self, to: &str, sent: Sent) {
        self.sent.lock().unwrap().push((to.to_string(), sent));
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(
        &self,
        to: &str,
        text: &str,
        _quoted: Option<&MessageRef>,
    ) -> Result<(), TransportError> {
        if self.fail_text_prefix.is_some_and(|p| text.starts_with(p)) {
            return Err(TransportError::Request("connection reset".into()));
        }
        self.record(to, Sent::Text(text.to_string()));
        Ok(())
    }

    async fn send_binary(
        &self,
        to: &str,
        attachment: Attachment,
        quoted: Option<&MessageRef>,
    ) -> Result<(), TransportError> {
        if self.fail_binary {
            return Err(TransportError::Api {
                status: 413,
                body: "media too large".into(),
            });
        }
        self.record(
            to,
            Sent::Binary {
                filename: attachment.filename,
                size: attachment.bytes.len(),
                voice_note: attachment.voice_note,
                quoted: quoted.cloned(),
            },
        );
        Ok(())
    }

    async fn send_image(&self, to: &str, image_url: &str, caption: &str) -> Result<(), TransportError> {
        if self.fail_images {
            return Err(TransportError::Api {
                status: 400,
                body: "media url unreachable".into(),
            });
        }
        self.record(
            to,
            Sent::Image {
                url: image_url.to_string(),
                caption: caption.to_string(),
            },
        );
        Ok(())
    }

    async fn send_reaction(
        &self,
        to: &str,
        emoji: &str,
        target: &MessageRef,
    ) -> Result<(), TransportError> {
        self.record(
            to,
            Sent::Reaction {
                emoji: emoji.to_string(),
                target: target.clone(),
            },
        );
        Ok(())
    }
}

/// 脚本化的音频来源：固定搜索结果，下载写入指定大小的文件
#[derive(Default)]
struct FakeMedia {
    hits: Vec<TrackHit>,
    artifact_size: usize,
    delay: Duration,
    fail_download: bool,
    panic_download: bool,
    searches: AtomicUsize,
    downloads: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

#[async_trait]
impl MediaSource for FakeMedia {
    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<TrackHit>, ToolError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self.hits.iter().take(limit).cloned().collect())
    }

    async fn download(&self, url: &str, artifact: &TempArtifact) -> Result<(), ToolError> {
        if self.panic_download {
            panic!("downloader crashed");
        }
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.downloads.lock().unwrap().push(url.to_string());
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail_download {
            return Err(ToolError::Failed {
                tool: "yt-dlp".into(),
                status: "exit status: 1".into(),
                stderr: "ERROR: secret stderr detail".into(),
            });
        }
        tokio::fs::write(artifact.path(), vec![0u8; self.artifact_size]).await?;
        Ok(())
    }
}

/// 脚本化的影片来源：按查询返回结果
#[derive(Default)]
struct FakeMovies {
    hits: HashMap<String, Vec<MovieHit>>,
    links: Vec<String>,
    delay: Duration,
    fail_search: bool,
    fetched: Mutex<Vec<String>>,
}

#[async_trait]
impl MovieSource for FakeMovies {
    async fn search(&self, query: &str) -> Result<Vec<MovieHit>, ToolError> {
        if self.fail_search {
            return Err(ToolError::Failed {
                tool: "python3".into(),
                status: "exit status: 2".into(),
                stderr: "Traceback: boom".into(),
            });
        }
        Ok(self.hits.get(query).cloned().unwrap_or_default())
    }

    async fn links(&self, link: &str) -> Result<Vec<String>, ToolError> {
        self.fetched.lock().unwrap().push(link.to_string());
        tokio::time::sleep(self.delay).await;
        Ok(self.links.clone())
    }
}

/// 脚本化的元数据来源
#[derive(Default)]
struct FakeMetadata {
    hits: Vec<TitleHit>,
    details: HashMap<String, TitleDetails>,
    looked_up: Mutex<Vec<String>>,
}

#[async_trait]
impl MetadataSource for FakeMetadata {
    async fn search(&self, _title: &str) -> Result<Vec<TitleHit>, ToolError> {
        Ok(self.hits.clone())
    }

    async fn details(&self, imdb_id: &str) -> Result<TitleDetails, ToolError> {
        self.looked_up.lock().unwrap().push(imdb_id.to_string());
        self.details
            .get(imdb_id)
            .cloned()
            .ok_or_else(|| ToolError::Http(format!("unknown id {}", imdb_id)))
    }
}

fn track(n: usize) -> TrackHit {
    TrackHit {
        title: format!("Song {}", n),
        url: Some(format!("https://www.youtube.com/watch?v=v{}", n)),
        duration: Some("3:53".into()),
        is_live: false,
    }
}

fn title_hit(n: usize, kind: &str) -> TitleHit {
    TitleHit {
        title: format!("Inception {}", n),
        year: "2010".into(),
        imdb_id: format!("tt{:07}", n),
        kind: kind.into(),
    }
}

fn details(n: usize, poster: Option<&str>) -> TitleDetails {
    TitleDetails {
        title: format!("Inception {}", n),
        year: "2010".into(),
        rating: Some("8.8".into()),
        plot: Some("A thief who steals corporate secrets.".into()),
        poster: poster.map(String::from),
        ..Default::default()
    }
}

fn matrix() -> MovieHit {
    MovieHit {
        link: "link1".into(),
        title: "The Matrix".into(),
        year: "1999".into(),
        quality: "1080p".into(),
    }
}

struct Harness {
    bot: Arc<Bot>,
    messenger: Arc<RecordingMessenger>,
    downloads: tempfile::TempDir,
}

impl Harness {
    fn new(media: Arc<FakeMedia>, movies: Arc<FakeMovies>, metadata: Arc<FakeMetadata>) -> Self {
        Self::with_messenger(RecordingMessenger::default(), media, movies, metadata)
    }

    fn with_messenger(
        messenger: RecordingMessenger,
        media: Arc<FakeMedia>,
        movies: Arc<FakeMovies>,
        metadata: Arc<FakeMetadata>,
    ) -> Self {
        let downloads = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.app.downloads_dir = downloads.path().to_path_buf();
        let messenger = Arc::new(messenger);
        let sources = Sources {
            media,
            movies,
            metadata,
        };
        let bot = Arc::new(Bot::new(messenger.clone(), sources, &cfg));
        Self {
            bot,
            messenger,
            downloads,
        }
    }

    async fn say(&self, body: &str) {
        self.bot.handle(InboundMessage::new(CHAT, body)).await;
    }

    async fn say_with_ref(&self, body: &str, message_ref: &str) {
        self.bot
            .handle(InboundMessage::new(CHAT, body).with_ref(message_ref))
            .await;
    }

    fn leftover_files(&self) -> usize {
        std::fs::read_dir(self.downloads.path()).unwrap().count()
    }
}

#[tokio::test]
async fn test_play_selection_delivers_voice_note_and_clears_session() {
    let media = Arc::new(FakeMedia {
        hits: vec![
            track(1),
            TrackHit {
                is_live: true,
                ..track(9)
            },
            track(2),
            track(3),
        ],
        artifact_size: 40 * 1024 * 1024,
        ..Default::default()
    });
    let h = Harness::new(media.clone(), Default::default(), Default::default());

    h.say_with_ref(".play shape of you", "m1").await;
    let list = h.messenger.last_text(CHAT);
    assert!(list.contains("*Results for:* shape of you"));
    assert!(list.contains("1. Song 1 (3:53)"));
    assert!(list.contains("2. Song 2 (3:53)"));
    assert!(list.contains("3. Song 3 (3:53)"));
    assert!(!list.contains("4."));
    assert!(!list.contains("Song 9"));

    h.say_with_ref("2", "m2").await;
    assert_eq!(
        *media.downloads.lock().unwrap(),
        vec!["https://www.youtube.com/watch?v=v2".to_string()]
    );
    let sent = h.messenger.sent(CHAT);
    assert!(sent.contains(&Sent::Text("⬇️ Downloading:\n*Song 2*".into())));
    assert!(sent.contains(&Sent::Binary {
        filename: "Song 2.mp3".into(),
        size: 40 * 1024 * 1024,
        voice_note: true,
        quoted: Some("m2".into()),
    }));
    assert_eq!(
        sent.last(),
        Some(&Sent::Reaction {
            emoji: "✅".into(),
            target: "m2".into(),
        })
    );
    assert_eq!(h.leftover_files(), 0);
    assert!(h.bot.sessions().active(CHAT).await.is_none());

    h.say("2").await;
    assert!(h.messenger.last_text(CHAT).contains("Search expired"));
}

#[tokio::test]
async fn test_small_audio_is_sent_as_regular_file() {
    let media = Arc::new(FakeMedia {
        hits: vec![track(1)],
        artifact_size: 3 * 1024 * 1024,
        ..Default::default()
    });
    let h = Harness::new(media, Default::default(), Default::default());

    h.say(".play small").await;
    h.say("1").await;
    let binary = h
        .messenger
        .sent(CHAT)
        .into_iter()
        .find(|s| matches!(s, Sent::Binary { .. }))
        .unwrap();
    assert!(matches!(
        binary,
        Sent::Binary {
            voice_note: false,
            ..
        }
    ));
}

#[tokio::test]
async fn test_movie_selection_lists_links_and_clears_session() {
    let movies = Arc::new(FakeMovies {
        hits: HashMap::from([("Matrix".to_string(), vec![matrix()])]),
        links: vec![
            "https://dl.example/matrix-720p.mp4".into(),
            "https://dl.example/matrix-1080p.mp4".into(),
        ],
        ..Default::default()
    });
    let h = Harness::new(Default::default(), movies.clone(), Default::default());

    h.say(".movie Matrix").await;
    let texts = h.messenger.texts(CHAT);
    assert_eq!(texts[0], "🔎 Searching *Matrix*...");
    assert!(texts[1].contains("Reply with 1–1"));
    assert!(texts[1].contains("1. The Matrix (1999) | 1080p"));
    assert!(!texts[1].contains("2."));

    h.say("1").await;
    assert_eq!(*movies.fetched.lock().unwrap(), vec!["link1".to_string()]);
    let texts = h.messenger.texts(CHAT);
    assert!(texts.contains(&"🎬 Fetching *The Matrix*...".to_string()));
    assert_eq!(
        h.messenger.last_text(CHAT),
        "🎬 Download Links:\n\n1. https://dl.example/matrix-720p.mp4\n2. https://dl.example/matrix-1080p.mp4\n"
    );
    assert!(h.bot.sessions().active(CHAT).await.is_none());
}

#[tokio::test]
async fn test_info_out_of_range_keeps_session() {
    let metadata = Arc::new(FakeMetadata {
        hits: (1..=5).map(|n| title_hit(n, "movie")).collect(),
        details: HashMap::from([(
            "tt0000003".to_string(),
            details(3, Some("https://img.example/p3.jpg")),
        )]),
        ..Default::default()
    });
    let h = Harness::new(Default::default(), Default::default(), metadata.clone());

    h.say(".info Inception").await;
    assert!(h.messenger.last_text(CHAT).contains("5. Inception 5 (2010) [movie]"));

    h.say("9").await;
    assert_eq!(h.messenger.last_text(CHAT), "Choose a number between 1 and 5.");
    let (slot, session) = h.bot.sessions().active(CHAT).await.unwrap();
    assert_eq!(slot, SessionSlot::Lookup);
    assert_eq!(session.items.len(), 5);
    assert!(metadata.looked_up.lock().unwrap().is_empty());

    h.say("3").await;
    assert_eq!(*metadata.looked_up.lock().unwrap(), vec!["tt0000003".to_string()]);
    match h.messenger.sent(CHAT).last().unwrap() {
        Sent::Image { url, caption } => {
            assert_eq!(url, "https://img.example/p3.jpg");
            assert!(caption.starts_with("🎬 *Inception 3* (2010)"));
        }
        other => panic!("expected poster image, got {:?}", other),
    }
    assert!(h.bot.sessions().active(CHAT).await.is_none());
}

#[tokio::test]
async fn test_info_single_candidate_short_circuits() {
    let metadata = Arc::new(FakeMetadata {
        hits: vec![title_hit(1, "movie"), title_hit(2, "game")],
        details: HashMap::from([("tt0000001".to_string(), details(1, None))]),
        ..Default::default()
    });
    let h = Harness::new(Default::default(), Default::default(), metadata);

    h.say(".info Inception").await;
    let texts = h.messenger.texts(CHAT);
    assert_eq!(texts.len(), 1);
    assert!(texts[0].starts_with("🎬 *Inception 1* (2010)"));
    assert!(texts[0].contains("⭐ Rating: 8.8"));
    assert!(h.bot.sessions().cache(SessionSlot::Lookup).is_empty().await);
}

#[tokio::test]
async fn test_info_poster_failure_falls_back_to_text() {
    let metadata = Arc::new(FakeMetadata {
        hits: vec![title_hit(1, "movie")],
        details: HashMap::from([(
            "tt0000001".to_string(),
            details(1, Some("https://img.example/broken.jpg")),
        )]),
        ..Default::default()
    });
    let messenger = RecordingMessenger {
        fail_images: true,
        ..Default::default()
    };
    let h = Harness::with_messenger(messenger, Default::default(), Default::default(), metadata);

    h.say(".info Inception").await;
    assert!(h.messenger.last_text(CHAT).starts_with("🎬 *Inception 1* (2010)"));
}

#[tokio::test]
async fn test_info_only_games_reports_no_results() {
    let metadata = Arc::new(FakeMetadata {
        hits: vec![title_hit(1, "game")],
        ..Default::default()
    });
    let h = Harness::new(Default::default(), Default::default(), metadata);

    h.say(".info Inception").await;
    assert_eq!(h.messenger.texts(CHAT), vec!["❌ No titles found.".to_string()]);
    assert!(h.bot.sessions().active(CHAT).await.is_none());
}

#[tokio::test]
async fn test_selection_without_session_replies_once() {
    let h = Harness::new(Default::default(), Default::default(), Default::default());

    h.say("1").await;
    let texts = h.messenger.texts(CHAT);
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("Search expired"));

    h.say("7").await;
    assert_eq!(h.messenger.texts(CHAT).len(), 2);
    assert!(h.messenger.last_text(CHAT).contains("Search expired"));
}

#[tokio::test]
async fn test_noise_and_usage() {
    let media = Arc::new(FakeMedia::default());
    let h = Harness::new(media.clone(), Default::default(), Default::default());

    h.say("hello there").await;
    h.say("12").await;
    assert!(h.messenger.sent(CHAT).is_empty());

    h.say(".play").await;
    assert!(h.messenger.last_text(CHAT).contains(".play shape of you"));
    h.say(".movie").await;
    assert_eq!(h.messenger.last_text(CHAT), "🎬 Usage: .movie <name>");
    assert_eq!(media.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_option_like_query_never_reaches_tool() {
    let media = Arc::new(FakeMedia {
        hits: vec![track(1)],
        ..Default::default()
    });
    let h = Harness::new(media.clone(), Default::default(), Default::default());

    h.say(".play --exec rm").await;
    assert!(h.messenger.last_text(CHAT).contains("can't be searched"));
    assert_eq!(media.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_search_failure_is_generic_and_creates_no_session() {
    let movies = Arc::new(FakeMovies {
        fail_search: true,
        ..Default::default()
    });
    let h = Harness::new(Default::default(), movies, Default::default());

    h.say(".movie Matrix").await;
    let last = h.messenger.last_text(CHAT);
    assert_eq!(last, "❌ Error occurred.");
    assert!(!h.messenger.texts(CHAT).iter().any(|t| t.contains("boom")));
    assert!(h.bot.sessions().active(CHAT).await.is_none());
}

#[tokio::test]
async fn test_fetches_in_one_conversation_never_overlap() {
    let media = Arc::new(FakeMedia {
        hits: vec![track(1), track(2), track(3)],
        delay: Duration::from_millis(50),
        fail_download: true,
        ..Default::default()
    });
    let h = Harness::new(media.clone(), Default::default(), Default::default());
    h.say(".play overlap").await;

    let selections = ["1", "2", "3"].map(|n| {
        let bot = Arc::clone(&h.bot);
        async move { bot.handle(InboundMessage::new(CHAT, n)).await }
    });
    futures_util::future::join_all(selections).await;

    assert_eq!(media.downloads.lock().unwrap().len(), 3);
    assert_eq!(media.max_active.load(Ordering::SeqCst), 1);
    let failures = h
        .messenger
        .texts(CHAT)
        .into_iter()
        .filter(|t| t == "❌ Failed to download or send audio.")
        .count();
    assert_eq!(failures, 3);
    assert!(!h.messenger.texts(CHAT).iter().any(|t| t.contains("secret stderr")));
    // 下载失败不清除音频列表
    assert!(h.bot.sessions().active(CHAT).await.is_some());
    assert_eq!(h.leftover_files(), 0);
}

#[tokio::test]
async fn test_selection_queued_behind_finished_fetch_reports_expired() {
    let media = Arc::new(FakeMedia {
        hits: vec![track(1), track(2)],
        artifact_size: 1024,
        delay: Duration::from_millis(100),
        ..Default::default()
    });
    let h = Harness::new(media.clone(), Default::default(), Default::default());
    h.say(".play x").await;

    let selections = ["1", "2"].map(|n| {
        let bot = Arc::clone(&h.bot);
        async move { bot.handle(InboundMessage::new(CHAT, n)).await }
    });
    futures_util::future::join_all(selections).await;

    // 第一个获取成功并清除了列表，第二个不再执行
    assert_eq!(media.downloads.lock().unwrap().len(), 1);
    let texts = h.messenger.texts(CHAT);
    assert_eq!(texts.last().unwrap(), "Search expired. Send a new search command.");
    assert!(!texts.iter().any(|t| t.contains("replaced by a newer one")));
}

#[tokio::test]
async fn test_failed_audio_delivery_is_only_logged() {
    let media = Arc::new(FakeMedia {
        hits: vec![track(1), track(2)],
        artifact_size: 1024,
        ..Default::default()
    });
    let messenger = RecordingMessenger {
        fail_binary: true,
        ..Default::default()
    };
    let h = Harness::with_messenger(messenger, media.clone(), Default::default(), Default::default());

    h.say(".play x").await;
    h.say_with_ref("1", "m1").await;

    assert_eq!(media.downloads.lock().unwrap().len(), 1);
    assert_eq!(h.messenger.last_text(CHAT), "⬇️ Downloading:\n*Song 1*");
    let sent = h.messenger.sent(CHAT);
    assert!(!sent.iter().any(|s| matches!(s, Sent::Binary { .. } | Sent::Reaction { .. })));
    assert!(!h.messenger.texts(CHAT).iter().any(|t| t.starts_with("❌")));
    // 音频列表保留，可以换一个编号
    let (slot, session) = h.bot.sessions().active(CHAT).await.unwrap();
    assert_eq!(slot, SessionSlot::Search);
    assert_eq!(session.items.len(), 2);
    assert_eq!(h.leftover_files(), 0);
}

#[tokio::test]
async fn test_failed_link_list_delivery_clears_movie_session() {
    let movies = Arc::new(FakeMovies {
        hits: HashMap::from([("Matrix".to_string(), vec![matrix()])]),
        links: vec!["https://dl.example/m.mp4".into()],
        ..Default::default()
    });
    let messenger = RecordingMessenger {
        fail_text_prefix: Some("🎬 Download Links:"),
        ..Default::default()
    };
    let h = Harness::with_messenger(messenger, Default::default(), movies.clone(), Default::default());

    h.say(".movie Matrix").await;
    h.say("1").await;

    assert_eq!(movies.fetched.lock().unwrap().len(), 1);
    assert_eq!(h.messenger.last_text(CHAT), "🎬 Fetching *The Matrix*...");
    assert!(h.bot.sessions().active(CHAT).await.is_none());
}

#[tokio::test]
async fn test_fetches_in_different_conversations_overlap() {
    let media = Arc::new(FakeMedia {
        hits: vec![track(1)],
        artifact_size: 1024,
        delay: Duration::from_millis(200),
        ..Default::default()
    });
    let h = Harness::new(media.clone(), Default::default(), Default::default());
    for chat in ["chat-a", "chat-b"] {
        h.bot.handle(InboundMessage::new(chat, ".play x")).await;
    }

    let selections = ["chat-a", "chat-b"].map(|chat| {
        let bot = Arc::clone(&h.bot);
        async move { bot.handle(InboundMessage::new(chat, "1")).await }
    });
    futures_util::future::join_all(selections).await;

    assert_eq!(media.max_active.load(Ordering::SeqCst), 2);
    for chat in ["chat-a", "chat-b"] {
        assert!(h
            .messenger
            .sent(chat)
            .iter()
            .any(|s| matches!(s, Sent::Binary { .. })));
    }
}

#[tokio::test(start_paused = true)]
async fn test_session_expires_after_ttl() {
    let movies = Arc::new(FakeMovies {
        hits: HashMap::from([("Matrix".to_string(), vec![matrix()])]),
        links: vec!["https://dl.example/m.mp4".into()],
        ..Default::default()
    });
    let h = Harness::new(Default::default(), movies.clone(), Default::default());

    h.say(".movie Matrix").await;
    tokio::time::advance(Duration::from_secs(300)).await;
    h.say("1").await;

    assert!(h.messenger.last_text(CHAT).contains("Search expired"));
    assert!(movies.fetched.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_session_usable_just_before_ttl() {
    let movies = Arc::new(FakeMovies {
        hits: HashMap::from([("Matrix".to_string(), vec![matrix()])]),
        links: vec!["https://dl.example/m.mp4".into()],
        ..Default::default()
    });
    let h = Harness::new(Default::default(), movies.clone(), Default::default());

    h.say(".movie Matrix").await;
    tokio::time::advance(Duration::from_secs(299)).await;
    h.say("1").await;

    assert_eq!(movies.fetched.lock().unwrap().len(), 1);
    assert!(h.messenger.last_text(CHAT).starts_with("🎬 Download Links:"));
}

#[tokio::test]
async fn test_new_search_replaces_old_list() {
    let reloaded = MovieHit {
        link: "link-reloaded".into(),
        title: "The Matrix Reloaded".into(),
        year: "2003".into(),
        quality: "720p".into(),
    };
    let movies = Arc::new(FakeMovies {
        hits: HashMap::from([
            ("Matrix".to_string(), vec![matrix(), matrix()]),
            ("Reloaded".to_string(), vec![reloaded]),
        ]),
        links: vec!["https://dl.example/r.mp4".into()],
        ..Default::default()
    });
    let h = Harness::new(Default::default(), movies.clone(), Default::default());

    h.say(".movie Matrix").await;
    h.say(".movie Reloaded").await;
    h.say("2").await;
    assert_eq!(h.messenger.last_text(CHAT), "Choose a number between 1 and 1.");

    h.say("1").await;
    assert_eq!(*movies.fetched.lock().unwrap(), vec!["link-reloaded".to_string()]);
}

#[tokio::test]
async fn test_fetch_for_replaced_search_is_not_delivered() {
    let movies = Arc::new(FakeMovies {
        hits: HashMap::from([
            ("Matrix".to_string(), vec![matrix()]),
            ("Heat".to_string(), vec![MovieHit {
                link: "link-heat".into(),
                title: "Heat".into(),
                year: "1995".into(),
                quality: "720p".into(),
            }]),
        ]),
        links: vec!["https://dl.example/m.mp4".into()],
        delay: Duration::from_millis(200),
        ..Default::default()
    });
    let h = Harness::new(Default::default(), movies, Default::default());

    h.say(".movie Matrix").await;
    let selection = {
        let bot = Arc::clone(&h.bot);
        tokio::spawn(async move { bot.handle(InboundMessage::new(CHAT, "1")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.say(".movie Heat").await;
    selection.await.unwrap();

    let texts = h.messenger.texts(CHAT);
    assert!(!texts.iter().any(|t| t.starts_with("🎬 Download Links:")));
    assert!(h.messenger.last_text(CHAT).contains("replaced by a newer one"));
    // 新列表仍然有效
    let (_, session) = h.bot.sessions().active(CHAT).await.unwrap();
    assert_eq!(session.items[0].title(), "Heat");
}

#[tokio::test]
async fn test_most_recent_slot_wins_numeric_reply() {
    let movies = Arc::new(FakeMovies {
        hits: HashMap::from([("Matrix".to_string(), vec![matrix()])]),
        links: vec!["https://dl.example/m.mp4".into()],
        ..Default::default()
    });
    let metadata = Arc::new(FakeMetadata {
        hits: vec![title_hit(1, "movie"), title_hit(2, "series")],
        details: HashMap::from([("tt0000001".to_string(), details(1, None))]),
        ..Default::default()
    });
    let h = Harness::new(Default::default(), movies.clone(), metadata.clone());

    h.say(".movie Matrix").await;
    h.say(".info Inception").await;

    h.say("1").await;
    assert_eq!(*metadata.looked_up.lock().unwrap(), vec!["tt0000001".to_string()]);
    assert!(movies.fetched.lock().unwrap().is_empty());

    // .info 会话已完成，数字回到仍然有效的影片列表
    h.say("1").await;
    assert_eq!(*movies.fetched.lock().unwrap(), vec!["link1".to_string()]);
}

#[tokio::test]
async fn test_panicking_tool_is_contained() {
    let media = Arc::new(FakeMedia {
        hits: vec![track(1)],
        panic_download: true,
        ..Default::default()
    });
    let h = Harness::new(media, Default::default(), Default::default());

    h.say(".play crash").await;
    h.say("1").await;
    assert_eq!(h.messenger.last_text(CHAT), "❌ Something went wrong.");
    assert_eq!(h.leftover_files(), 0);

    // 队列与会话状态未被卡住
    h.say("1").await;
    assert!(h.messenger.last_text(CHAT).contains("Search expired"));
    assert!(!h.bot.serializer().is_busy(CHAT));
}

#[tokio::test]
async fn test_driver_processes_until_channel_closes() {
    let movies = Arc::new(FakeMovies {
        hits: HashMap::from([("Matrix".to_string(), vec![matrix()])]),
        links: vec!["https://dl.example/m.mp4".into()],
        ..Default::default()
    });
    let h = Harness::new(Default::default(), movies, Default::default());

    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let driver = tokio::spawn(driver::run(
        Arc::clone(&h.bot),
        rx,
        CancellationToken::new(),
        Duration::from_secs(60),
    ));
    tx.send(InboundMessage::new("other", "1")).await.unwrap();
    tx.send(InboundMessage::new(CHAT, ".movie Matrix")).await.unwrap();
    drop(tx);

    tokio::time::timeout(Duration::from_secs(5), driver)
        .await
        .unwrap()
        .unwrap();
    assert!(h.messenger.last_text("other").contains("Search expired"));
    assert!(h.messenger.last_text(CHAT).contains("1. The Matrix (1999) | 1080p"));
}

#[tokio::test]
async fn test_driver_stops_on_shutdown() {
    let h = Harness::new(Default::default(), Default::default(), Default::default());
    let (_tx, rx) = tokio::sync::mpsc::channel::<InboundMessage>(8);
    let token = CancellationToken::new();
    let driver = tokio::spawn(driver::run(
        Arc::clone(&h.bot),
        rx,
        token.clone(),
        Duration::from_secs(60),
    ));

    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), driver)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_drain_timeout_aborts_queued_fetch() {
    let media = Arc::new(FakeMedia {
        hits: vec![track(1)],
        artifact_size: 1024,
        delay: Duration::from_secs(120),
        ..Default::default()
    });
    let h = Harness::new(media.clone(), Default::default(), Default::default());
    h.say(".play slow").await;

    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let token = CancellationToken::new();
    let driver = tokio::spawn(driver::run(
        Arc::clone(&h.bot),
        rx,
        token.clone(),
        Duration::from_secs(60),
    ));
    tx.send(InboundMessage::new(CHAT, "1")).await.unwrap();
    while media.downloads.lock().unwrap().is_empty() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    token.cancel();
    tokio::time::timeout(Duration::from_secs(60), driver)
        .await
        .unwrap()
        .unwrap();

    // 下载被中止，之后不会再交付
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert!(!h
        .messenger
        .sent(CHAT)
        .iter()
        .any(|s| matches!(s, Sent::Binary { .. })));
    assert!(!h.bot.serializer().is_busy(CHAT));
    assert_eq!(h.leftover_files(), 0);
}
