//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CHATPICK__*` 覆盖（双下划线表示嵌套，
//! 如 `CHATPICK__TOOLS__METADATA__API_KEY=xxxx`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub session: SessionSection,
    pub triggers: TriggersSection,
    pub tools: ToolsSection,
    pub delivery: DeliverySection,
    pub whatsapp: WhatsappSection,
}

/// [app] 段：名称、下载临时目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 下载临时文件目录，未设置时用 ./downloads
    pub downloads_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "chatpick".to_string(),
            downloads_dir: PathBuf::from("downloads"),
        }
    }
}

/// [session] 段：搜索结果有效期、候选数、过期清理周期
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// 搜索结果有效期（秒）
    pub ttl_secs: u64,
    /// 展示给用户的最大候选数（数字回复 1..=max_results）
    pub max_results: usize,
    pub sweep_interval_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_results: 5,
            sweep_interval_secs: 60,
        }
    }
}

impl SessionSection {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// [triggers] 段：各工作流的触发词
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TriggersSection {
    pub play: String,
    pub movie: String,
    pub info: String,
}

impl Default for TriggersSection {
    fn default() -> Self {
        Self {
            play: ".play".to_string(),
            movie: ".movie".to_string(),
            info: ".info".to_string(),
        }
    }
}

/// [tools] 段：超时、并发上限与各外部工具
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 搜索类调用超时（秒）
    pub search_timeout_secs: u64,
    /// 下载 / 获取类调用超时（秒）
    pub fetch_timeout_secs: u64,
    /// 同时运行的外部工具调用上限（跨会话）
    pub max_concurrent: usize,
    pub ytdlp: YtDlpSection,
    pub scraper: ScraperSection,
    pub metadata: MetadataSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            search_timeout_secs: 30,
            fetch_timeout_secs: 180,
            max_concurrent: 3,
            ytdlp: YtDlpSection::default(),
            scraper: ScraperSection::default(),
            metadata: MetadataSection::default(),
        }
    }
}

/// [tools.ytdlp] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct YtDlpSection {
    pub program: String,
    /// 搜索时向 yt-dlp 请求的原始结果数（过滤前）
    pub search_limit: usize,
    /// 裁掉开头的秒数
    pub trim_seconds: u32,
    pub bitrate_kbps: u32,
    pub user_agent: String,
}

impl Default for YtDlpSection {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            search_limit: 10,
            trim_seconds: 5,
            bitrate_kbps: 128,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36".to_string(),
        }
    }
}

/// [tools.scraper] 段：影片爬虫脚本
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperSection {
    pub program: String,
    pub script: PathBuf,
}

impl Default for ScraperSection {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            script: PathBuf::from("fzmovies.py"),
        }
    }
}

/// [tools.metadata] 段：OMDb 兼容 API
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetadataSection {
    pub base_url: String,
    /// 建议通过 CHATPICK__TOOLS__METADATA__API_KEY 设置
    pub api_key: Option<String>,
}

impl Default for MetadataSection {
    fn default() -> Self {
        Self {
            base_url: "https://www.omdbapi.com/".to_string(),
            api_key: None,
        }
    }
}

/// [delivery] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliverySection {
    /// 音频超过该大小（MB）时以语音消息发送
    pub voice_note_threshold_mb: f64,
}

impl Default for DeliverySection {
    fn default() -> Self {
        Self {
            voice_note_threshold_mb: 15.0,
        }
    }
}

impl DeliverySection {
    pub fn voice_note_threshold_bytes(&self) -> u64 {
        (self.voice_note_threshold_mb * 1024.0 * 1024.0) as u64
    }
}

/// [whatsapp] 段：WhatsApp Cloud API
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WhatsappSection {
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub verify_token: String,
    pub listen_addr: String,
    pub api_base: String,
}

impl Default for WhatsappSection {
    fn default() -> Self {
        Self {
            access_token: None,
            phone_number_id: None,
            verify_token: "chatpick".to_string(),
            listen_addr: "0.0.0.0:3000".to_string(),
            api_base: "https://graph.facebook.com/v18.0".to_string(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 CHATPICK__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CHATPICK__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CHATPICK")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
