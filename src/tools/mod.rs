//! 外部工具适配层
//!
//! 每类外部工具一个 trait：MediaSource（yt-dlp 搜索 + 下载）、MovieSource（爬虫脚本）、
//! MetadataSource（OMDb 元数据 HTTP API）。适配器负责超时与参数校验，
//! 只返回原始结果；过滤与截断由工作流完成。

pub mod args;
pub mod artifact;
pub mod metadata;
pub mod process;
pub mod scraper;
pub mod ytdlp;

use async_trait::async_trait;

use crate::core::ToolError;

pub use artifact::TempArtifact;
pub use metadata::OmdbSource;
pub use process::CommandRunner;
pub use scraper::ScraperSource;
pub use ytdlp::YtDlpSource;

/// 音频搜索的原始结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackHit {
    pub title: String,
    pub url: Option<String>,
    /// 形如 3:53；无时长（直播、首映）时为 None
    pub duration: Option<String>,
    pub is_live: bool,
}

/// 影片搜索的原始结果（爬虫每行 `link|title|year|quality`）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovieHit {
    pub link: String,
    pub title: String,
    pub year: String,
    pub quality: String,
}

/// 元数据搜索的原始结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleHit {
    pub title: String,
    pub year: String,
    pub imdb_id: String,
    /// movie / series / episode / game
    pub kind: String,
}

/// 条目详情
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleDetails {
    pub title: String,
    pub year: String,
    pub rated: Option<String>,
    pub runtime: Option<String>,
    pub genre: Option<String>,
    pub director: Option<String>,
    pub actors: Option<String>,
    pub plot: Option<String>,
    pub rating: Option<String>,
    /// 海报 URL；API 返回 "N/A" 时为 None
    pub poster: Option<String>,
}

/// 音频来源：搜索 + 下载为 mp3
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// 按相关度返回最多 limit 条原始结果
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackHit>, ToolError>;

    /// 下载并转码到 artifact.path()
    async fn download(&self, url: &str, artifact: &TempArtifact) -> Result<(), ToolError>;
}

/// 影片来源：搜索 + 获取下载链接
#[async_trait]
pub trait MovieSource: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<MovieHit>, ToolError>;

    async fn links(&self, link: &str) -> Result<Vec<String>, ToolError>;
}

/// 元数据来源：按标题搜索 + 按 ID 获取详情
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn search(&self, title: &str) -> Result<Vec<TitleHit>, ToolError>;

    async fn details(&self, imdb_id: &str) -> Result<TitleDetails, ToolError>;
}
