//! yt-dlp 适配器：`ytsearchN:` 搜索 + 音频下载转 mp3
//!
//! 搜索使用 `--flat-playlist --dump-single-json`，只解析条目元数据，不下载；
//! 下载时裁掉开头若干秒并固定码率，输出到 TempArtifact 指定的位置。

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::args::{validate_query, validate_url};
use super::process::CommandRunner;
use super::{MediaSource, TempArtifact, TrackHit};
use crate::config::YtDlpSection;
use crate::core::ToolError;

/// `--dump-single-json` 的顶层结构
#[derive(Debug, Deserialize)]
struct SearchDump {
    #[serde(default)]
    entries: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    id: Option<String>,
    /// 秒，直播 / 首映为 null
    #[serde(default)]
    duration: Option<f64>,
    /// is_live / is_upcoming / was_live / not_live
    #[serde(default)]
    live_status: Option<String>,
}

/// yt-dlp 音频来源
pub struct YtDlpSource {
    runner: CommandRunner,
    settings: YtDlpSection,
    search_timeout: Duration,
    download_timeout: Duration,
}

impl YtDlpSource {
    pub fn new(settings: YtDlpSection, search_timeout: Duration, download_timeout: Duration) -> Self {
        Self {
            runner: CommandRunner::new(settings.program.clone()),
            settings,
            search_timeout,
            download_timeout,
        }
    }

    fn download_args(&self, url: &str, artifact: &TempArtifact) -> Vec<String> {
        vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "-f".to_string(),
            "bestaudio".to_string(),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            "mp3".to_string(),
            "--audio-quality".to_string(),
            "5".to_string(),
            "--postprocessor-args".to_string(),
            format!(
                "-ss {} -b:a {}k",
                self.settings.trim_seconds, self.settings.bitrate_kbps
            ),
            "--user-agent".to_string(),
            self.settings.user_agent.clone(),
            "-o".to_string(),
            format!("{}.%(ext)s", artifact.base().display()),
            "--".to_string(),
            url.to_string(),
        ]
    }
}

/// 秒数格式化为 m:ss 或 h:mm:ss
pub fn format_duration(secs: f64) -> String {
    let total = secs.round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

/// 解析 `--dump-single-json` 输出
fn parse_search_dump(stdout: &str) -> Result<Vec<TrackHit>, ToolError> {
    let dump: SearchDump = serde_json::from_str(stdout.trim()).map_err(|e| ToolError::Parse {
        tool: "yt-dlp".to_string(),
        reason: e.to_string(),
    })?;

    Ok(dump
        .entries
        .into_iter()
        .map(|e| {
            let url = e.url.or_else(|| {
                e.id
                    .as_ref()
                    .map(|id| format!("https://www.youtube.com/watch?v={}", id))
            });
            TrackHit {
                title: e.title.unwrap_or_default(),
                url,
                duration: e.duration.filter(|d| *d > 0.0).map(format_duration),
                is_live: matches!(e.live_status.as_deref(), Some("is_live" | "is_upcoming")),
            }
        })
        .collect())
}

#[async_trait]
impl MediaSource for YtDlpSource {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackHit>, ToolError> {
        let query = validate_query(query)?;
        let target = format!("ytsearch{}:{}", limit.max(1), query);
        let out = self
            .runner
            .run(
                [
                    "--flat-playlist",
                    "--dump-single-json",
                    "--no-warnings",
                    "--",
                    target.as_str(),
                ],
                self.search_timeout,
            )
            .await?;
        parse_search_dump(&out.stdout)
    }

    async fn download(&self, url: &str, artifact: &TempArtifact) -> Result<(), ToolError> {
        let url = validate_url(url)?;
        if let Some(dir) = artifact.base().parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        self.runner
            .run(self.download_args(url.as_str(), artifact), self.download_timeout)
            .await?;
        Ok(())
    }
}
