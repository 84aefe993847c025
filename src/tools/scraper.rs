//! 影片爬虫适配器：调用外部脚本（默认 `python3 fzmovies.py`）
//!
//! - 搜索：`<script> <query> --list`，每行 `link|title|year|quality`
//! - 获取：`<script> <link>`，每行一个下载链接
//!
//! 脚本失败时也可能以退出码 0 打印提示文字，因此只保留能解析的行。

use std::time::Duration;

use async_trait::async_trait;

use super::args::{validate_query, validate_url};
use super::process::CommandRunner;
use super::{MovieHit, MovieSource};
use crate::config::ScraperSection;
use crate::core::ToolError;

pub struct ScraperSource {
    runner: CommandRunner,
    script: String,
    search_timeout: Duration,
    fetch_timeout: Duration,
}

impl ScraperSource {
    pub fn new(settings: &ScraperSection, search_timeout: Duration, fetch_timeout: Duration) -> Self {
        Self {
            runner: CommandRunner::new(settings.program.clone()),
            script: settings.script.to_string_lossy().to_string(),
            search_timeout,
            fetch_timeout,
        }
    }
}

/// 解析一行 `link|title|year|quality`；字段不足时年份 / 清晰度记为 Unknown
pub fn parse_movie_line(line: &str) -> Option<MovieHit> {
    let mut parts = line.trim().split('|').map(str::trim);
    let link = parts.next().filter(|s| !s.is_empty())?;
    let title = parts.next().filter(|s| !s.is_empty())?;
    let year = parts.next().filter(|s| !s.is_empty()).unwrap_or("Unknown");
    let quality = parts.next().filter(|s| !s.is_empty()).unwrap_or("Unknown");
    Some(MovieHit {
        link: link.to_string(),
        title: title.to_string(),
        year: year.to_string(),
        quality: quality.to_string(),
    })
}

/// 从获取模式输出中提取下载链接（跳过提示文字）
pub fn parse_link_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| validate_url(l).is_ok())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl MovieSource for ScraperSource {
    async fn search(&self, query: &str) -> Result<Vec<MovieHit>, ToolError> {
        let query = validate_query(query)?;
        let out = self
            .runner
            .run(
                [self.script.as_str(), query.as_str(), "--list"],
                self.search_timeout,
            )
            .await?;
        Ok(out.stdout.lines().filter_map(parse_movie_line).collect())
    }

    async fn links(&self, link: &str) -> Result<Vec<String>, ToolError> {
        let url = validate_url(link)?;
        let out = self
            .runner
            .run([self.script.as_str(), url.as_str()], self.fetch_timeout)
            .await?;
        Ok(parse_link_lines(&out.stdout))
    }
}
