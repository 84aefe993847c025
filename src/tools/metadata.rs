//! 元数据适配器：OMDb 兼容 HTTP API
//!
//! 搜索 `?s=<title>`，详情 `?i=<imdbID>&plot=short`；请求带超时与 User-Agent。
//! API 以 `"Response": "False"` 表示失败，其中 "not found" 视为空结果而非错误。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::args::{validate_imdb_id, validate_query};
use super::{MetadataSource, TitleDetails, TitleHit};
use crate::config::MetadataSection;
use crate::core::ToolError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchResponse {
    #[serde(default)]
    search: Vec<SearchItem>,
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(rename = "Title", default)]
    title: String,
    #[serde(rename = "Year", default)]
    year: String,
    #[serde(rename = "imdbID", default)]
    imdb_id: String,
    #[serde(rename = "Type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    #[serde(rename = "Response", default)]
    response: String,
    #[serde(rename = "Error", default)]
    error: Option<String>,
    #[serde(rename = "Title", default)]
    title: String,
    #[serde(rename = "Year", default)]
    year: String,
    #[serde(rename = "Rated", default)]
    rated: Option<String>,
    #[serde(rename = "Runtime", default)]
    runtime: Option<String>,
    #[serde(rename = "Genre", default)]
    genre: Option<String>,
    #[serde(rename = "Director", default)]
    director: Option<String>,
    #[serde(rename = "Actors", default)]
    actors: Option<String>,
    #[serde(rename = "Plot", default)]
    plot: Option<String>,
    #[serde(rename = "imdbRating", default)]
    rating: Option<String>,
    #[serde(rename = "Poster", default)]
    poster: Option<String>,
}

/// "N/A" 与空串视为缺失
fn available(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "N/A")
}

fn parse_search(body: &str) -> Result<Vec<TitleHit>, ToolError> {
    let resp: SearchResponse = serde_json::from_str(body).map_err(|e| ToolError::Parse {
        tool: "metadata".to_string(),
        reason: e.to_string(),
    })?;
    if resp.response != "True" {
        let error = resp.error.unwrap_or_default();
        if error.to_lowercase().contains("not found") {
            return Ok(Vec::new());
        }
        return Err(ToolError::Http(format!("metadata api: {}", error)));
    }
    Ok(resp
        .search
        .into_iter()
        .map(|i| TitleHit {
            title: i.title,
            year: i.year,
            imdb_id: i.imdb_id,
            kind: i.kind,
        })
        .collect())
}

fn parse_details(body: &str) -> Result<TitleDetails, ToolError> {
    let resp: DetailResponse = serde_json::from_str(body).map_err(|e| ToolError::Parse {
        tool: "metadata".to_string(),
        reason: e.to_string(),
    })?;
    if resp.response != "True" {
        return Err(ToolError::Http(format!(
            "metadata api: {}",
            resp.error.unwrap_or_default()
        )));
    }
    Ok(TitleDetails {
        title: resp.title,
        year: resp.year,
        rated: available(resp.rated),
        runtime: available(resp.runtime),
        genre: available(resp.genre),
        director: available(resp.director),
        actors: available(resp.actors),
        plot: available(resp.plot),
        rating: available(resp.rating),
        poster: available(resp.poster).filter(|p| p.starts_with("http")),
    })
}

/// OMDb 元数据来源
pub struct OmdbSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OmdbSource {
    /// 未配置 api_key 时仍可构造，调用时返回错误（.info 回复通用失败提示）
    pub fn new(settings: &MetadataSection, timeout: Duration) -> Result<Self, ToolError> {
        let api_key = settings.api_key.clone().filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!("tools.metadata.api_key not configured, .info lookups will fail");
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chatpick/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            api_key,
            timeout,
        })
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<String, ToolError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ToolError::InvalidInput("metadata api_key not configured".to_string()))?;
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("apikey", api_key)])
            .query(params)
            .send()
            .await
            .map_err(|e| ToolError::from_http("metadata", e, self.timeout))?;
        if !resp.status().is_success() {
            return Err(ToolError::Http(format!("HTTP {}", resp.status())));
        }
        resp.text()
            .await
            .map_err(|e| ToolError::from_http("metadata", e, self.timeout))
    }
}

#[async_trait]
impl MetadataSource for OmdbSource {
    async fn search(&self, title: &str) -> Result<Vec<TitleHit>, ToolError> {
        let title = validate_query(title)?;
        let body = self.get(&[("s", title.as_str())]).await?;
        parse_search(&body)
    }

    async fn details(&self, imdb_id: &str) -> Result<TitleDetails, ToolError> {
        let imdb_id = validate_imdb_id(imdb_id)?;
        let body = self.get(&[("i", imdb_id), ("plot", "short")]).await?;
        parse_details(&body)
    }
}
