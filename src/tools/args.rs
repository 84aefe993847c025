//! 外部工具参数校验
//!
//! 所有进程均以 argv 方式启动（不经过 shell），这里再拒绝可能被当作选项的参数、
//! 控制字符与非 http(s) 链接，保证用户文本原样越过边界时不会改变工具行为。

use reqwest::Url;

use crate::core::ToolError;

/// 搜索词最大长度（字符）
pub const MAX_QUERY_CHARS: usize = 200;

/// 校验用户搜索词，返回去除首尾空白后的文本
pub fn validate_query(raw: &str) -> Result<String, ToolError> {
    let query = raw.trim();
    if query.is_empty() {
        return Err(ToolError::InvalidInput("empty query".to_string()));
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(ToolError::InvalidInput(format!(
            "query longer than {} chars",
            MAX_QUERY_CHARS
        )));
    }
    if query.chars().any(char::is_control) {
        return Err(ToolError::InvalidInput("control characters in query".to_string()));
    }
    if query.starts_with('-') {
        return Err(ToolError::InvalidInput("query must not start with '-'".to_string()));
    }
    Ok(query.to_string())
}

/// 校验外部工具返回、将再次传给外部工具的链接：必须是 http(s) 且带 host
pub fn validate_url(raw: &str) -> Result<Url, ToolError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ToolError::InvalidInput(format!("bad url {:?}: {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ToolError::InvalidInput(format!("unsupported url: {}", raw)));
    }
    Ok(url)
}

/// 校验 IMDb 条目 ID（tt + 数字）
pub fn validate_imdb_id(raw: &str) -> Result<&str, ToolError> {
    let id = raw.trim();
    let digits = id.strip_prefix("tt").unwrap_or("");
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ToolError::InvalidInput(format!("bad imdb id: {}", raw)));
    }
    Ok(id)
}
