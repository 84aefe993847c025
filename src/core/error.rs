//! 错误分类
//!
//! - 用户输入类（空查询、非法查询、无效编号、无活跃搜索、搜索已被替换）：直接回复用户，不作为系统故障记录
//! - NoResults：过滤后无结果，回复「无结果」，不创建会话
//! - Tool：外部工具失败 / 超时 / 输出无法解析，服务端完整记录，用户只看到通用失败提示
//! - Transport：发送回复本身失败，仅记录，不再重试

use std::time::Duration;

use thiserror::Error;

/// 外部工具调用（yt-dlp、爬虫脚本、元数据 HTTP API）的错误
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid tool input: {0}")]
    InvalidInput(String),

    #[error("Failed to spawn {tool}: {reason}")]
    Spawn { tool: String, reason: String },

    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("Unparseable output from {tool}: {reason}")]
    Parse { tool: String, reason: String },

    #[error("Expected output missing: {0}")]
    MissingOutput(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// HTTP 客户端错误；超时带上调用方配置的时限
    pub fn from_http(tool: &str, e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            ToolError::Timeout {
                tool: tool.to_string(),
                secs: timeout.as_secs(),
            }
        } else {
            ToolError::Http(e.to_string())
        }
    }
}

/// 消息通道发送失败
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Request(e.to_string())
    }
}

/// 工作流内部统一错误；在工作流边界转换为用户回复
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Empty query")]
    EmptyQuery,

    /// 查询含控制字符、过长或以 '-' 开头
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid choice {choice} (max {max})")]
    InvalidChoice { choice: usize, max: usize },

    #[error("No active search")]
    NoActiveSearch,

    /// 排队期间该会话的搜索已被新搜索替换
    #[error("Search superseded")]
    Superseded,

    #[error("No results")]
    NoResults,

    /// 影片页面没有可用下载链接
    #[error("No download links")]
    NoLinks,

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl BotError {
    /// 是否属于用户输入类错误（不记为系统故障）
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            BotError::EmptyQuery
                | BotError::InvalidQuery(_)
                | BotError::InvalidChoice { .. }
                | BotError::NoActiveSearch
                | BotError::Superseded
                | BotError::NoResults
                | BotError::NoLinks
        )
    }
}
