//! chatpick - 聊天驱动的搜索 / 选择 / 获取机器人
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、按会话串行的任务队列、优雅关闭
//! - **session**: 候选结果与带有效期的结果缓存
//! - **router**: 消息分类（命令 / 数字选择 / 其他）
//! - **tools**: 外部工具适配（yt-dlp、影片爬虫脚本、元数据 HTTP API）
//! - **messaging**: 消息通道（控制台 / WhatsApp Cloud API）
//! - **bot**: .play / .movie / .info 工作流
//! - **driver**: 事件循环

pub mod bot;
pub mod config;
pub mod core;
pub mod driver;
pub mod messaging;
pub mod observability;
pub mod router;
pub mod session;
pub mod tools;

pub use bot::{Bot, BotSettings, Sources};
