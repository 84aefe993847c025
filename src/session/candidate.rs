//! 候选结果：展示给用户的编号列表中的一项（创建后不可变）

/// 会话 ID（聊天维度，如 WhatsApp 的 wa_id）
pub type ConversationId = String;

/// 候选结果，按来源工作流区分；编号即其在列表中的位置（从 1 开始）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// .play：可下载的音频来源
    Track {
        title: String,
        duration: String,
        url: String,
    },
    /// .movie：爬虫返回的影片详情页
    Movie {
        title: String,
        year: String,
        quality: String,
        link: String,
    },
    /// .info：元数据 API 中的条目
    Title {
        title: String,
        year: String,
        imdb_id: String,
        kind: String,
    },
}

impl Candidate {
    pub fn title(&self) -> &str {
        match self {
            Candidate::Track { title, .. }
            | Candidate::Movie { title, .. }
            | Candidate::Title { title, .. } => title,
        }
    }

    /// 列表中的一行（不含编号）
    pub fn summary(&self) -> String {
        match self {
            Candidate::Track {
                title, duration, ..
            } => format!("{} ({})", title, duration),
            Candidate::Movie {
                title,
                year,
                quality,
                ..
            } => format!("{} ({}) | {}", title, year, quality),
            Candidate::Title {
                title, year, kind, ..
            } => format!("{} ({}) [{}]", title, year, kind),
        }
    }
}
