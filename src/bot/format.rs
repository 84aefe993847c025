//! 回复文本
//!
//! 所有面向用户的固定文案集中在这里；列表、详情卡片由候选与工具结果拼出。

use std::sync::OnceLock;

use regex::Regex;

use crate::router::Workflow;
use crate::session::Candidate;
use crate::tools::TitleDetails;

/// 附件文件名最大长度（字符）
const MAX_FILENAME_CHARS: usize = 60;

pub const NO_ACTIVE_SEARCH: &str = "Search expired. Send a new search command.";
pub const SUPERSEDED: &str = "⚠️ That search was replaced by a newer one. Pick from the latest list.";
pub const NO_LINKS: &str = "❌ No download links.";
pub const GENERIC_ERROR: &str = "❌ Something went wrong.";
pub const INVALID_QUERY: &str = "❌ That query can't be searched. Use plain text under 200 characters.";

/// 触发词后缺少查询内容时的用法提示
pub fn usage(workflow: Workflow, keyword: &str) -> String {
    match workflow {
        Workflow::Play => format!("🎶 *Music*\n\nExample:\n{} shape of you", keyword),
        Workflow::Movie => format!("🎬 Usage: {} <name>", keyword),
        Workflow::Info => format!("🎞️ Usage: {} <title>", keyword),
    }
}


pub fn invalid_choice(max: usize) -> String {
    format!("Choose a number between 1 and {}.", max)
}

pub fn no_results(workflow: Workflow) -> &'static str {
    match workflow {
        Workflow::Play => "No valid MP3-ready videos found.",
        Workflow::Movie => "❌ No results found.",
        Workflow::Info => "❌ No titles found.",
    }
}

/// 搜索阶段的通用失败提示
pub fn search_failed(workflow: Workflow) -> &'static str {
    match workflow {
        Workflow::Play => "❌ Search failed. Try again later.",
        Workflow::Movie => "❌ Error occurred.",
        Workflow::Info => "❌ Lookup failed. Try again later.",
    }
}

/// 获取阶段的通用失败提示
pub fn fetch_failed(workflow: Workflow) -> &'static str {
    match workflow {
        Workflow::Play => "❌ Failed to download or send audio.",
        Workflow::Movie => "❌ Failed to fetch download links.",
        Workflow::Info => "❌ Failed to load title details.",
    }
}

pub fn searching(query: &str) -> String {
    format!("🔎 Searching *{}*...", query)
}

/// 获取开始时的确认消息
pub fn working(candidate: &Candidate) -> String {
    match candidate {
        Candidate::Track { title, .. } => format!("⬇️ Downloading:\n*{}*", title),
        Candidate::Movie { title, .. } => format!("🎬 Fetching *{}*...", title),
        Candidate::Title { title, .. } => format!("🔎 Loading *{}*...", title),
    }
}

/// 编号候选列表 + 选择说明
pub fn result_list(workflow: Workflow, query: &str, items: &[Candidate]) -> String {
    let n = items.len();
    let mut msg = match workflow {
        Workflow::Play => format!(
            "🎶 *Music*\n━━━━━━━━━━━━━━━\n🎵 *Results for:* {}\nReply with *1–{}* to download\n\n",
            query, n
        ),
        Workflow::Movie => format!("🎬 Results:\n\nReply with 1–{}\n\n", n),
        Workflow::Info => format!("🎞️ *Titles for:* {}\nReply with 1–{} for details\n\n", query, n),
    };
    for (i, item) in items.iter().enumerate() {
        msg.push_str(&format!("{}. {}\n", i + 1, item.summary()));
    }
    msg
}

pub fn link_list(links: &[String]) -> String {
    let mut msg = String::from("🎬 Download Links:\n\n");
    for (i, link) in links.iter().enumerate() {
        msg.push_str(&format!("{}. {}\n", i + 1, link));
    }
    msg
}

/// 条目详情卡片；缺失字段不显示
pub fn info_card(d: &TitleDetails) -> String {
    let mut msg = format!("🎬 *{}* ({})\n", d.title, d.year);
    let fields = [
        ("⭐ Rating", &d.rating),
        ("🔞 Rated", &d.rated),
        ("⏱️ Runtime", &d.runtime),
        ("🎭 Genre", &d.genre),
        ("🎬 Director", &d.director),
        ("👥 Cast", &d.actors),
    ];
    for (label, value) in fields {
        if let Some(v) = value {
            msg.push_str(&format!("{}: {}\n", label, v));
        }
    }
    if let Some(plot) = &d.plot {
        msg.push_str(&format!("\n📝 {}", plot));
    }
    msg.trim_end().to_string()
}

static UNSAFE_CHARS_RE: OnceLock<Regex> = OnceLock::new();

/// 由标题生成附件文件名：去掉标点与符号，截断，空时用 audio
pub fn safe_filename(title: &str, ext: &str) -> String {
    let re = UNSAFE_CHARS_RE.get_or_init(|| Regex::new(r"[^\w\s-]").unwrap());
    let cleaned = re.replace_all(title, "");
    let stem: String = cleaned.trim().chars().take(MAX_FILENAME_CHARS).collect();
    let stem = stem.trim();
    if stem.is_empty() {
        format!("audio.{}", ext)
    } else {
        format!("{}.{}", stem, ext)
    }
}
