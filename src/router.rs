//! 消息分类：新命令 / 数字选择 / 其他
//!
//! 规则：
//! - 以触发词开头，其后为空白与非空查询 → Command；仅有触发词 → Usage
//! - 去除首尾空白后恰为 1..=max_choice 中的一位 ASCII 数字 → Selection
//! - 其他单个数字（0、6..=9）→ OutOfRange，仅在有活跃搜索时提示编号无效
//! - 其余一律 Unrecognized，静默忽略

use crate::config::TriggersSection;

/// 工作流
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Workflow {
    /// 搜索并下载音频
    Play,
    /// 搜索影片并获取下载链接
    Movie,
    /// 查询影视条目信息
    Info,
}

impl Workflow {
    pub fn name(&self) -> &'static str {
        match self {
            Workflow::Play => "play",
            Workflow::Movie => "movie",
            Workflow::Info => "info",
        }
    }
}

/// 一条消息的分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Command { workflow: Workflow, query: String },
    /// 触发词后没有查询内容
    Usage(Workflow),
    Selection(usize),
    /// 单个数字但不在可选范围内
    OutOfRange(usize),
    Unrecognized,
}

/// 触发词表
#[derive(Debug, Clone)]
pub struct Triggers {
    entries: Vec<(String, Workflow)>,
    max_choice: usize,
}

impl Triggers {
    pub fn new(triggers: &TriggersSection, max_choice: usize) -> Self {
        let mut entries = vec![
            (triggers.play.to_lowercase(), Workflow::Play),
            (triggers.movie.to_lowercase(), Workflow::Movie),
            (triggers.info.to_lowercase(), Workflow::Info),
        ];
        // 长触发词优先，避免前缀重叠时误判
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self {
            entries,
            max_choice: max_choice.clamp(1, 9),
        }
    }

    /// 触发词文本
    pub fn keyword(&self, workflow: Workflow) -> &str {
        self.entries
            .iter()
            .find(|(_, w)| *w == workflow)
            .map(|(k, _)| k.as_str())
            .unwrap_or_default()
    }

    /// 对消息正文分类
    pub fn classify(&self, body: &str) -> Inbound {
        let text = body.trim();

        if let Some(n) = parse_digit(text) {
            return if (1..=self.max_choice).contains(&n) {
                Inbound::Selection(n)
            } else {
                Inbound::OutOfRange(n)
            };
        }

        for (keyword, workflow) in &self.entries {
            let Some(head) = text.get(..keyword.len()) else {
                continue;
            };
            if !head.eq_ignore_ascii_case(keyword) {
                continue;
            }
            let rest = &text[keyword.len()..];
            if rest.is_empty() {
                return Inbound::Usage(*workflow);
            }
            // 触发词后必须紧跟空白（.playlist 不是 .play）
            if !rest.starts_with(char::is_whitespace) {
                continue;
            }
            let query = rest.trim();
            return if query.is_empty() {
                Inbound::Usage(*workflow)
            } else {
                Inbound::Command {
                    workflow: *workflow,
                    query: query.to_string(),
                }
            };
        }

        Inbound::Unrecognized
    }
}

impl Default for Triggers {
    fn default() -> Self {
        Self::new(&TriggersSection::default(), 5)
    }
}

/// 恰为一位 ASCII 数字
fn parse_digit(text: &str) -> Option<usize> {
    let mut chars = text.chars();
    let c = chars.next()?;
    if chars.next().is_some() || !c.is_ascii_digit() {
        return None;
    }
    c.to_digit(10).map(|d| d as usize)
}
