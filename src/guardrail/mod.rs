//! 输入护轨：在任何记忆读写、检索或模型调用之前检查用户原始输入
//!
//! 输入转小写后按非单词字符切分，逐词与敏感词集合精确比较（非子串匹配），命中第一个即拒绝。
//! 纯函数、无 I/O，可在请求线程上同步执行。

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// 护轨检查结果（每条入站消息产生一次，不持久化）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardrailResult {
    Accepted,
    Rejected { reason: String },
}

impl GuardrailResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, GuardrailResult::Accepted)
    }
}

/// 输入护轨 trait：编排器按注册顺序依次执行，任一拒绝即短路
pub trait InputGuardrail: Send + Sync {
    fn validate(&self, input: &str) -> GuardrailResult;
}

/// 默认敏感词
pub const DEFAULT_BANNED_WORDS: &[&str] = &["kill", "evil"];

fn word_splitter() -> &'static Regex {
    static SPLITTER: OnceLock<Regex> = OnceLock::new();
    SPLITTER.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]+").expect("static regex"))
}

/// 敏感词护轨：大小写不敏感、按整词匹配。
/// 词由 ASCII 字母、数字与下划线组成，中文等其他字符一律视为分隔符。
#[derive(Debug, Clone)]
pub struct SafeInputGuardrail {
    banned: HashSet<String>,
}

impl SafeInputGuardrail {
    pub fn new<I, S>(banned_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let banned = banned_words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        Self { banned }
    }
}

impl Default for SafeInputGuardrail {
    fn default() -> Self {
        Self::new(DEFAULT_BANNED_WORDS.iter().copied())
    }
}

impl InputGuardrail for SafeInputGuardrail {
    fn validate(&self, input: &str) -> GuardrailResult {
        let lowered = input.to_lowercase();
        for word in word_splitter().split(&lowered) {
            if self.banned.contains(word) {
                return GuardrailResult::Rejected {
                    reason: format!("Sensitive word detected: {}", word),
                };
            }
        }
        GuardrailResult::Accepted
    }
}
