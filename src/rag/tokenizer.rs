//! 检索分词：中英文混合
//!
//! 含 CJK 字符时用 jieba 搜索引擎模式切分，纯英文按非单词字符切分；统一小写。

use std::collections::HashSet;
use std::sync::OnceLock;

use jieba_rs::Jieba;

static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn get_jieba() -> &'static Jieba {
    JIEBA.get_or_init(Jieba::new)
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |
        '\u{3400}'..='\u{4DBF}' |
        '\u{F900}'..='\u{FAFF}' |
        '\u{3040}'..='\u{309F}' |
        '\u{30A0}'..='\u{30FF}'
    )
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// 是否为有效检索词：至少两个字符，或单个 CJK 字以外的纯标点一律丢弃
fn keep_token(token: &str) -> bool {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (None, _) => false,
        (Some(c), None) => is_cjk(c),
        (Some(_), Some(_)) => token.chars().any(char::is_alphanumeric),
    }
}

pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if contains_cjk(text) {
        get_jieba()
            .cut_for_search(text, true)
            .into_iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| keep_token(s))
            .collect()
    } else {
        text.split(|c: char| !c.is_alphanumeric() && c != '_')
            .map(|s| s.to_lowercase())
            .filter(|s| keep_token(s))
            .collect()
    }
}

pub fn tokenize_to_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// 查询覆盖率：查询词中出现在文档里的比例，范围 [0, 1]
pub fn coverage_score(query: &HashSet<String>, doc: &HashSet<String>) -> f32 {
    if query.is_empty() || doc.is_empty() {
        return 0.0;
    }
    query.intersection(doc).count() as f32 / query.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_chinese() {
        let tokens = tokenize("怎么学习Java编程");
        assert!(tokens.iter().any(|t| t == "java"));
        assert!(tokens.iter().any(|t| t.contains("学习") || t.contains("编程")));
    }

    #[test]
    fn test_tokenize_english_drops_punctuation() {
        let tokens = tokenize("What is Redis? A cache, mostly.");
        assert!(tokens.contains(&"redis".to_string()));
        assert!(tokens.contains(&"cache".to_string()));
        assert!(!tokens.iter().any(|t| t.contains('?')));
        assert!(!tokens.contains(&"a".to_string()));
    }

    #[test]
    fn test_coverage_score() {
        let q = tokenize_to_set("redis persistence");
        let d = tokenize_to_set("Redis supports RDB and AOF persistence");
        assert!((coverage_score(&q, &d) - 1.0).abs() < f32::EPSILON);

        let partial = tokenize_to_set("redis cluster");
        assert!((coverage_score(&partial, &d) - 0.5).abs() < f32::EPSILON);
        assert_eq!(coverage_score(&HashSet::new(), &d), 0.0);
    }
}
