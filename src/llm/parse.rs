//! 模型回复解析
//!
//! 回复整体（或其中的 ```json 代码块）是 `{"tool": ..., "args": ...}` 对象或此类对象的数组时，
//! 视为工具调用；否则是给用户的最终回答。只有本次请求带了工具清单时才会解析工具调用。

use serde::Deserialize;
use serde_json::Value;

use crate::tools::ToolInvocationRequest;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub tool_calls: Vec<ToolInvocationRequest>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn wants_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    tool: String,
    #[serde(default)]
    args: Value,
}

fn fenced_json(text: &str) -> Option<&str> {
    let start = text.find("```json")?;
    let rest = &text[start + 7..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

fn parse_calls(candidate: &str) -> Option<Vec<ToolCall>> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    let calls: Vec<ToolCall> = match value {
        Value::Array(items) if !items.is_empty() => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .ok()?,
        obj @ Value::Object(_) => vec![serde_json::from_value(obj).ok()?],
        _ => return None,
    };
    if calls.iter().any(|c| c.tool.trim().is_empty()) {
        return None;
    }
    Some(calls)
}

/// 解析模型输出；`tools_offered` 为 false 时一律当作文本
pub fn parse_model_output(output: &str, tools_offered: bool) -> ModelReply {
    let trimmed = output.trim();
    if !tools_offered {
        return ModelReply::text(trimmed);
    }
    let calls = parse_calls(trimmed).or_else(|| fenced_json(trimmed).and_then(parse_calls));
    match calls {
        Some(calls) => ModelReply {
            text: trimmed.to_string(),
            tool_calls: calls
                .into_iter()
                .enumerate()
                .map(|(i, c)| ToolInvocationRequest {
                    id: format!("call_{}", i),
                    name: c.tool.trim().to_string(),
                    arguments: c.args,
                })
                .collect(),
        },
        None => ModelReply::text(trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text() {
        let reply = parse_model_output("  Redis is an in-memory store.  ", true);
        assert!(!reply.wants_tools());
        assert_eq!(reply.text, "Redis is an in-memory store.");
    }

    #[test]
    fn test_single_call() {
        let reply = parse_model_output(
            r#"{"tool": "interviewQuestionSearch", "args": {"keyword": "redis"}}"#,
            true,
        );
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].id, "call_0");
        assert_eq!(reply.tool_calls[0].name, "interviewQuestionSearch");
        assert_eq!(reply.tool_calls[0].arguments["keyword"], "redis");
    }

    #[test]
    fn test_fenced_array() {
        let reply = parse_model_output(
            "Let me look.\n```json\n[{\"tool\": \"a\", \"args\": {}}, {\"tool\": \"b\"}]\n```",
            true,
        );
        let names: Vec<_> = reply.tool_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(reply.tool_calls[1].id, "call_1");
    }

    #[test]
    fn test_json_answer_is_not_a_call() {
        let reply = parse_model_output(r#"{"name": "study plan", "suggestionList": []}"#, true);
        assert!(!reply.wants_tools());
    }

    #[test]
    fn test_no_tools_offered() {
        let reply = parse_model_output(r#"{"tool": "a", "args": {}}"#, false);
        assert!(!reply.wants_tools());
    }
}
