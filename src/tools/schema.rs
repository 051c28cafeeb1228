//! 工具调用 JSON Schema 生成
//!
//! 用 schemars 生成「合法 tool call」的 JSON 结构与工具清单，拼入 system prompt，
//! 减少 LLM 输出格式错误。

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

use crate::tools::ToolDescriptor;

/// 工具调用请求格式：与解析器接受的 `{"tool": "...", "args": {...}}` 一致（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，取自工具清单
    pub tool: String,
    /// 工具参数，须符合该工具的参数 Schema
    pub args: Value,
}

/// 返回工具调用的 JSON Schema 字符串
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 任意类型的 JSON Schema（工具参数、结构化输出）
pub fn json_schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null)
}

/// 渲染工具清单与调用协议，追加在 system prompt 之后；清单为空时返回空串
pub fn render_tool_manifest(tools: &[ToolDescriptor]) -> String {
    if tools.is_empty() {
        return String::new();
    }
    let mut out = String::from("## Available tools\n");
    for tool in tools {
        out.push_str(&format!(
            "- {}: {}\n  parameters: {}\n",
            tool.name,
            tool.description.trim(),
            tool.parameters
        ));
    }
    out.push_str(
        "\nTo call a tool, reply with ONLY a JSON object (or a JSON array of objects for several calls) \
         and nothing else:\n```json\n{\"tool\": \"<name>\", \"args\": { ... }}\n```\n",
    );
    out.push_str("Tool call JSON Schema:\n```json\n");
    out.push_str(&tool_call_schema_json());
    out.push_str("\n```\nWhen you have enough information, answer the user in plain text.");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mentions_fields() {
        let schema = tool_call_schema_json();
        assert!(schema.contains("\"tool\""));
        assert!(schema.contains("\"args\""));
    }

    #[test]
    fn test_empty_manifest() {
        assert!(render_tool_manifest(&[]).is_empty());
    }

    #[test]
    fn test_manifest_lists_tools() {
        let manifest = render_tool_manifest(&[ToolDescriptor {
            name: "interviewQuestionSearch".to_string(),
            description: "Find interview questions".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        }]);
        assert!(manifest.contains("- interviewQuestionSearch: Find interview questions"));
        assert!(manifest.contains("\"tool\": \"<name>\""));
    }
}
