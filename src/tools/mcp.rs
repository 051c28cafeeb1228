//! MCP 远程工具提供方（streamable HTTP 传输）
//!
//! 启动时完成 `initialize` 握手与 `tools/list`，缓存工具清单；之后每次 `tools/call`
//! 发送一条 JSON-RPC 请求。响应可以是普通 JSON，也可以是携带 JSON-RPC 消息的
//! `text/event-stream` 正文。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::tools::{ToolDescriptor, ToolProvider};

pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Debug, Error)]
pub enum McpError {
    #[error("transport error for server '{server}': {reason}")]
    Transport { server: String, reason: String },

    #[error("server error [{code}]: {message}")]
    Rpc { code: i64, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            method: method.to_string(),
            params,
        }
    }

    /// 无 id 的通知
    pub fn notification(method: &str) -> Self {
        Self {
            jsonrpc: "2.0",
            id: None,
            method: method.to_string(),
            params: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct McpToolDefinition {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default, rename = "inputSchema")]
    input_schema: Value,
}

/// 从响应正文中找出 id 匹配的 JSON-RPC 响应；兼容 JSON 与 SSE 两种正文
pub fn parse_rpc_body(body: &str, id: u64) -> Result<JsonRpcResponse, McpError> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return pick_response(serde_json::from_str::<Value>(trimmed), id);
    }
    let mut data = String::new();
    let mut events = Vec::new();
    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            if !data.is_empty() {
                events.push(std::mem::take(&mut data));
            }
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if !data.is_empty() {
        events.push(data);
    }
    for event in events {
        if let Ok(resp) = pick_response(serde_json::from_str::<Value>(&event), id) {
            return Ok(resp);
        }
    }
    Err(McpError::Protocol(format!("no response with id {} in body", id)))
}

fn pick_response(parsed: serde_json::Result<Value>, id: u64) -> Result<JsonRpcResponse, McpError> {
    let value = parsed.map_err(|e| McpError::Protocol(format!("invalid JSON: {}", e)))?;
    let candidates = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    candidates
        .into_iter()
        .filter_map(|v| serde_json::from_value::<JsonRpcResponse>(v).ok())
        .find(|r| r.id == Some(id))
        .ok_or_else(|| McpError::Protocol(format!("no response with id {}", id)))
}

/// `tools/call` 结果：text 内容逐项换行拼接；isError 为 true 时视为工具错误
pub fn tool_call_text(result: &Value) -> Result<String, String> {
    let text = result
        .get("content")
        .and_then(|c| c.as_array())
        .map(|items| {
            items
                .iter()
                .filter(|item| item.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();
    if result.get("isError").and_then(|v| v.as_bool()).unwrap_or(false) {
        Err(if text.is_empty() { "remote tool reported an error".to_string() } else { text })
    } else {
        Ok(text)
    }
}

pub struct McpHttpProvider {
    name: String,
    url: String,
    client: Client,
    session_id: RwLock<Option<String>>,
    next_id: AtomicU64,
    tools: Vec<ToolDescriptor>,
}

impl McpHttpProvider {
    /// 连接远程服务：握手并拉取工具清单
    pub async fn connect(
        name: &str,
        url: &str,
        api_key: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, McpError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/event-stream"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| McpError::Protocol(format!("invalid api key header: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .default_headers(headers)
            .build()
            .map_err(|e| McpError::Transport {
                server: name.to_string(),
                reason: e.to_string(),
            })?;

        let mut provider = Self {
            name: name.to_string(),
            url: url.to_string(),
            client,
            session_id: RwLock::new(None),
            next_id: AtomicU64::new(1),
            tools: Vec::new(),
        };

        let init = provider
            .request(
                "initialize",
                Some(serde_json::json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {"name": "codehelper", "version": env!("CARGO_PKG_VERSION")}
                })),
            )
            .await?;
        tracing::info!(
            server = %provider.name,
            server_info = %init.get("serverInfo").cloned().unwrap_or(serde_json::Value::Null),
            "MCP initialized"
        );
        provider.notify("notifications/initialized").await?;

        let listed = provider.request("tools/list", Some(serde_json::json!({}))).await?;
        let defs: Vec<McpToolDefinition> = listed
            .get("tools")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| McpError::Protocol(format!("invalid tools/list result: {}", e)))?
            .unwrap_or_default();
        provider.tools = defs
            .into_iter()
            .map(|d| ToolDescriptor {
                name: d.name,
                description: d.description,
                parameters: if d.input_schema.is_null() {
                    serde_json::json!({"type": "object", "properties": {}})
                } else {
                    d.input_schema
                },
            })
            .collect();
        tracing::info!(server = %provider.name, tools = provider.tools.len(), "MCP tools listed");
        Ok(provider)
    }

    fn transport_err(&self, reason: impl ToString) -> McpError {
        McpError::Transport {
            server: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    async fn post(&self, body: &JsonRpcRequest) -> Result<reqwest::Response, McpError> {
        let mut req = self.client.post(&self.url).json(body);
        let session = self
            .session_id
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|p| p.into_inner().clone());
        if let Some(session) = session {
            req = req.header(SESSION_HEADER, session);
        }
        let resp = req.send().await.map_err(|e| self.transport_err(e))?;
        if !resp.status().is_success() {
            return Err(self.transport_err(format!("HTTP {}", resp.status())));
        }
        if let Some(sid) = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut guard = self.session_id.write().unwrap_or_else(|p| p.into_inner());
            *guard = Some(sid.to_string());
        }
        Ok(resp)
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self.post(&JsonRpcRequest::new(id, method, params)).await?;
        let body = resp.text().await.map_err(|e| self.transport_err(e))?;
        let rpc = parse_rpc_body(&body, id)?;
        if let Some(err) = rpc.error {
            return Err(McpError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(rpc.result.unwrap_or(Value::Null))
    }

    async fn notify(&self, method: &str) -> Result<(), McpError> {
        self.post(&JsonRpcRequest::notification(method)).await.map(|_| ())
    }
}

#[async_trait]
impl ToolProvider for McpHttpProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        self.tools.clone()
    }

    async fn call(&self, name: &str, args: Value) -> Result<String, String> {
        let arguments = if args.is_object() { args } else { serde_json::json!({}) };
        let result = self
            .request(
                "tools/call",
                Some(serde_json::json!({"name": name, "arguments": arguments})),
            )
            .await
            .map_err(|e| e.to_string())?;
        tool_call_text(&result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_has_no_id() {
        let json = serde_json::to_string(&JsonRpcRequest::notification("notifications/initialized")).unwrap();
        assert!(!json.contains("\"id\""));
        assert!(!json.contains("params"));
        let json = serde_json::to_string(&JsonRpcRequest::new(7, "tools/list", None)).unwrap();
        assert!(json.contains("\"id\":7"));
    }

    #[test]
    fn test_parse_plain_json_body() {
        let resp = parse_rpc_body(r#"{"jsonrpc":"2.0","id":3,"result":{"tools":[]}}"#, 3).unwrap();
        assert!(resp.result.is_some());
        assert!(parse_rpc_body(r#"{"jsonrpc":"2.0","id":4,"result":{}}"#, 3).is_err());
    }

    #[test]
    fn test_parse_sse_body() {
        let body = "event: message\r\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\r\n\r\n\
                    event: message\r\ndata: {\"jsonrpc\":\"2.0\",\"id\":2,\"error\":{\"code\":-32601,\"message\":\"Method not found\"}}\r\n\r\n";
        let resp = parse_rpc_body(body, 2).unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, -32601);
    }

    #[test]
    fn test_tool_call_text() {
        let ok = serde_json::json!({"content": [
            {"type": "text", "text": "first"},
            {"type": "image", "data": "..."},
            {"type": "text", "text": "second"}
        ]});
        assert_eq!(tool_call_text(&ok), Ok("first\nsecond".to_string()));
        let failed = serde_json::json!({"content": [{"type": "text", "text": "quota exceeded"}], "isError": true});
        assert_eq!(tool_call_text(&failed), Err("quota exceeded".to_string()));
        assert_eq!(tool_call_text(&serde_json::json!({})), Ok(String::new()));
    }
}
