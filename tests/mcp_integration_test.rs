//! 远程 MCP 工具提供方集成测试：本地起一个假的 Streamable HTTP 服务

#[cfg(all(test, feature = "web"))]
mod tests {
    use std::sync::Arc;

    use axum::http::{header, HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use codehelper::tools::{McpHttpProvider, ToolError, ToolProvider, ToolRegistry};

    const SESSION: &str = "sess-42";

    async fn handle(headers: HeaderMap, Json(req): Json<Value>) -> Response {
        let method = req["method"].as_str().unwrap_or_default();
        let id = req["id"].clone();
        if method != "initialize"
            && headers.get("mcp-session-id").and_then(|v| v.to_str().ok()) != Some(SESSION)
        {
            return (StatusCode::BAD_REQUEST, "missing session").into_response();
        }
        if headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) != Some("Bearer secret") {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        match method {
            "initialize" => (
                [("mcp-session-id", SESSION)],
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "protocolVersion": "2025-03-26",
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "fake-search", "version": "0.1"}
                    }
                })),
            )
                .into_response(),
            "notifications/initialized" => StatusCode::ACCEPTED.into_response(),
            "tools/list" => {
                let payload = json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {"tools": [{
                        "name": "webSearch",
                        "description": "Search the web",
                        "inputSchema": {
                            "type": "object",
                            "properties": {"query": {"type": "string"}},
                            "required": ["query"]
                        }
                    }]}
                });
                (
                    [(header::CONTENT_TYPE, "text/event-stream")],
                    format!("event: message\ndata: {}\n\n", payload),
                )
                    .into_response()
            }
            "tools/call" => {
                let query = req["params"]["arguments"]["query"].as_str().unwrap_or_default();
                let result = if query == "fail" {
                    json!({"content": [{"type": "text", "text": "quota exceeded"}], "isError": true})
                } else {
                    json!({"content": [
                        {"type": "text", "text": format!("result 1 for {}", query)},
                        {"type": "text", "text": format!("result 2 for {}", query)}
                    ]})
                };
                Json(json!({"jsonrpc": "2.0", "id": id, "result": result})).into_response()
            }
            _ => Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": "Method not found"}
            }))
            .into_response(),
        }
    }

    async fn spawn_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/mcp", post(handle));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/mcp", addr)
    }

    #[tokio::test]
    async fn test_connect_lists_tools_and_calls_them() {
        let url = spawn_server().await;
        let provider = McpHttpProvider::connect("web_search", &url, Some("secret"), 5)
            .await
            .unwrap();
        assert_eq!(provider.provider_name(), "web_search");
        let tools = provider.tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "webSearch");
        assert_eq!(tools[0].parameters["required"][0], "query");

        let text = provider.call("webSearch", json!({"query": "rust"})).await.unwrap();
        assert_eq!(text, "result 1 for rust\nresult 2 for rust");
        let err = provider.call("webSearch", json!({"query": "fail"})).await.unwrap_err();
        assert!(err.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_registry_routes_to_remote_provider() {
        let url = spawn_server().await;
        let provider = McpHttpProvider::connect("web_search", &url, Some("secret"), 5)
            .await
            .unwrap();
        let mut registry = ToolRegistry::new();
        registry.register_provider(Arc::new(provider));
        assert!(registry.contains("webSearch"));
        let out = registry.execute("webSearch", json!({"query": "tokio"})).await.unwrap();
        assert!(out.starts_with("result 1 for tokio"));
        assert!(matches!(
            registry.execute("webSearch", json!({"query": "fail"})).await,
            Err(ToolError::Failed(_))
        ));
    }

    #[tokio::test]
    async fn test_unauthorized_connect_fails() {
        let url = spawn_server().await;
        assert!(McpHttpProvider::connect("web_search", &url, Some("wrong"), 5).await.is_err());
        assert!(McpHttpProvider::connect("web_search", &url, None, 5).await.is_err());
    }
}
