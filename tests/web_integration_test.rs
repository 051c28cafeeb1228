//! HTTP SSE 接口集成测试（feature = "web"）

#[cfg(all(test, feature = "web"))]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use codehelper::core::Orchestrator;
    use codehelper::guardrail::SafeInputGuardrail;
    use codehelper::llm::{MockLlmClient, MockReply, ModelAdapter};
    use codehelper::web::router;

    fn app(mock: MockLlmClient) -> (axum::Router, Orchestrator) {
        let adapter = ModelAdapter::new(Arc::new(mock), Duration::from_secs(5), Duration::from_secs(5));
        let orchestrator = Orchestrator::builder(adapter)
            .guardrail(SafeInputGuardrail::default())
            .build();
        (router(orchestrator.clone(), "/api"), orchestrator)
    }

    async fn get(app: axum::Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_chat_streams_fragments_then_end() {
        let (app, orchestrator) = app(MockLlmClient::new());
        let (status, content_type, body) = get(app, "/api/ai/chat?memoryId=1&message=hello").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/event-stream"));
        let echo = body.find("data: Echo").unwrap();
        let last = body.find("data: hello").unwrap();
        let end = body.find("event: end").unwrap();
        assert!(echo < last && last < end);

        let history = orchestrator.history("1").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "Echo from Mock: hello");
    }

    #[tokio::test]
    async fn test_rejection_is_reported_in_stream() {
        let (app, orchestrator) = app(MockLlmClient::new());
        let (status, _, body) = get(app, "/api/ai/chat?memoryId=7&message=please%20kill%20it").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("data: Sensitive word detected: kill"));
        assert!(body.contains("event: end"));
        assert!(orchestrator.history("7").await.is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_sends_apology_then_end() {
        let mock = MockLlmClient::scripted([MockReply::Error("401 unauthorized".to_string())]);
        let (app, _) = app(mock);
        let (_, _, body) = get(app, "/api/ai/chat?memoryId=2&message=hi").await;
        assert!(body.contains("抱歉，处理您的请求时发生错误，请稍后重试。"));
        assert!(!body.contains("401"));
        assert!(body.contains("event: end"));
    }

    #[tokio::test]
    async fn test_missing_params_is_bad_request() {
        let (app, _) = app(MockLlmClient::new());
        let (status, _, _) = get(app.clone(), "/api/ai/chat?message=hello").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _, _) = get(app, "/api/ai/chat?memoryId=1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_and_context_path() {
        let (app, _) = app(MockLlmClient::new());
        let (status, _, body) = get(app.clone(), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
        let (status, _, _) = get(app, "/ai/chat?memoryId=1&message=hello").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
