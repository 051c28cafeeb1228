//! HTTP 流式接口（feature = "web"）
//!
//! - `GET {context_path}/ai/chat?memoryId=&message=`：SSE，每个片段一条 data 事件，
//!   成功结束后发送 `end` 事件；失败时发送一条致歉（或拒绝原因）data 事件后再发送 `end`。
//! - `GET {context_path}/health`：`OK`
//!
//! 客户端断开时 SSE 流被丢弃，StreamSession 随之取消，不再拉取模型输出。

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Router,
};
use futures_util::{stream, StreamExt};
use serde::Deserialize;

use crate::core::Orchestrator;
use crate::llm::StreamEvent;

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    #[serde(rename = "memoryId")]
    pub memory_id: Option<String>,
    pub message: Option<String>,
}

/// 构建路由；context_path 为空或 "/" 时不加前缀
pub fn router(orchestrator: Orchestrator, context_path: &str) -> Router {
    let api = Router::new()
        .route("/ai/chat", get(chat_sse))
        .route("/health", get(|| async { "OK" }))
        .with_state(orchestrator);
    let prefix = context_path.trim_end_matches('/');
    if prefix.is_empty() {
        api
    } else if prefix.starts_with('/') {
        Router::new().nest(prefix, api)
    } else {
        Router::new().nest(&format!("/{}", prefix), api)
    }
}

/// SSE 数据行不能含回车
fn sse_data(text: &str) -> Event {
    Event::default().data(text.replace('\r', ""))
}

fn end_event() -> Event {
    Event::default().event("end").data("")
}

fn to_sse_events(event: StreamEvent) -> Vec<Event> {
    match event {
        StreamEvent::Fragment(text) => vec![sse_data(&text)],
        StreamEvent::Completed => vec![end_event()],
        StreamEvent::Failed(message) => vec![sse_data(&message), end_event()],
    }
}

async fn chat_sse(State(orchestrator): State<Orchestrator>, Query(query): Query<ChatQuery>) -> Response {
    let (Some(memory_id), Some(message)) = (query.memory_id, query.message) else {
        return (
            StatusCode::BAD_REQUEST,
            "Missing required parameter: memoryId and message",
        )
            .into_response();
    };
    tracing::info!(session = %memory_id, "chat stream requested");
    let session = orchestrator.chat_stream(&memory_id, &message);
    let events = session
        .into_stream()
        .flat_map(|ev| stream::iter(to_sse_events(ev)))
        .map(Ok::<_, Infallible>);
    Sse::new(events)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keepalive"),
        )
        .into_response()
}
