//! 模型调用适配层
//!
//! 统一两种调用方式：同步（返回完整回复，可能包含工具调用请求）与流式（文本片段事件流）。
//! 负责组装消息序列、施加超时、在调用前后回调 ModelListener。
//! 流式事件序列保证：若干 Fragment 之后恰好一个终止事件（Completed 或 Failed），之后不再有事件。

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{stream, Stream, StreamExt};
use tokio::time::timeout;

use crate::llm::{
    parse_model_output, ChatRequest, FragmentStream, LlmClient, LlmError, LoggingListener,
    ModelListener, ModelReply,
};
use crate::memory::Message;
use crate::tools::{render_tool_manifest, ToolDescriptor};

/// 一次模型调用的组成部分
#[derive(Debug, Clone, Copy)]
pub struct ModelInput<'a> {
    pub system_prompt: &'a str,
    /// 会话记忆中的历史消息
    pub history: &'a [Message],
    /// 本轮用户输入（可能已被检索增强）
    pub user_input: &'a str,
    /// 本次交换内的工具调用与观察
    pub transcript: &'a [Message],
    pub tools: &'a [ToolDescriptor],
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Fragment(String),
    Completed,
    Failed(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Fragment(_))
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

type Listeners = Arc<Vec<Arc<dyn ModelListener>>>;

#[derive(Clone)]
pub struct ModelAdapter {
    client: Arc<dyn LlmClient>,
    listeners: Listeners,
    request_timeout: Duration,
    stream_idle_timeout: Duration,
}

impl ModelAdapter {
    /// 默认挂载 LoggingListener
    pub fn new(client: Arc<dyn LlmClient>, request_timeout: Duration, stream_idle_timeout: Duration) -> Self {
        Self::with_listeners(
            client,
            vec![Arc::new(LoggingListener)],
            request_timeout,
            stream_idle_timeout,
        )
    }

    pub fn with_listeners(
        client: Arc<dyn LlmClient>,
        listeners: Vec<Arc<dyn ModelListener>>,
        request_timeout: Duration,
        stream_idle_timeout: Duration,
    ) -> Self {
        Self {
            client,
            listeners: Arc::new(listeners),
            request_timeout,
            stream_idle_timeout,
        }
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.client.token_usage()
    }

    pub fn build_request(input: &ModelInput<'_>) -> ChatRequest {
        let manifest = render_tool_manifest(input.tools);
        let system = match (input.system_prompt.trim().is_empty(), manifest.is_empty()) {
            (true, true) => String::new(),
            (false, true) => input.system_prompt.to_string(),
            (true, false) => manifest,
            (false, false) => format!("{}\n\n{}", input.system_prompt, manifest),
        };
        let mut messages = Vec::with_capacity(input.history.len() + input.transcript.len() + 2);
        if !system.is_empty() {
            messages.push(Message::system(system));
        }
        messages.extend_from_slice(input.history);
        messages.push(Message::user(input.user_input));
        messages.extend_from_slice(input.transcript);
        ChatRequest {
            messages,
            tools: input.tools.to_vec(),
        }
    }

    /// 同步调用：完整回复，工具清单非空时解析工具调用
    pub async fn invoke_sync(&self, input: &ModelInput<'_>) -> Result<ModelReply, LlmError> {
        let request = Self::build_request(input);
        notify_request(&self.listeners, &request);
        let result = match timeout(self.request_timeout, self.client.complete(&request)).await {
            Ok(r) => r,
            Err(_) => Err(LlmError::Timeout(self.request_timeout)),
        };
        match result {
            Ok(text) => {
                notify_response(&self.listeners, &text);
                Ok(parse_model_output(&text, !input.tools.is_empty()))
            }
            Err(e) => {
                notify_error(&self.listeners, &e);
                Err(e)
            }
        }
    }

    /// 流式调用（不带工具）；返回的事件流是惰性的，首次轮询时才发起请求
    pub fn invoke_stream(&self, input: &ModelInput<'_>) -> EventStream {
        let request = Self::build_request(&ModelInput { tools: &[], ..*input });
        let ctx = StreamCtx {
            client: self.client.clone(),
            listeners: self.listeners.clone(),
            request_timeout: self.request_timeout,
            idle_timeout: self.stream_idle_timeout,
        };
        Box::pin(stream::unfold(
            (Phase::Start(request), ctx),
            |(phase, ctx)| async move { ctx.step(phase).await },
        ))
    }
}

fn notify_request(listeners: &Listeners, request: &ChatRequest) {
    for l in listeners.iter() {
        l.on_request(request);
    }
}

fn notify_response(listeners: &Listeners, response: &str) {
    for l in listeners.iter() {
        l.on_response(response);
    }
}

fn notify_error(listeners: &Listeners, error: &LlmError) {
    for l in listeners.iter() {
        l.on_error(error);
    }
}

enum Phase {
    Start(ChatRequest),
    Streaming(FragmentStream, String),
    Done,
}

struct StreamCtx {
    client: Arc<dyn LlmClient>,
    listeners: Listeners,
    request_timeout: Duration,
    idle_timeout: Duration,
}

impl StreamCtx {
    fn fail(self, error: LlmError) -> Option<(StreamEvent, (Phase, StreamCtx))> {
        notify_error(&self.listeners, &error);
        Some((StreamEvent::Failed(error.to_string()), (Phase::Done, self)))
    }

    async fn step(self, mut phase: Phase) -> Option<(StreamEvent, (Phase, StreamCtx))> {
        loop {
            match phase {
                Phase::Done => return None,
                Phase::Start(request) => {
                    notify_request(&self.listeners, &request);
                    match timeout(self.request_timeout, self.client.complete_stream(&request)).await {
                        Ok(Ok(inner)) => phase = Phase::Streaming(inner, String::new()),
                        Ok(Err(e)) => return self.fail(e),
                        Err(_) => {
                            let e = LlmError::Timeout(self.request_timeout);
                            return self.fail(e);
                        }
                    }
                }
                Phase::Streaming(mut inner, mut acc) => {
                    match timeout(self.idle_timeout, inner.next()).await {
                        Ok(Some(Ok(fragment))) if fragment.is_empty() => {
                            phase = Phase::Streaming(inner, acc);
                        }
                        Ok(Some(Ok(fragment))) => {
                            acc.push_str(&fragment);
                            return Some((StreamEvent::Fragment(fragment), (Phase::Streaming(inner, acc), self)));
                        }
                        Ok(Some(Err(e))) => return self.fail(e),
                        Ok(None) => {
                            notify_response(&self.listeners, &acc);
                            return Some((StreamEvent::Completed, (Phase::Done, self)));
                        }
                        Err(_) => {
                            let e = LlmError::Stream(format!("no fragment within {:?}", self.idle_timeout));
                            return self.fail(e);
                        }
                    }
                }
            }
        }
    }
}
