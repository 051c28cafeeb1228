//! Mock LLM 客户端（用于测试与无 Key 的本地运行）
//!
//! 按脚本依次返回预设回复；脚本用完后回显最后一条 User 消息。
//! 流式路径把回复拆成若干片段，可设置片段间延迟以模拟真实生成。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};

use crate::llm::{ChatRequest, FragmentStream, LlmClient, LlmError};
use crate::memory::Role;

/// 预设回复
#[derive(Debug, Clone)]
pub enum MockReply {
    /// 完整文本；流式时按空白切成片段
    Text(String),
    /// 指定片段；非流式时拼接
    Fragments(Vec<String>),
    /// 先产出这些片段，再以给定错误中断
    FailAfter(Vec<String>, String),
    /// 调用直接失败
    Error(String),
}

#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<ChatRequest>>,
    fragment_delay: Option<Duration>,
}

fn split_words(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_string).collect()
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = Some(delay);
        self
    }

    pub fn push(&self, reply: MockReply) {
        self.script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(reply);
    }

    /// 已收到的请求（按调用顺序）
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn next_reply(&self, request: &ChatRequest) -> MockReply {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request.clone());
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        scripted.unwrap_or_else(|| {
            let last_user = request
                .messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.as_str())
                .unwrap_or("(no input)");
            MockReply::Text(format!("Echo from Mock: {}", last_user))
        })
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        match self.next_reply(request) {
            MockReply::Text(text) => Ok(text),
            MockReply::Fragments(parts) => Ok(parts.concat()),
            MockReply::FailAfter(_, e) | MockReply::Error(e) => Err(LlmError::Request(e)),
        }
    }

    async fn complete_stream(&self, request: &ChatRequest) -> Result<FragmentStream, LlmError> {
        let items: Vec<Result<String, LlmError>> = match self.next_reply(request) {
            MockReply::Text(text) => split_words(&text).into_iter().map(Ok).collect(),
            MockReply::Fragments(parts) => parts.into_iter().map(Ok).collect(),
            MockReply::FailAfter(parts, e) => parts
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(LlmError::Stream(e))))
                .collect(),
            MockReply::Error(e) => return Err(LlmError::Request(e)),
        };
        match self.fragment_delay {
            Some(delay) => Ok(Box::pin(stream::iter(items).then(move |item| async move {
                tokio::time::sleep(delay).await;
                item
            }))),
            None => Ok(Box::pin(stream::iter(items))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;

    fn request(text: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![Message::system("sys"), Message::user(text)],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_script_then_echo() {
        let mock = MockLlmClient::scripted([MockReply::Text("first".to_string())]);
        assert_eq!(mock.complete(&request("a")).await.unwrap(), "first");
        assert_eq!(
            mock.complete(&request("what is rust")).await.unwrap(),
            "Echo from Mock: what is rust"
        );
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_stream_fail_after() {
        let mock = MockLlmClient::scripted([MockReply::FailAfter(
            vec!["a".to_string(), "b".to_string()],
            "reset".to_string(),
        )]);
        let items: Vec<_> = mock
            .complete_stream(&request("x"))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[1], Ok("b".to_string()));
        assert_eq!(items[2], Err(LlmError::Stream("reset".to_string())));
    }

    #[tokio::test]
    async fn test_text_streams_as_words() {
        let mock = MockLlmClient::scripted([MockReply::Text("hello big world".to_string())]);
        let items: Vec<_> = mock
            .complete_stream(&request("x"))
            .await
            .unwrap()
            .collect()
            .await;
        let parts: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(parts, vec!["hello ", "big ", "world"]);
    }
}
