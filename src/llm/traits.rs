//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DashScope / Mock）实现 LlmClient：complete（非流式）、complete_stream（流式片段）。

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::memory::Message;
use crate::tools::ToolDescriptor;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LlmError {
    #[error("model request failed: {0}")]
    Request(String),
    #[error("model request timed out after {0:?}")]
    Timeout(Duration),
    #[error("model stream interrupted: {0}")]
    Stream(String),
}

/// 一次模型调用的输入：完整消息序列（含 system）与本次可用的工具清单
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDescriptor>,
}

/// 文本片段流
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;

    /// 流式完成，返回片段流
    async fn complete_stream(&self, request: &ChatRequest) -> Result<FragmentStream, LlmError>;

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
