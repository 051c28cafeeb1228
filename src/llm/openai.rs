//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；DashScope 兼容模式、OpenAI、自建代理均可。
//! 流式路径使用 create_stream，逐片段产出 delta.content。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::llm::{ChatRequest, FragmentStream, LlmClient, LlmError};
use crate::memory::{Message, Role};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            usage: TokenUsage::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_openai_message(m: &Message) -> Result<ChatCompletionRequestMessage, LlmError> {
        let built = match m.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(m.content.clone())
                .build()
                .map(ChatCompletionRequestMessage::System),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(m.content.clone())
                .build()
                .map(ChatCompletionRequestMessage::User),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(m.content.clone())
                .build()
                .map(ChatCompletionRequestMessage::Assistant),
            // 工具观察以用户消息回填，兼容不支持 tool 角色的端点
            Role::Tool => ChatCompletionRequestUserMessageArgs::default()
                .content(format!(
                    "Observation from {}: {}",
                    m.tool_name.as_deref().unwrap_or("tool"),
                    m.content
                ))
                .build()
                .map(ChatCompletionRequestMessage::User),
        };
        built.map_err(|e| LlmError::Request(e.to_string()))
    }

    fn build_request(&self, request: &ChatRequest, stream: bool) -> Result<CreateChatCompletionRequest, LlmError> {
        let messages = request
            .messages
            .iter()
            .map(Self::to_openai_message)
            .collect::<Result<Vec<_>, _>>()?;
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(messages);
        if stream {
            args.stream(true);
        }
        args.build().map_err(|e| LlmError::Request(e.to_string()))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let req = self.build_request(request, false)?;
        let response = self
            .client
            .chat()
            .create(req)
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        Ok(response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }

    async fn complete_stream(&self, request: &ChatRequest) -> Result<FragmentStream, LlmError> {
        let req = self.build_request(request, true)?;
        let stream = self
            .client
            .chat()
            .create_stream(req)
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;
        let usage = self.usage.clone();
        let fragments = stream.filter_map(move |chunk| {
            let usage = usage.clone();
            async move {
                match chunk {
                    Ok(resp) => {
                        if let Some(u) = &resp.usage {
                            usage.add(u.prompt_tokens as u64, u.completion_tokens as u64);
                        }
                        resp.choices
                            .first()
                            .and_then(|c| c.delta.content.clone())
                            .filter(|s| !s.is_empty())
                            .map(Ok)
                    }
                    Err(e) => Some(Err(LlmError::Stream(e.to_string()))),
                }
            }
        });
        Ok(Box::pin(fragments))
    }
}
