//! LLM 层：后端抽象与实现（OpenAI 兼容 / DashScope / Mock）、调用适配、事件钩子、回复解析

pub mod adapter;
pub mod dashscope;
pub mod listener;
pub mod mock;
pub mod openai;
pub mod parse;
pub mod traits;

pub use adapter::{EventStream, ModelAdapter, ModelInput, StreamEvent};
pub use dashscope::{create_dashscope_client, DASHSCOPE_BASE_URL, QWEN_MAX};
pub use listener::{LoggingListener, ModelListener};
pub use mock::{MockLlmClient, MockReply};
pub use openai::{OpenAiClient, TokenUsage};
pub use parse::{parse_model_output, ModelReply};
pub use traits::{ChatRequest, FragmentStream, LlmClient, LlmError};
