//! DashScope（通义千问）客户端，走 OpenAI 兼容模式端点
//!
//! - Base URL: https://dashscope.aliyuncs.com/compatible-mode/v1
//! - 模型: qwen-max、qwen-plus、qwen-turbo 等

use crate::llm::OpenAiClient;

pub const DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const QWEN_MAX: &str = "qwen-max";

/// 创建 DashScope 客户端；base_url 为空时使用官方兼容端点
pub fn create_dashscope_client(base_url: Option<&str>, model: Option<&str>, api_key: &str) -> OpenAiClient {
    let base = base_url.unwrap_or(DASHSCOPE_BASE_URL);
    OpenAiClient::new(Some(base), model.unwrap_or(QWEN_MAX), api_key)
}
