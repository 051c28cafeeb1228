//! 模型调用事件钩子：请求发出、回复完成、调用失败时同步回调

use crate::llm::{ChatRequest, LlmError};

pub trait ModelListener: Send + Sync {
    fn on_request(&self, _request: &ChatRequest) {}

    /// 完整回复（流式路径为累积后的全文）
    fn on_response(&self, _response: &str) {}

    fn on_error(&self, _error: &LlmError) {}
}

/// 默认监听器：写 tracing 日志
#[derive(Debug, Default)]
pub struct LoggingListener;

impl ModelListener for LoggingListener {
    fn on_request(&self, request: &ChatRequest) {
        tracing::info!(
            messages = request.messages.len(),
            tools = request.tools.len(),
            "model request"
        );
    }

    fn on_response(&self, response: &str) {
        tracing::info!(chars = response.chars().count(), "model response");
        tracing::debug!(response = %response, "model response body");
    }

    fn on_error(&self, error: &LlmError) {
        tracing::error!(error = %error, "model error");
    }
}
