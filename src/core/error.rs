//! 对话编排错误类型
//!
//! 与设计中的错误分类一一对应：输入被护轨拒绝、模型后端失败、工具循环失控、结构化输出解析失败、客户端取消。
//! 检索失败与单个工具失败在各自模块内就地恢复，不会出现在这里。

use thiserror::Error;

use crate::llm::LlmError;

/// 后端失败时统一展示给用户的致歉文案
pub const APOLOGY_MESSAGE: &str = "抱歉，处理您的请求时发生错误，请稍后重试。";

/// 单次对话交换中不可恢复的错误
#[derive(Error, Debug)]
pub enum ChatError {
    /// 护轨拒绝；reason 直接展示给用户
    #[error("Input rejected: {0}")]
    Rejected(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// 超过最大工具轮数仍未得到最终回答，按模型后端失败处理
    #[error("Tool loop exhausted after {0} rounds")]
    ToolLoopExhausted(usize),

    /// 结构化输出（如学习报告）无法解析
    #[error("Malformed model reply: {0}")]
    MalformedReply(String),

    #[error("Cancelled by client")]
    Cancelled,
}

impl ChatError {
    /// 是否需要按故障记录（拒绝与取消不是故障）
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ChatError::Rejected(_) | ChatError::Cancelled)
    }

    /// 面向用户的文案：拒绝时给出原因，其余一律致歉
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Rejected(reason) => reason.clone(),
            _ => APOLOGY_MESSAGE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_is_not_fatal() {
        let err = ChatError::Rejected("Sensitive word detected: kill".to_string());
        assert!(!err.is_fatal());
        assert_eq!(err.user_message(), "Sensitive word detected: kill");
    }

    #[test]
    fn test_backend_failure_renders_apology() {
        let err = ChatError::Llm(LlmError::Request("connection refused".to_string()));
        assert!(err.is_fatal());
        assert_eq!(err.user_message(), APOLOGY_MESSAGE);
        assert_eq!(ChatError::ToolLoopExhausted(5).user_message(), APOLOGY_MESSAGE);
    }
}
