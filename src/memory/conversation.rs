//! 会话消息与记忆窗口
//!
//! 每个会话保留最近 N 条消息（FIFO），超出时丢弃最旧的一条；插入顺序即唯一顺序，不重排不合并。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致；Tool 为工具观察结果）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

/// 单条消息（创建后不可变）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Tool 消息对应的工具名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn tool(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            ..Self::new(Role::Tool, content)
        }
    }
}

/// 记忆窗口：最多保留 capacity 条消息，超出时从最旧处淘汰
#[derive(Clone, Debug)]
pub struct MessageWindow {
    messages: Vec<Message>,
    capacity: usize,
}

impl MessageWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: Vec::new(),
            capacity,
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
        self.prune();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    fn prune(&mut self) {
        if self.messages.len() > self.capacity {
            let excess = self.messages.len() - self.capacity;
            self.messages.drain(..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_keeps_most_recent_in_order() {
        let mut window = MessageWindow::new(10);
        for i in 1..=12 {
            window.push(Message::user(format!("turn {}", i)));
        }
        assert_eq!(window.len(), 10);
        let contents: Vec<_> = window.messages().iter().map(|m| m.content.as_str()).collect();
        let expected: Vec<String> = (3..=12).map(|i| format!("turn {}", i)).collect();
        assert_eq!(contents, expected);
    }

    #[test]
    fn test_window_never_exceeds_capacity() {
        let mut window = MessageWindow::new(3);
        for i in 0..50 {
            window.push(Message::assistant(i.to_string()));
            assert!(window.len() <= 3);
        }
        assert_eq!(window.messages()[0].content, "47");
    }

    #[test]
    fn test_tool_message_carries_name() {
        let msg = Message::tool("interviewQuestionSearch", "1. What is Redis?");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_name.as_deref(), Some("interviewQuestionSearch"));
        assert!(Message::user("hi").tool_name.is_none());
    }
}
