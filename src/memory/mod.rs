//! 会话记忆层：消息类型、有界记忆窗口、按会话隔离的记忆存储

pub mod conversation;
pub mod store;

pub use conversation::{Message, MessageWindow, Role};
pub use store::{ExchangeGuard, MemoryStore};
