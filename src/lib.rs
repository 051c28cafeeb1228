//! CodeHelper - 编程学习与面试助手的对话编排核心
//!
//! 模块划分：
//! - **agent**: 按配置组装编排器（LLM、工具、检索、护轨、记忆）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 编排器、交换状态机、流式会话控制、错误分类
//! - **guardrail**: 输入护轨（敏感词）
//! - **llm**: LLM 后端抽象与实现（OpenAI 兼容 / DashScope / Mock）、调用适配与事件钩子
//! - **memory**: 按会话的有界消息窗口
//! - **rag**: 本地文档检索增强
//! - **tools**: 工具注册表、执行器、面试题搜索、MCP 远程工具
//! - **web**: HTTP SSE 接口（feature = "web"）

pub mod agent;
pub mod config;
pub mod core;
pub mod guardrail;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod rag;
pub mod tools;
#[cfg(feature = "web")]
pub mod web;
