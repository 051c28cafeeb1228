//! 组装：按 AppConfig 构建 LLM 后端、工具注册表、检索索引与编排器
//!
//! 二进制入口（终端与 HTTP）共用这里的逻辑，保证各接入方式的工具与提示词一致。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::Orchestrator;
use crate::guardrail::SafeInputGuardrail;
use crate::llm::{create_dashscope_client, LlmClient, MockLlmClient, ModelAdapter, OpenAiClient};
use crate::memory::MemoryStore;
use crate::rag::{ChunkingConfig, DocumentIndex, RetrievalAdapter};
use crate::tools::{InterviewQuestionTool, McpHttpProvider, ToolExecutor, ToolRegistry};

pub const DEFAULT_SYSTEM_PROMPT: &str = "你是一位编程学习与求职面试助手（CodeHelper）。\
你帮助用户：规划编程学习路线、给出项目学习建议、提供求职指导（简历、投递、面试准备），并回答常见编程面试题。\
回答要准确、简洁、有条理；涉及代码时给出可运行的示例。\
当用户需要某个技术方向的面试题时，可以调用面试题搜索工具。";

/// 根据配置选择 LLM 后端（DashScope / OpenAI 兼容 / Mock）；缺少 API Key 时退回 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "mock" {
        tracing::info!("Using Mock LLM");
        return Arc::new(MockLlmClient::new());
    }
    let Some(api_key) = cfg.llm.resolve_api_key() else {
        tracing::warn!("No API key set, using Mock LLM");
        return Arc::new(MockLlmClient::new());
    };
    match provider.as_str() {
        "dashscope" => {
            tracing::info!("Using DashScope LLM ({})", cfg.llm.model);
            Arc::new(create_dashscope_client(
                cfg.llm.base_url.as_deref(),
                Some(&cfg.llm.model),
                &api_key,
            ))
        }
        "openai" => {
            tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
            Arc::new(OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, &api_key))
        }
        other => {
            tracing::warn!("Unknown LLM provider '{}', using Mock LLM", other);
            Arc::new(MockLlmClient::new())
        }
    }
}

/// 系统提示词：配置路径 > config/prompts/system.md > 内置默认
pub fn load_system_prompt(cfg: &AppConfig) -> String {
    let configured = cfg.app.system_prompt_path.iter().map(|p| p.to_path_buf());
    let defaults = ["config/prompts/system.md", "../config/prompts/system.md"]
        .into_iter()
        .map(|p| Path::new(p).to_path_buf());
    configured
        .chain(defaults)
        .find_map(|p| std::fs::read_to_string(p).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
}

/// 构建工具注册表；远程 MCP 服务连接失败时记录告警并跳过
pub async fn build_tool_registry(cfg: &AppConfig) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    let interview = &cfg.tools.interview;
    if interview.enabled {
        tools.register(InterviewQuestionTool::new(
            &interview.base_url,
            interview.timeout_secs,
            interview.max_results,
        ));
    }
    let mcp = &cfg.tools.mcp;
    if mcp.enabled {
        match McpHttpProvider::connect(&mcp.name, &mcp.url, mcp.api_key.as_deref(), mcp.timeout_secs).await {
            Ok(provider) => tools.register_provider(Arc::new(provider)),
            Err(e) => tracing::warn!(server = %mcp.name, error = %e, "MCP provider unavailable, continuing without it"),
        }
    }
    tools
}

/// 构建检索适配器；文档目录不可用时退化为不检索
pub fn build_retriever(cfg: &AppConfig) -> RetrievalAdapter {
    let rag = &cfg.rag;
    if !rag.enabled {
        return RetrievalAdapter::disabled();
    }
    let chunking = ChunkingConfig {
        chunk_size: rag.chunk_size,
        chunk_overlap: rag.chunk_overlap,
        ..ChunkingConfig::default()
    };
    match DocumentIndex::from_dir(&rag.docs_dir, chunking) {
        Ok(index) => {
            tracing::info!(dir = %rag.docs_dir.display(), chunks = index.len(), "document index loaded");
            RetrievalAdapter::new(Arc::new(index), rag.top_k, rag.min_score, rag.timeout_secs)
        }
        Err(e) => {
            tracing::warn!(dir = %rag.docs_dir.display(), error = %e, "document index unavailable, retrieval disabled");
            RetrievalAdapter::disabled()
        }
    }
}

/// 按配置构建编排器
pub async fn create_orchestrator(cfg: &AppConfig) -> Orchestrator {
    let llm = create_llm_from_config(cfg);
    let model = ModelAdapter::new(
        llm,
        Duration::from_secs(cfg.llm.timeouts.request.max(1)),
        Duration::from_secs(cfg.llm.timeouts.stream.max(1)),
    );
    let tools = ToolExecutor::new(
        build_tool_registry(cfg).await,
        cfg.tools.tool_timeout_secs,
        cfg.tools.max_concurrent_tools,
    );
    Orchestrator::builder(model)
        .guardrail(SafeInputGuardrail::new(cfg.guardrail.banned_words.iter()))
        .memory(Arc::new(MemoryStore::new(cfg.app.max_memory_messages)))
        .retriever(build_retriever(cfg))
        .tools(tools)
        .system_prompt(load_system_prompt(cfg))
        .max_tool_rounds(cfg.llm.max_tool_rounds)
        .build()
}

/// 后台定期回收空闲会话，直到 cancel 被触发
pub fn spawn_session_eviction(
    memory: Arc<MemoryStore>,
    idle_ttl: Duration,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    memory.evict_idle(idle_ttl).await;
                }
            }
        }
        tracing::debug!("session eviction stopped");
    })
}
