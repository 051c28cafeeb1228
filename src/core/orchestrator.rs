//! 对话编排器
//!
//! 每次交换：护轨校验 -> 获取会话交换锁 -> 检索增强 -> 组装提示与工具清单 -> 调用模型
//! -> （同步路径）工具循环 -> 产出回答 -> 记录到会话记忆。
//! 同一会话的交换串行执行，不同会话完全并行。记忆只在得到完整回答后写入一次（user + assistant）。

use std::sync::Arc;

use futures_util::{stream, StreamExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::error::{ChatError, APOLOGY_MESSAGE};
use crate::core::exchange::{Exchange, ExchangePhase};
use crate::core::stream::StreamSession;
use crate::guardrail::{GuardrailResult, InputGuardrail};
use crate::llm::{EventStream, ModelAdapter, ModelInput, StreamEvent};
use crate::memory::{ExchangeGuard, MemoryStore, Message};
use crate::rag::{augment_user_message, RetrievalAdapter, RetrievedChunk};
use crate::tools::{json_schema_of, ToolDescriptor, ToolExecutor, ToolRegistry};

/// 结构化输出：学习报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// 报告标题
    pub name: String,
    /// 建议列表
    pub suggestion_list: Vec<String>,
}

/// 带来源的回答
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalAnswer {
    pub content: String,
    pub sources: Vec<RetrievedChunk>,
}

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 5;
pub const DEFAULT_STREAM_BUFFER: usize = 16;

struct Inner {
    guardrails: Vec<Arc<dyn InputGuardrail>>,
    memory: Arc<MemoryStore>,
    retriever: RetrievalAdapter,
    tools: ToolExecutor,
    model: ModelAdapter,
    system_prompt: String,
    max_tool_rounds: usize,
    stream_buffer: usize,
}

/// 编排器；克隆开销为一次 Arc 计数，可在各请求间共享
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

pub struct OrchestratorBuilder {
    model: ModelAdapter,
    guardrails: Vec<Arc<dyn InputGuardrail>>,
    memory: Option<Arc<MemoryStore>>,
    retriever: Option<RetrievalAdapter>,
    tools: Option<ToolExecutor>,
    system_prompt: String,
    max_tool_rounds: usize,
    stream_buffer: usize,
}

impl OrchestratorBuilder {
    pub fn guardrail(mut self, guardrail: impl InputGuardrail + 'static) -> Self {
        self.guardrails.push(Arc::new(guardrail));
        self
    }

    pub fn memory(mut self, memory: Arc<MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn retriever(mut self, retriever: RetrievalAdapter) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn tools(mut self, tools: ToolExecutor) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn stream_buffer(mut self, buffer: usize) -> Self {
        self.stream_buffer = buffer.max(1);
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator {
            inner: Arc::new(Inner {
                guardrails: self.guardrails,
                memory: self.memory.unwrap_or_default(),
                retriever: self.retriever.unwrap_or_else(RetrievalAdapter::disabled),
                tools: self
                    .tools
                    .unwrap_or_else(|| ToolExecutor::new(ToolRegistry::new(), 10, 3)),
                model: self.model,
                system_prompt: self.system_prompt,
                max_tool_rounds: self.max_tool_rounds,
                stream_buffer: self.stream_buffer,
            }),
        }
    }
}

/// 同步路径的变体
#[derive(Clone, Copy)]
enum SyncMode {
    /// 带工具清单，允许工具循环
    Chat,
    /// 要求按 Report 的 JSON Schema 作答，不提供工具
    Report,
}

struct SyncAnswer {
    content: String,
    sources: Vec<RetrievedChunk>,
}

impl Orchestrator {
    pub fn builder(model: ModelAdapter) -> OrchestratorBuilder {
        OrchestratorBuilder {
            model,
            guardrails: Vec::new(),
            memory: None,
            retriever: None,
            tools: None,
            system_prompt: String::new(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.inner.memory
    }

    pub fn system_prompt(&self) -> &str {
        &self.inner.system_prompt
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.inner.tools.list_available()
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.model.token_usage()
    }

    /// 会话历史（未知会话为空）
    pub async fn history(&self, session_id: &str) -> Vec<Message> {
        self.inner.memory.get(session_id).await
    }

    /// 清空会话历史；等待该会话进行中的交换结束
    pub async fn clear_history(&self, session_id: &str) {
        let _guard = self.inner.memory.begin_exchange(session_id).await;
        self.inner.memory.clear(session_id).await;
    }

    pub async fn chat(&self, session_id: &str, message: &str) -> Result<String, ChatError> {
        self.run_sync(session_id, message, SyncMode::Chat)
            .await
            .map(|a| a.content)
    }

    pub async fn chat_with_retrieval(&self, session_id: &str, message: &str) -> Result<RetrievalAnswer, ChatError> {
        let answer = self.run_sync(session_id, message, SyncMode::Chat).await?;
        Ok(RetrievalAnswer {
            content: answer.content,
            sources: answer.sources,
        })
    }

    pub async fn chat_with_report(&self, session_id: &str, message: &str) -> Result<Report, ChatError> {
        let answer = self.run_sync(session_id, message, SyncMode::Report).await?;
        parse_report(&answer.content)
    }

    /// 流式路径，由 StreamSession 在后台拉取
    pub fn chat_stream(&self, session_id: &str, message: &str) -> StreamSession {
        StreamSession::spawn(self.chat_event_stream(session_id, message), self.inner.stream_buffer)
    }

    /// 惰性事件流：首次轮询才开始交换。失败事件携带面向用户的文案（拒绝原因或致歉）
    pub fn chat_event_stream(&self, session_id: &str, message: &str) -> EventStream {
        let this = self.clone();
        let session_id = session_id.to_string();
        let message = message.to_string();
        Box::pin(stream::once(async move { this.prepare_stream(session_id, message).await }).flatten())
    }

    fn validate(&self, exchange: &mut Exchange, message: &str) -> Result<(), ChatError> {
        for guardrail in &self.inner.guardrails {
            if let GuardrailResult::Rejected { reason } = guardrail.validate(message) {
                tracing::info!(exchange = %exchange.id(), reason = %reason, "input rejected");
                exchange.advance(ExchangePhase::Rejected);
                return Err(ChatError::Rejected(reason));
            }
        }
        Ok(())
    }

    async fn retrieve(&self, exchange: &mut Exchange, message: &str) -> Vec<RetrievedChunk> {
        exchange.advance(ExchangePhase::Retrieving);
        match self.inner.retriever.retrieve(message).await {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::warn!(exchange = %exchange.id(), error = %e, "retrieval failed, answering without augmentation");
                Vec::new()
            }
        }
    }

    fn report_system_prompt(&self) -> String {
        let schema = serde_json::to_string_pretty(&json_schema_of::<Report>()).unwrap_or_default();
        let instruction = format!(
            "Respond ONLY with a JSON object that matches the following JSON schema, without any other text:\n```json\n{}\n```",
            schema
        );
        if self.inner.system_prompt.trim().is_empty() {
            instruction
        } else {
            format!("{}\n\n{}", self.inner.system_prompt, instruction)
        }
    }

    async fn run_sync(&self, session_id: &str, message: &str, mode: SyncMode) -> Result<SyncAnswer, ChatError> {
        let mut exchange = Exchange::new(session_id);
        self.validate(&mut exchange, message)?;

        let _guard = self.inner.memory.begin_exchange(session_id).await;
        let sources = self.retrieve(&mut exchange, message).await;

        exchange.advance(ExchangePhase::Assembling);
        let history = self.inner.memory.get(session_id).await;
        let user_input = augment_user_message(message, &sources);
        let (system_prompt, tools) = match mode {
            SyncMode::Chat => (self.inner.system_prompt.clone(), self.inner.tools.list_available()),
            SyncMode::Report => (self.report_system_prompt(), Vec::new()),
        };

        let mut transcript: Vec<Message> = Vec::new();
        let mut rounds = 0;
        let answer = loop {
            exchange.advance(ExchangePhase::Invoking);
            let input = ModelInput {
                system_prompt: &system_prompt,
                history: &history,
                user_input: &user_input,
                transcript: &transcript,
                tools: &tools,
            };
            let reply = match self.inner.model.invoke_sync(&input).await {
                Ok(reply) => reply,
                Err(e) => {
                    exchange.fail(&e.to_string());
                    return Err(e.into());
                }
            };
            if !reply.wants_tools() {
                break reply.text;
            }
            if rounds >= self.inner.max_tool_rounds {
                let err = ChatError::ToolLoopExhausted(rounds);
                exchange.fail(&err.to_string());
                return Err(err);
            }
            rounds += 1;
            exchange.advance(ExchangePhase::ToolLoop);
            tracing::info!(
                exchange = %exchange.id(),
                round = rounds,
                calls = reply.tool_calls.len(),
                "model requested tools"
            );
            transcript.push(Message::assistant(reply.text.clone()));
            for result in self.inner.tools.invoke_all(reply.tool_calls).await {
                transcript.push(Message::tool(result.name.clone(), result.observation()));
            }
        };

        exchange.advance(ExchangePhase::Responding);
        exchange.advance(ExchangePhase::Recording);
        if answer.trim().is_empty() {
            tracing::warn!(exchange = %exchange.id(), "empty answer, nothing recorded");
        } else {
            self.inner
                .memory
                .append_exchange(session_id, Message::user(message), Message::assistant(answer.clone()))
                .await;
        }
        exchange.advance(ExchangePhase::Done);
        Ok(SyncAnswer {
            content: answer,
            sources,
        })
    }

    async fn prepare_stream(self, session_id: String, message: String) -> EventStream {
        let mut exchange = Exchange::new(&session_id);
        if let Err(e) = self.validate(&mut exchange, &message) {
            return Box::pin(stream::iter([StreamEvent::Failed(e.user_message())]));
        }

        let guard = self.inner.memory.begin_exchange(&session_id).await;
        let sources = self.retrieve(&mut exchange, &message).await;

        exchange.advance(ExchangePhase::Assembling);
        let history = self.inner.memory.get(&session_id).await;
        let user_input = augment_user_message(&message, &sources);

        exchange.advance(ExchangePhase::Invoking);
        let upstream = self.inner.model.invoke_stream(&ModelInput {
            system_prompt: &self.inner.system_prompt,
            history: &history,
            user_input: &user_input,
            transcript: &[],
            tools: &[],
        });

        let recorder = Recorder {
            upstream,
            exchange,
            memory: self.inner.memory.clone(),
            _guard: guard,
            user_message: message,
            answer: String::new(),
        };
        Box::pin(stream::unfold(Some(recorder), |state| async move {
            let Some(mut recorder) = state else {
                return None;
            };
            let event = recorder.next().await;
            let keep = if event.is_terminal() { None } else { Some(recorder) };
            Some((event, keep))
        }))
    }
}

/// 流式路径的记录器：转发片段并累积回答，在完成时写入记忆；持有会话交换锁直到流结束或被丢弃
struct Recorder {
    upstream: EventStream,
    exchange: Exchange,
    memory: Arc<MemoryStore>,
    _guard: ExchangeGuard,
    user_message: String,
    answer: String,
}

impl Recorder {
    async fn next(&mut self) -> StreamEvent {
        match self.upstream.next().await {
            Some(StreamEvent::Fragment(fragment)) => {
                if self.exchange.phase() == ExchangePhase::Invoking {
                    self.exchange.advance(ExchangePhase::Responding);
                }
                self.answer.push_str(&fragment);
                StreamEvent::Fragment(fragment)
            }
            Some(StreamEvent::Completed) => {
                if self.exchange.phase() == ExchangePhase::Invoking {
                    self.exchange.advance(ExchangePhase::Responding);
                }
                self.exchange.advance(ExchangePhase::Recording);
                if self.answer.trim().is_empty() {
                    tracing::warn!(exchange = %self.exchange.id(), "empty answer, nothing recorded");
                } else {
                    self.memory
                        .append_exchange(
                            self.exchange.session_id(),
                            Message::user(self.user_message.clone()),
                            Message::assistant(self.answer.clone()),
                        )
                        .await;
                }
                self.exchange.advance(ExchangePhase::Done);
                StreamEvent::Completed
            }
            Some(StreamEvent::Failed(reason)) => {
                self.exchange.fail(&reason);
                StreamEvent::Failed(APOLOGY_MESSAGE.to_string())
            }
            None => {
                self.exchange.fail("model stream ended without a terminal event");
                StreamEvent::Failed(APOLOGY_MESSAGE.to_string())
            }
        }
    }
}

/// 解析结构化报告：整体 JSON、```json 代码块或首尾花括号之间的内容
fn parse_report(text: &str) -> Result<Report, ChatError> {
    let trimmed = text.trim();
    let fenced = trimmed.find("```json").and_then(|start| {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim())
    });
    let braced = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&trimmed[start..=end]),
        _ => None,
    };
    [Some(trimmed), fenced, braced]
        .into_iter()
        .flatten()
        .find_map(|candidate| serde_json::from_str::<Report>(candidate).ok())
        .ok_or_else(|| ChatError::MalformedReply(trimmed.chars().take(200).collect()))
}
