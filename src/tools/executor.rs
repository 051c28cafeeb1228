//! 工具执行器
//!
//! 共享的只有 ToolRegistry 与外层超时；并发池在每批调用时新建，不同会话的工具调用互不排队。
//! 每次调用输出结构化审计日志（JSON）。
//! 单个工具失败或超时只会变成 ToolOutcome::Error，不会中断整次交换。

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::time::timeout;

use crate::core::TaskScheduler;
use crate::tools::{ToolDescriptor, ToolError, ToolInvocationRequest, ToolInvocationResult, ToolOutcome, ToolRegistry};

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    max_concurrent_tools: usize,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64, max_concurrent_tools: usize) -> Self {
        Self {
            registry: Arc::new(registry),
            timeout: Duration::from_secs(timeout_secs.max(1)),
            max_concurrent_tools: max_concurrent_tools.max(1),
        }
    }

    pub fn list_available(&self) -> Vec<ToolDescriptor> {
        self.registry.list_available()
    }

    /// 执行单个工具调用；超时与失败都折叠为错误结果
    pub async fn invoke(&self, request: ToolInvocationRequest) -> ToolInvocationResult {
        let start = Instant::now();
        let args_preview = args_preview(&request.arguments);
        let result = timeout(
            self.timeout,
            self.registry.execute(&request.name, request.arguments),
        )
        .await;

        let (ok, outcome_label): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": request.name,
            "ok": ok,
            "outcome": outcome_label,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        let outcome = match result {
            Ok(Ok(content)) => ToolOutcome::Output(content),
            Ok(Err(e)) => {
                tracing::warn!(tool = %request.name, error = %e, "tool failed");
                ToolOutcome::Error(e.to_string())
            }
            Err(_) => {
                let e = ToolError::Timeout {
                    tool: request.name.clone(),
                    secs: self.timeout.as_secs(),
                };
                tracing::warn!(tool = %request.name, error = %e, "tool timed out");
                ToolOutcome::Error(e.to_string())
            }
        };
        ToolInvocationResult {
            id: request.id,
            name: request.name,
            outcome,
        }
    }

    /// 并发执行同一交换内的一批调用，结果顺序与请求顺序一致。
    /// 并发上限只约束这一批，其他交换使用各自的池。
    pub async fn invoke_all(&self, requests: Vec<ToolInvocationRequest>) -> Vec<ToolInvocationResult> {
        let scheduler = TaskScheduler::new(self.max_concurrent_tools);
        join_all(requests.into_iter().map(|r| self.invoke_pooled(&scheduler, r))).await
    }

    async fn invoke_pooled(&self, scheduler: &TaskScheduler, request: ToolInvocationRequest) -> ToolInvocationResult {
        match scheduler.acquire_tool().await {
            Some(_permit) => self.invoke(request).await,
            None => {
                let e = ToolError::PoolClosed(request.name.clone());
                tracing::warn!(tool = %request.name, error = %e, "tool not started");
                ToolInvocationResult {
                    id: request.id,
                    name: request.name,
                    outcome: ToolOutcome::Error(e.to_string()),
                }
            }
        }
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
