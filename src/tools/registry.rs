//! 工具注册表与调用路由
//!
//! 本地工具实现 Tool trait（name / description / parameters_schema / execute）；
//! 远程工具提供方（如 MCP 服务）实现 ToolProvider，按名转发调用。
//! 注册只在启动时进行，运行期只读；同名时本地工具优先。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// 路由层错误；执行器将其折叠为 ToolOutcome::Error
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    Unknown(String),
    #[error("{0}")]
    Failed(String),
    #[error("Tool {tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },
    #[error("Tool pool closed before {0} could run")]
    PoolClosed(String),
}

/// 提供给模型的工具清单条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// 参数 JSON Schema
    pub parameters: Value,
}

/// 模型请求的一次工具调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// 工具调用结果：失败也是结果，作为观察回填给模型
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Output(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationResult {
    pub id: String,
    pub name: String,
    pub outcome: ToolOutcome,
}

impl ToolInvocationResult {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Error(_))
    }

    /// 回填给模型的观察文本
    pub fn observation(&self) -> String {
        match &self.outcome {
            ToolOutcome::Output(text) => text.clone(),
            ToolOutcome::Error(e) => format!("Error: {}", e),
        }
    }
}

/// 本地工具 trait
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解用途）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；Err 为错误文本，由路由转成观察
    async fn execute(&self, args: Value) -> Result<String, String>;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// 远程工具提供方：启动时连接并缓存工具清单，调用时经其传输协议转发
#[async_trait]
pub trait ToolProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    fn tools(&self) -> Vec<ToolDescriptor>;

    async fn call(&self, name: &str, args: Value) -> Result<String, String>;
}

#[derive(Clone)]
enum Route {
    Local(Arc<dyn Tool>),
    Remote(Arc<dyn ToolProvider>),
}

#[derive(Default)]
pub struct ToolRegistry {
    local: HashMap<String, Arc<dyn Tool>>,
    providers: Vec<Arc<dyn ToolProvider>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.local.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "local tool registered twice, keeping the latest");
        }
    }

    pub fn register_provider(&mut self, provider: Arc<dyn ToolProvider>) {
        tracing::info!(
            provider = %provider.provider_name(),
            tools = provider.tools().len(),
            "remote tool provider registered"
        );
        self.providers.push(provider);
    }

    fn resolve(&self, name: &str) -> Option<Route> {
        if let Some(tool) = self.local.get(name) {
            return Some(Route::Local(tool.clone()));
        }
        self.providers
            .iter()
            .find(|p| p.tools().iter().any(|t| t.name == name))
            .map(|p| Route::Remote(p.clone()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// 当前可调用的工具清单（按名称排序，同名以本地为准）
    pub fn list_available(&self) -> Vec<ToolDescriptor> {
        let mut by_name: HashMap<String, ToolDescriptor> = HashMap::new();
        for provider in &self.providers {
            for tool in provider.tools() {
                by_name.entry(tool.name.clone()).or_insert(tool);
            }
        }
        for tool in self.local.values() {
            by_name.insert(tool.name().to_string(), tool.descriptor());
        }
        let mut tools: Vec<ToolDescriptor> = by_name.into_values().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, ToolError> {
        match self.resolve(name) {
            Some(Route::Local(tool)) => tool.execute(args).await.map_err(ToolError::Failed),
            Some(Route::Remote(provider)) => provider.call(name, args).await.map_err(ToolError::Failed),
            None => Err(ToolError::Unknown(name.to_string())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.providers.iter().all(|p| p.tools().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &str {
            "upper"
        }

        fn description(&self) -> &str {
            "Uppercase text. Args: {\"text\": \"...\"}"
        }

        async fn execute(&self, args: Value) -> Result<String, String> {
            args.get("text")
                .and_then(|v| v.as_str())
                .map(|s| s.to_uppercase())
                .ok_or_else(|| "Missing text".to_string())
        }
    }

    struct FakeProvider;

    #[async_trait]
    impl ToolProvider for FakeProvider {
        fn provider_name(&self) -> &str {
            "fake"
        }

        fn tools(&self) -> Vec<ToolDescriptor> {
            vec![
                ToolDescriptor {
                    name: "webSearch".to_string(),
                    description: "remote search".to_string(),
                    parameters: serde_json::json!({"type": "object"}),
                },
                ToolDescriptor {
                    name: "upper".to_string(),
                    description: "shadowed".to_string(),
                    parameters: serde_json::json!({"type": "object"}),
                },
            ]
        }

        async fn call(&self, name: &str, _args: Value) -> Result<String, String> {
            Ok(format!("remote:{}", name))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(UpperTool);
        registry.register_provider(Arc::new(FakeProvider));
        registry
    }

    #[tokio::test]
    async fn test_routes_local_and_remote() {
        let registry = registry();
        let local = registry.execute("upper", serde_json::json!({"text": "redis"})).await;
        assert_eq!(local, Ok("REDIS".to_string()));
        let remote = registry.execute("webSearch", serde_json::json!({})).await;
        assert_eq!(remote, Ok("remote:webSearch".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error() {
        let err = registry().execute("nope", Value::Null).await.unwrap_err();
        assert_eq!(err, ToolError::Unknown("nope".to_string()));
        assert_eq!(err.to_string(), "Unknown tool: nope");
    }

    #[test]
    fn test_manifest_sorted_and_local_wins() {
        let tools = registry().list_available();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["upper", "webSearch"]);
        assert!(tools[0].description.starts_with("Uppercase"));
    }

    #[test]
    fn test_observation_formats_errors() {
        let ok = ToolInvocationResult {
            id: "call_0".to_string(),
            name: "upper".to_string(),
            outcome: ToolOutcome::Output(String::new()),
        };
        assert!(!ok.is_error());
        assert_eq!(ok.observation(), "");
        let failed = ToolInvocationResult {
            outcome: ToolOutcome::Error("timeout".to_string()),
            ..ok
        };
        assert!(failed.is_error());
        assert_eq!(failed.observation(), "Error: timeout");
    }
}
