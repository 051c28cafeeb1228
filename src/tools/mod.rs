//! 工具注册表与调用路由：本地工具、远程 MCP 工具、执行器

pub mod executor;
pub mod interview;
pub mod mcp;
pub mod registry;
pub mod schema;

pub use executor::ToolExecutor;
pub use interview::InterviewQuestionTool;
pub use mcp::{McpError, McpHttpProvider};
pub use registry::{
    Tool, ToolDescriptor, ToolError, ToolInvocationRequest, ToolInvocationResult, ToolOutcome,
    ToolProvider, ToolRegistry,
};
pub use schema::{json_schema_of, render_tool_manifest, tool_call_schema_json};
