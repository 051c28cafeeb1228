//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CODEHELPER__*` 覆盖（双下划线表示嵌套，如 `CODEHELPER__LLM__PROVIDER=openai`）。
//! 每个字段都有默认值，缺少配置文件时也能得到可用配置。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub rag: RagSection,
    pub guardrail: GuardrailSection,
    pub server: ServerSection,
}

/// [app] 段：会话记忆与系统提示词
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 每个会话保留的最大消息条数
    pub max_memory_messages: usize,
    /// 会话空闲多久后被回收（秒）
    pub session_idle_secs: u64,
    /// 回收扫描间隔（秒）
    pub eviction_interval_secs: u64,
    /// 系统提示词文件；未设置时查找 config/prompts/system.md
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_memory_messages: 10,
            session_idle_secs: 3600,
            eviction_interval_secs: 60,
            system_prompt_path: None,
        }
    }
}

/// [llm] 段：后端选择、模型、超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：dashscope / openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时依次读取 DASHSCOPE_API_KEY、OPENAI_API_KEY
    pub api_key: Option<String>,
    /// 同步路径单次交换内最多的工具轮数
    pub max_tool_rounds: usize,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "dashscope".to_string(),
            model: "qwen-max".to_string(),
            base_url: None,
            api_key: None,
            max_tool_rounds: 5,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

impl LlmSection {
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("DASHSCOPE_API_KEY").ok())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 同步请求与建立流的超时（秒）
    pub request: u64,
    /// 流式两个片段之间的最长等待（秒）
    pub stream: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: 60,
            stream: 120,
        }
    }
}

/// [tools] 段：外层超时、并发数、各工具配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub tool_timeout_secs: u64,
    pub max_concurrent_tools: usize,
    pub interview: InterviewSection,
    pub mcp: McpSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 10,
            max_concurrent_tools: 3,
            interview: InterviewSection::default(),
            mcp: McpSection::default(),
        }
    }
}

/// [tools.interview] 段：面试题搜索
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InterviewSection {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_results: usize,
}

impl Default for InterviewSection {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: crate::tools::interview::DEFAULT_INTERVIEW_BASE_URL.to_string(),
            timeout_secs: 5,
            max_results: 20,
        }
    }
}

/// [tools.mcp] 段：远程工具服务
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct McpSection {
    pub enabled: bool,
    pub name: String,
    pub url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for McpSection {
    fn default() -> Self {
        Self {
            enabled: false,
            name: "web_search".to_string(),
            url: "https://open.bigmodel.cn/api/mcp/web_search/mcp".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

/// [rag] 段：本地文档检索增强
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagSection {
    pub enabled: bool,
    pub docs_dir: PathBuf,
    pub top_k: usize,
    pub min_score: f32,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub timeout_secs: u64,
}

impl Default for RagSection {
    fn default() -> Self {
        Self {
            enabled: true,
            docs_dir: PathBuf::from("docs"),
            top_k: 5,
            min_score: 0.25,
            chunk_size: 1000,
            chunk_overlap: 200,
            timeout_secs: 5,
        }
    }
}

/// [guardrail] 段：敏感词
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardrailSection {
    pub banned_words: Vec<String>,
}

impl Default for GuardrailSection {
    fn default() -> Self {
        Self {
            banned_words: crate::guardrail::DEFAULT_BANNED_WORDS
                .iter()
                .map(|w| w.to_string())
                .collect(),
        }
    }
}

/// [server] 段：HTTP 监听地址与路由前缀
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub context_path: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            context_path: "/api".to_string(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 CODEHELPER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CODEHELPER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CODEHELPER")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
