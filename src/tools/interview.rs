//! 面试题搜索工具（interviewQuestionSearch）
//!
//! GET `{base_url}/search/all?searchText=<keyword>`，从结果表格单元格（`.ant-table-cell > a`）
//! 中提取题目标题，逐行返回。网络失败时返回错误文本，由执行器回填为观察。

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use regex::Regex;
use reqwest::Client;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::schema::json_schema_of;
use crate::tools::Tool;

pub const INTERVIEW_TOOL_NAME: &str = "interviewQuestionSearch";
pub const DEFAULT_INTERVIEW_BASE_URL: &str = "https://www.mianshiya.com";

const DESCRIPTION: &str = "Retrieves relevant interview questions from mianshiya.com based on a keyword. \
Use this tool when the user asks for interview questions about specific technologies, \
programming concepts, or job-related topics. The input should be a clear search term.";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct InterviewSearchArgs {
    /// the keyword to search
    pub keyword: String,
}

pub struct InterviewQuestionTool {
    client: Client,
    base_url: String,
    max_results: usize,
}

fn cell_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?s)<(?:td|th)\b[^>]*class="[^"]*\bant-table-cell\b[^"]*"[^>]*>\s*<a\b[^>]*>(.*?)</a>"#,
        )
        .expect("static regex")
    })
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"))
}

/// 链接内文本：html2text 失败时退回去标签
fn inner_text(fragment: &str) -> String {
    let text = match from_read(fragment.as_bytes(), 1000) {
        Ok(t) if !t.trim().is_empty() => t,
        _ => tag_regex().replace_all(fragment, "").into_owned(),
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 从搜索结果页提取题目标题（文档顺序）
pub fn extract_questions(html: &str, max_results: usize) -> Vec<String> {
    cell_link_regex()
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| inner_text(m.as_str()))
        .filter(|t| !t.is_empty())
        .take(max_results)
        .collect()
}

impl InterviewQuestionTool {
    pub fn new(base_url: &str, timeout_secs: u64, max_results: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .user_agent("Mozilla/5.0")
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_results: max_results.max(1),
        }
    }

    fn keyword(args: &Value) -> Result<String, String> {
        let keyword = match args {
            Value::String(s) => s.clone(),
            other => serde_json::from_value::<InterviewSearchArgs>(other.clone())
                .map(|a| a.keyword)
                .map_err(|e| format!("Invalid arguments: {}", e))?,
        };
        let keyword = keyword.trim().to_string();
        if keyword.is_empty() {
            return Err("Missing keyword".to_string());
        }
        Ok(keyword)
    }

    async fn search(&self, keyword: &str) -> Result<String, String> {
        let url = format!("{}/search/all", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("searchText", keyword)])
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| format!("Read body: {}", e))?;
        Ok(extract_questions(&body, self.max_results).join("\n"))
    }
}

#[async_trait]
impl Tool for InterviewQuestionTool {
    fn name(&self) -> &str {
        INTERVIEW_TOOL_NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameters_schema(&self) -> Value {
        json_schema_of::<InterviewSearchArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let keyword = Self::keyword(&args)?;
        self.search(&keyword).await.map_err(|e| {
            tracing::error!(keyword = %keyword, error = %e, "interview question search failed");
            e
        })
    }
}
