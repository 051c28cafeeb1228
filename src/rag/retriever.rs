//! 检索适配层：把外部索引包装成统一的「query -> 按相关度降序的块」契约
//!
//! 上游失败（I/O、超时）以 RetrievalError 返回，由编排器降级为「无增强」继续回答。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::time::timeout;

/// 单个检索结果（仅用于本次交换的提示增强）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub score: f32,
    /// 来源引用（文档名）
    pub source: String,
}

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Retrieval timed out after {0:?}")]
    Timeout(Duration),

    #[error("Index unavailable: {0}")]
    Unavailable(String),

    #[error("Index I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// 检索索引 trait
#[async_trait]
pub trait ContentRetriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, RetrievalError>;
}

/// 空实现：未启用检索增强时使用
#[derive(Debug, Clone, Default)]
pub struct NoopRetriever;

#[async_trait]
impl ContentRetriever for NoopRetriever {
    async fn retrieve(&self, _query: &str, _k: usize) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        Ok(Vec::new())
    }
}

/// 检索适配器：超时、最低分过滤、排序与截断
pub struct RetrievalAdapter {
    inner: Arc<dyn ContentRetriever>,
    top_k: usize,
    min_score: f32,
    timeout: Duration,
}

impl RetrievalAdapter {
    pub fn new(inner: Arc<dyn ContentRetriever>, top_k: usize, min_score: f32, timeout_secs: u64) -> Self {
        Self {
            inner,
            top_k,
            min_score,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopRetriever), 0, 0.0, 1)
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        if self.top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut chunks = timeout(self.timeout, self.inner.retrieve(query, self.top_k))
            .await
            .map_err(|_| RetrievalError::Timeout(self.timeout))??;
        chunks.retain(|c| c.score >= self.min_score);
        chunks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        chunks.truncate(self.top_k);
        tracing::debug!(hits = chunks.len(), "retrieval finished");
        Ok(chunks)
    }
}

/// 将检索结果拼入用户输入；无结果时原样返回
pub fn augment_user_message(message: &str, chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return message.to_string();
    }
    let mut out = String::from(message);
    out.push_str("\n\nAnswer using the following information:\n");
    for chunk in chunks {
        out.push_str(&chunk.text);
        out.push_str("\n\n");
    }
    out.truncate(out.trim_end().len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRetriever(Vec<RetrievedChunk>);

    #[async_trait]
    impl ContentRetriever for FixedRetriever {
        async fn retrieve(&self, _query: &str, _k: usize) -> Result<Vec<RetrievedChunk>, RetrievalError> {
            Ok(self.0.clone())
        }
    }

    struct SlowRetriever;

    #[async_trait]
    impl ContentRetriever for SlowRetriever {
        async fn retrieve(&self, _query: &str, _k: usize) -> Result<Vec<RetrievedChunk>, RetrievalError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    fn chunk(text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            text: text.to_string(),
            score,
            source: "doc.md".to_string(),
        }
    }

    #[tokio::test]
    async fn test_adapter_filters_sorts_and_truncates() {
        let inner = FixedRetriever(vec![chunk("low", 0.1), chunk("mid", 0.5), chunk("high", 0.9), chunk("also", 0.6)]);
        let adapter = RetrievalAdapter::new(Arc::new(inner), 2, 0.3, 5);
        let chunks = adapter.retrieve("anything").await.unwrap();
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["high", "also"]);
    }

    #[tokio::test]
    async fn test_adapter_times_out() {
        let adapter = RetrievalAdapter::new(Arc::new(SlowRetriever), 3, 0.0, 1);
        let err = adapter.retrieve("q").await.unwrap_err();
        assert!(matches!(err, RetrievalError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_disabled_adapter_returns_nothing() {
        assert!(RetrievalAdapter::disabled().retrieve("q").await.unwrap().is_empty());
    }

    #[test]
    fn test_augment_user_message() {
        assert_eq!(augment_user_message("hi", &[]), "hi");
        let augmented = augment_user_message("怎么学习Java？", &[chunk("先学基础语法", 0.8), chunk("再学集合框架", 0.7)]);
        assert!(augmented.starts_with("怎么学习Java？\n\nAnswer using the following information:\n"));
        assert!(augmented.contains("先学基础语法\n\n再学集合框架"));
        assert!(!augmented.ends_with('\n'));
    }
}
