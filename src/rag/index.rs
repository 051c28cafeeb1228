//! 进程内文档索引：加载 docs 目录下的 .md / .txt，分块后按查询词覆盖率检索

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;

use crate::rag::chunker::{Chunk, Chunker, ChunkingConfig};
use crate::rag::retriever::{ContentRetriever, RetrievalError, RetrievedChunk};
use crate::rag::tokenizer::{coverage_score, tokenize_to_set};

const INDEXED_EXTENSIONS: &[&str] = &["md", "txt"];

pub struct DocumentIndex {
    chunker: Chunker,
    entries: Vec<(Chunk, HashSet<String>)>,
}

impl DocumentIndex {
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            chunker: Chunker::new(config),
            entries: Vec::new(),
        }
    }

    /// 加载目录下全部文档（不递归）；目录不存在时返回 Io 错误
    pub fn from_dir(dir: &Path, config: ChunkingConfig) -> Result<Self, RetrievalError> {
        let mut index = Self::new(config);
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .and_then(|e| e.to_str())
                        .map(|e| INDEXED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                        .unwrap_or(false)
            })
            .collect();
        paths.sort();
        for path in paths {
            let text = std::fs::read_to_string(&path)?;
            let doc_id = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let added = index.add_document(&doc_id, &text);
            tracing::info!(doc = %doc_id, chunks = added, "document indexed");
        }
        Ok(index)
    }

    /// 索引单个文档（同名文档先删除旧块），返回块数
    pub fn add_document(&mut self, doc_id: &str, text: &str) -> usize {
        self.entries.retain(|(chunk, _)| chunk.source_id != doc_id);
        let chunks = self.chunker.chunk(doc_id, text);
        let n = chunks.len();
        for chunk in chunks {
            let tokens = tokenize_to_set(&chunk.text);
            self.entries.push((chunk, tokens));
        }
        n
    }

    pub fn search(&self, query: &str, k: usize) -> Vec<RetrievedChunk> {
        let query_tokens = tokenize_to_set(query);
        let mut scored: Vec<(f32, &Chunk)> = self
            .entries
            .iter()
            .map(|(chunk, tokens)| (coverage_score(&query_tokens, tokens), chunk))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(k)
            .map(|(score, chunk)| RetrievedChunk {
                text: chunk.text.clone(),
                score,
                source: chunk.source_id.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ContentRetriever for DocumentIndex {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        Ok(self.search(query, k))
    }
}
