//! 检索增强（RAG）：文档分块、进程内索引、检索适配与提示增强

pub mod chunker;
pub mod index;
pub mod retriever;
pub mod tokenizer;

pub use chunker::{Chunk, Chunker, ChunkingConfig};
pub use index::DocumentIndex;
pub use retriever::{
    augment_user_message, ContentRetriever, NoopRetriever, RetrievalAdapter, RetrievalError,
    RetrievedChunk,
};
