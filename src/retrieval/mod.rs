//! Hybrid retrieval
//!
//! A dense (embedding) index and a sparse (BM25) index are searched
//! concurrently; their ranked candidate lists are fused, hydrated from the
//! in-memory corpus, filtered and deduplicated.

mod corpus;
mod deduplication;
mod dense;
mod fusion;
mod hybrid;
mod qdrant;
mod sparse;

pub use corpus::Corpus;
pub use deduplication::deduplicate_fragments;
pub use dense::MemoryVectorIndex;
pub use fusion::{
    fuse, normalize_scores, reciprocal_rank_fusion, weighted_fusion, FusionConfig, FusionError,
    FusionStrategy,
};
pub use hybrid::{HybridRetriever, RetrieverSettings};
pub use qdrant::{QdrantConfig, QdrantIndex};
pub use sparse::KeywordIndex;

use crate::document::{Document, DocumentFragment};
use crate::embedding::EmbeddingError;
use crate::error::ErrorKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RetrievalError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("{backend} unavailable: {message}")]
    Unavailable { backend: String, message: String },

    #[error("Index error: {0}")]
    Index(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),
}

impl RetrievalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RetrievalError::InvalidQuery(_) => ErrorKind::InvalidQuery,
            RetrievalError::Unavailable { .. } => ErrorKind::RetrievalUnavailable,
            RetrievalError::Index(_) => ErrorKind::Backend,
            RetrievalError::DocumentNotFound(_) => ErrorKind::DocumentNotFound,
        }
    }

    pub fn unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        RetrievalError::Unavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

impl From<EmbeddingError> for RetrievalError {
    fn from(e: EmbeddingError) -> Self {
        match e {
            EmbeddingError::Unavailable(message) => {
                RetrievalError::unavailable("embedding", message)
            }
            other => RetrievalError::Index(other.to_string()),
        }
    }
}

/// Retrieval request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Query text
    pub text: String,

    /// Maximum number of fragments to return
    pub k: usize,

    /// Restrict results to one document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_filter: Option<String>,
}

impl Query {
    pub fn new(text: impl Into<String>, k: usize) -> Self {
        Self {
            text: text.into(),
            k,
            document_filter: None,
        }
    }

    pub fn with_document_filter(mut self, document_id: impl Into<String>) -> Self {
        self.document_filter = Some(document_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.text.trim().is_empty() {
            return Err(RetrievalError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }
        if self.k == 0 {
            return Err(RetrievalError::InvalidQuery(
                "k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A ranked hit from one index, before hydration
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub fragment_id: String,
    pub score: f32,
}

impl Candidate {
    pub fn new(fragment_id: impl Into<String>, score: f32) -> Self {
        Self {
            fragment_id: fragment_id.into(),
            score,
        }
    }
}

/// Ranked fragment retrieval over the corpus
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `query.k` fragments, sorted by descending relevance
    async fn retrieve(&self, query: &Query) -> Result<Vec<DocumentFragment>, RetrievalError>;

    /// A whole document by id
    async fn fetch_document(&self, document_id: &str) -> Result<Document, RetrievalError>;

    fn name(&self) -> &str;
}

/// Similarity search over fragment embeddings, best first
#[async_trait]
pub trait DenseIndex: Send + Sync {
    async fn search(&self, text: &str, limit: usize) -> Result<Vec<Candidate>, RetrievalError>;

    fn name(&self) -> &str;
}

/// Lexical search over fragment text, best first
#[async_trait]
pub trait SparseIndex: Send + Sync {
    async fn search(&self, text: &str, limit: usize) -> Result<Vec<Candidate>, RetrievalError>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_validation() {
        assert!(Query::new("revenue", 3).validate().is_ok());
        assert!(matches!(
            Query::new("   ", 3).validate(),
            Err(RetrievalError::InvalidQuery(_))
        ));
        assert!(matches!(
            Query::new("revenue", 0).validate(),
            Err(RetrievalError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            RetrievalError::unavailable("qdrant", "refused").kind(),
            ErrorKind::RetrievalUnavailable
        );
        assert_eq!(
            RetrievalError::DocumentNotFound("x".into()).kind(),
            ErrorKind::DocumentNotFound
        );
        let from_embedding: RetrievalError = EmbeddingError::Unavailable("503".into()).into();
        assert_eq!(from_embedding.kind(), ErrorKind::RetrievalUnavailable);
    }
}
