//! Multimodal reasoning over documents and fragments
//!
//! The [`MultimodalReasoner`] normalizes each content type to text (tables
//! become `header: value` records, PDFs are text-extracted, images are
//! described by the backend) and hands passages to a [`ReasoningBackend`].

mod backend;
mod multimodal;
mod normalize;
mod openai;
mod schema;

pub use backend::{BackendAnswer, ExtractiveBackend, Passage, ReasoningBackend};
pub use multimodal::{MultimodalReasoner, ReasonerConfig};
pub use normalize::{normalize_content, render_table, sniff_image_type, split_passages, Normalized};
pub use openai::{OpenAiBackend, OpenAiBackendConfig};
pub use schema::{ExtractionSchema, FieldType, SchemaField};

use crate::document::{Content, ContentType, DocumentFragment, UnsupportedContentType};
use crate::error::ErrorKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Field name to extracted value (or `null`)
pub type Extraction = serde_json::Map<String, serde_json::Value>;

#[derive(Error, Debug, Clone)]
pub enum ReasoningError {
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Reasoning backend did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Reasoning backend error: {0}")]
    Backend(String),

    #[error("Invalid content: {0}")]
    InvalidContent(String),
}

impl ReasoningError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReasoningError::UnsupportedContentType(_) => ErrorKind::UnsupportedContentType,
            ReasoningError::Timeout(_) => ErrorKind::ReasoningTimeout,
            ReasoningError::Backend(_) => ErrorKind::Backend,
            ReasoningError::InvalidContent(_) => ErrorKind::InvalidQuery,
        }
    }
}

impl From<UnsupportedContentType> for ReasoningError {
    fn from(e: UnsupportedContentType) -> Self {
        ReasoningError::UnsupportedContentType(e.0)
    }
}

/// Outcome of one reasoning call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Free-text answer or summary
    pub insight: String,

    /// Structured fields, when the call was an extraction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted: Option<Extraction>,

    /// Backend confidence in `[0, 1]`
    pub confidence: f32,

    pub metadata: AnalysisMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub elapsed_ms: u64,
    /// Processing steps in the order they ran, e.g. `normalize:table`
    pub components: Vec<String>,
    pub backend: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    /// Number of passages handed to the backend
    pub passages: usize,
}

/// Content analysis across text, tables, PDFs and images
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Answer `query` about one piece of content (summarize when `query` is empty)
    async fn analyze_document(
        &self,
        content: &Content,
        content_type: ContentType,
        query: &str,
    ) -> Result<AnalysisResult, ReasoningError>;

    /// Pull the schema's fields out of the content; unresolved fields are `null`
    async fn extract_information(
        &self,
        content: &Content,
        content_type: ContentType,
        schema: &ExtractionSchema,
    ) -> Result<Extraction, ReasoningError>;

    /// Answer `query` over retrieved fragments of mixed content types
    async fn analyze_fragments(
        &self,
        fragments: &[DocumentFragment],
        query: &str,
    ) -> Result<AnalysisResult, ReasoningError>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ReasoningError::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::ReasoningTimeout
        );
        assert_eq!(
            ReasoningError::from(UnsupportedContentType("audio".into())).kind(),
            ErrorKind::UnsupportedContentType
        );
        assert_eq!(
            ReasoningError::InvalidContent("x".into()).kind(),
            ErrorKind::InvalidQuery
        );
    }
}
