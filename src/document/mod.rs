//! Documents, fragments and content types
//!
//! A [`Document`] is what the loader reads from disk; the [`Chunker`] splits it
//! into [`DocumentFragment`]s, the retrievable units the indexes rank.

mod chunker;
mod loader;
pub mod pdf;
pub mod table;

pub use chunker::{Chunker, ChunkerConfig};
pub use loader::{document_id_for, load_directory, load_document};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Kind of content a document or fragment carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Image,
    Table,
    Pdf,
}

/// Raised when a content type name is not one of `text | image | table | pdf`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported content type: {0}")]
pub struct UnsupportedContentType(pub String);

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Image => "image",
            ContentType::Table => "table",
            ContentType::Pdf => "pdf",
        }
    }

    /// Infer the content type from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "md" | "markdown" | "text" | "log" => Some(ContentType::Text),
            "csv" | "tsv" => Some(ContentType::Table),
            "pdf" => Some(ContentType::Pdf),
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "tif" | "tiff" => {
                Some(ContentType::Image)
            }
            _ => None,
        }
    }
}

impl FromStr for ContentType {
    type Err = UnsupportedContentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(ContentType::Text),
            "image" => Ok(ContentType::Image),
            "table" => Ok(ContentType::Table),
            "pdf" => Ok(ContentType::Pdf),
            other => Err(UnsupportedContentType(other.to_string())),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw content: decoded text or undecoded bytes (images, PDFs)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "lowercase")]
pub enum Content {
    Text(String),
    Binary(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl Content {
    /// Text view of the content, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            Content::Binary(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Content::Text(text) => text.len(),
            Content::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Content::Binary(bytes)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// A document held in the in-memory corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier (derived from the file name by the loader)
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// Full document content
    pub content: Content,

    /// Content type of the whole document
    pub content_type: ContentType,

    /// Where the document was loaded from, if anywhere
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,

    /// When the document entered the corpus
    pub ingested_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<Content>,
        content_type: ContentType,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            content_type,
            source_path: None,
            ingested_at: Utc::now(),
        }
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }
}

/// A retrievable unit of document content with a relevance score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFragment {
    /// Fragment identifier, `"{document_id}#{position}"`
    pub id: String,

    /// Identifier of the source document
    pub document_id: String,

    /// Title of the source document
    pub title: String,

    /// Position of this fragment within its document
    pub position: usize,

    /// Fragment content
    pub content: Content,

    /// Content type of this fragment
    pub content_type: ContentType,

    /// Relevance score (higher is better); zero until ranked
    pub score: f32,
}

impl DocumentFragment {
    pub fn new(
        document: &Document,
        position: usize,
        content: Content,
        content_type: ContentType,
    ) -> Self {
        Self {
            id: format!("{}#{}", document.id, position),
            document_id: document.id.clone(),
            title: document.title.clone(),
            position,
            content,
            content_type,
            score: 0.0,
        }
    }

    /// Text the dense and sparse indexes see for this fragment
    ///
    /// Binary fragments (images, unparseable PDFs) are indexed by title.
    pub fn index_text(&self) -> &str {
        match &self.content {
            Content::Text(text) => text,
            Content::Binary(_) => &self.title,
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    /// Get a short preview of the text (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        match &self.content {
            Content::Text(text) => {
                if text.chars().count() <= max_chars {
                    text.clone()
                } else {
                    let cut: String = text.chars().take(max_chars).collect();
                    format!("{}...", cut)
                }
            }
            Content::Binary(bytes) => format!("<{} {} bytes>", self.content_type, bytes.len()),
        }
    }
}

/// Compact view of a fragment for reports and API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentSummary {
    pub id: String,
    pub document_id: String,
    pub title: String,
    pub content_type: ContentType,
    pub score: f32,
    pub preview: String,
}

impl From<&DocumentFragment> for FragmentSummary {
    fn from(fragment: &DocumentFragment) -> Self {
        Self {
            id: fragment.id.clone(),
            document_id: fragment.document_id.clone(),
            title: fragment.title.clone(),
            content_type: fragment.content_type,
            score: fragment.score,
            preview: fragment.preview(200),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_parsing() {
        assert_eq!("text".parse::<ContentType>().unwrap(), ContentType::Text);
        assert_eq!(" PDF ".parse::<ContentType>().unwrap(), ContentType::Pdf);
        assert_eq!(
            "audio".parse::<ContentType>(),
            Err(UnsupportedContentType("audio".to_string()))
        );
    }

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(ContentType::from_extension("MD"), Some(ContentType::Text));
        assert_eq!(ContentType::from_extension("csv"), Some(ContentType::Table));
        assert_eq!(ContentType::from_extension("jpeg"), Some(ContentType::Image));
        assert_eq!(ContentType::from_extension("docx"), None);
    }

    #[test]
    fn test_binary_content_serializes_as_base64() {
        let content = Content::Binary(vec![0xde, 0xad, 0xbe, 0xef]);
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["encoding"], "binary");
        assert_eq!(json["data"], "3q2+7w==");

        let back: Content = serde_json::from_value(json).unwrap();
        assert_eq!(back, content);
    }

    #[test]
    fn test_fragment_preview_is_char_safe() {
        let doc = Document::new("d", "Doc", "ééééé", ContentType::Text);
        let fragment = DocumentFragment::new(&doc, 0, doc.content.clone(), ContentType::Text);
        assert_eq!(fragment.preview(2), "éé...");
        assert_eq!(fragment.id, "d#0");
    }

    #[test]
    fn test_binary_fragment_indexed_by_title() {
        let doc = Document::new("scan", "Quarterly scan.png", vec![1u8, 2, 3], ContentType::Image);
        let fragment = DocumentFragment::new(&doc, 0, doc.content.clone(), ContentType::Image);
        assert_eq!(fragment.index_text(), "Quarterly scan.png");
    }
}
