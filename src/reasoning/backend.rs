//! Reasoning backends and the offline extractive implementation

use super::{Extraction, ExtractionSchema, ReasoningError};
use crate::text::{content_terms, tokenize};
use async_trait::async_trait;
use image::ImageReader;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::io::Cursor;

/// A unit of normalized text handed to a backend
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    /// Fragment id, or a label such as `document` or `image`
    pub source: String,
    pub text: String,
}

impl Passage {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendAnswer {
    pub text: String,
    pub confidence: f32,
}

/// The model behind the reasoner
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Answer `query` from `passages`; summarize when `query` is empty
    async fn answer(&self, query: &str, passages: &[Passage])
        -> Result<BackendAnswer, ReasoningError>;

    /// Raw field values found in `text`; the caller conforms them to the schema
    async fn extract(
        &self,
        text: &str,
        schema: &ExtractionSchema,
    ) -> Result<Extraction, ReasoningError>;

    /// Text description of an image, steered by `query` when given
    async fn describe_image(
        &self,
        bytes: &[u8],
        media_type: &str,
        query: &str,
    ) -> Result<String, ReasoningError>;

    fn name(&self) -> &str;
}

/// Offline backend: sentence ranking and `field: value` extraction
pub struct ExtractiveBackend {
    max_sentences: usize,
}

impl ExtractiveBackend {
    pub fn new(max_sentences: usize) -> Self {
        Self {
            max_sentences: max_sentences.max(1),
        }
    }
}

impl Default for ExtractiveBackend {
    fn default() -> Self {
        Self::new(3)
    }
}

#[async_trait]
impl ReasoningBackend for ExtractiveBackend {
    async fn answer(
        &self,
        query: &str,
        passages: &[Passage],
    ) -> Result<BackendAnswer, ReasoningError> {
        let sentences: Vec<&str> = passages
            .iter()
            .flat_map(|p| split_sentences(&p.text))
            .collect();

        if sentences.is_empty() {
            return Ok(BackendAnswer {
                text: "No content to analyze.".to_string(),
                confidence: 0.0,
            });
        }

        let terms = content_terms(query);
        if terms.is_empty() {
            let summary: Vec<&str> = sentences.iter().take(self.max_sentences).copied().collect();
            return Ok(BackendAnswer {
                text: summary.join(" "),
                confidence: 0.5,
            });
        }

        // (position, matched terms)
        let mut scored: Vec<(usize, HashSet<&str>)> = sentences
            .iter()
            .enumerate()
            .filter_map(|(i, sentence)| {
                let tokens: HashSet<String> = tokenize(sentence).into_iter().collect();
                let matched: HashSet<&str> = terms
                    .iter()
                    .filter(|t| tokens.contains(t.as_str()))
                    .map(String::as_str)
                    .collect();
                (!matched.is_empty()).then_some((i, matched))
            })
            .collect();

        if scored.is_empty() {
            return Ok(BackendAnswer {
                text: format!("No relevant information found for: {}", query.trim()),
                confidence: 0.0,
            });
        }

        scored.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
        scored.truncate(self.max_sentences);
        scored.sort_by_key(|(i, _)| *i);

        let covered: HashSet<&str> = scored.iter().flat_map(|(_, m)| m.iter().copied()).collect();
        let text = scored
            .iter()
            .map(|(i, _)| sentences[*i])
            .collect::<Vec<_>>()
            .join(" ");

        Ok(BackendAnswer {
            text,
            confidence: covered.len() as f32 / terms.len() as f32,
        })
    }

    async fn extract(
        &self,
        text: &str,
        schema: &ExtractionSchema,
    ) -> Result<Extraction, ReasoningError> {
        let mut found = Extraction::new();

        for field in schema.fields() {
            let pattern = field_pattern(&field.name)?;
            if let Some(value) = pattern
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim())
                .filter(|v| !v.is_empty())
            {
                found.insert(field.name.clone(), Value::String(value.to_string()));
            }
        }

        tracing::debug!(
            requested = schema.len(),
            found = found.len(),
            "Extracted fields"
        );
        Ok(found)
    }

    async fn describe_image(
        &self,
        bytes: &[u8],
        media_type: &str,
        _query: &str,
    ) -> Result<String, ReasoningError> {
        let format = media_type
            .strip_prefix("image/")
            .unwrap_or("unknown")
            .to_uppercase();

        Ok(match image_dimensions(bytes) {
            Some((width, height)) => format!(
                "{} image, {}x{} pixels, {} bytes.",
                format,
                width,
                height,
                bytes.len()
            ),
            None => format!("{} image, {} bytes.", format, bytes.len()),
        })
    }

    fn name(&self) -> &str {
        "extractive"
    }
}

/// `field: value` or `field = value` at the start of a line; `_`, space and
/// `-` in the field name are interchangeable
fn field_pattern(name: &str) -> Result<Regex, ReasoningError> {
    let mut escaped = String::new();
    for c in name.trim().chars() {
        match c {
            '_' | ' ' | '-' => escaped.push_str(r"[_\s-]"),
            c => escaped.push_str(&regex::escape(&c.to_string())),
        }
    }

    Regex::new(&format!(r"(?im)^\s*(?:[-*]\s*)?{}\s*[:=]\s*(.+?)\s*$", escaped))
        .map_err(|e| ReasoningError::Backend(format!("Invalid field pattern: {}", e)))
}

/// Sentences end at `.`, `!` or `?` followed by whitespace, or at a newline
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let end = match c {
            '\n' => Some(i),
            '.' | '!' | '?' => match chars.peek() {
                Some((_, next)) if next.is_whitespace() => Some(i + c.len_utf8()),
                None => Some(i + c.len_utf8()),
                _ => None,
            },
            _ => None,
        };

        if let Some(end) = end {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Pixel size read from the image header, without decoding pixels
fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    match reader.into_dimensions() {
        Ok(dimensions) => Some(dimensions),
        Err(e) => {
            tracing::debug!("Could not read image dimensions: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passages(text: &str) -> Vec<Passage> {
        vec![Passage::new("doc", text)]
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("First one. Second one!\nThird v1.2 stays"),
            vec!["First one.", "Second one!", "Third v1.2 stays"]
        );
    }

    #[tokio::test]
    async fn test_answer_ranks_by_query_terms() {
        let backend = ExtractiveBackend::new(1);
        let answer = backend
            .answer(
                "total revenue",
                &passages("The office moved. Total revenue grew to 5M. Revenue was flat before."),
            )
            .await
            .unwrap();

        assert_eq!(answer.text, "Total revenue grew to 5M.");
        assert!((answer.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_answer_keeps_document_order() {
        let backend = ExtractiveBackend::new(2);
        let answer = backend
            .answer(
                "budget approved",
                &passages("The budget was discussed. Nothing else. Budget approved in March."),
            )
            .await
            .unwrap();
        assert_eq!(answer.text, "The budget was discussed. Budget approved in March.");
    }

    #[tokio::test]
    async fn test_empty_query_summarizes() {
        let backend = ExtractiveBackend::new(2);
        let answer = backend
            .answer("", &passages("One. Two. Three."))
            .await
            .unwrap();
        assert_eq!(answer.text, "One. Two.");
    }

    #[tokio::test]
    async fn test_no_match_has_zero_confidence() {
        let backend = ExtractiveBackend::default();
        let answer = backend
            .answer("quarterly margin", &passages("Lunch is at noon."))
            .await
            .unwrap();
        assert_eq!(answer.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_extract_field_lines() {
        let backend = ExtractiveBackend::default();
        let schema = ExtractionSchema::from_names(["invoice_number", "total", "due"]);
        let text = "Invoice Number: INV-42\n- TOTAL = 99.50 EUR\nNotes: none";

        let found = backend.extract(text, &schema).await.unwrap();
        assert_eq!(found["invoice_number"], Value::String("INV-42".into()));
        assert_eq!(found["total"], Value::String("99.50 EUR".into()));
        assert!(!found.contains_key("due"));
    }

    fn encode(width: u32, height: u32, format: image::ImageFormat) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn test_describe_png() {
        let png = encode(640, 480, image::ImageFormat::Png);

        let backend = ExtractiveBackend::default();
        let description = backend.describe_image(&png, "image/png", "").await.unwrap();
        assert_eq!(description, format!("PNG image, 640x480 pixels, {} bytes.", png.len()));
    }

    #[test]
    fn test_image_dimensions() {
        assert_eq!(
            image_dimensions(&encode(16, 32, image::ImageFormat::Bmp)),
            Some((16, 32))
        );
        assert_eq!(
            image_dimensions(&encode(8, 4, image::ImageFormat::Jpeg)),
            Some((8, 4))
        );
        assert_eq!(image_dimensions(b"nope"), None);
        assert_eq!(image_dimensions(b"\x89PNG\r\n\x1a\ntruncated"), None);
    }
}
