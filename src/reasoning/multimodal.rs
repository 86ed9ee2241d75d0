//! Reasoner that routes every content type through one backend

use super::{
    normalize_content, split_passages, AnalysisMetadata, AnalysisResult, Extraction,
    ExtractionSchema, Normalized, Passage, Reasoner, ReasoningBackend, ReasoningError,
};
use crate::document::{Content, ContentType, DocumentFragment};
use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, Span};

#[derive(Debug, Clone)]
pub struct ReasonerConfig {
    /// Upper bound for each backend call
    pub timeout: Duration,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct MultimodalReasoner {
    backend: Arc<dyn ReasoningBackend>,
    config: ReasonerConfig,
    span: Span,
}

impl MultimodalReasoner {
    pub fn new(backend: Arc<dyn ReasoningBackend>, config: ReasonerConfig) -> Self {
        let span = tracing::info_span!("reasoner", backend = backend.name());
        Self {
            backend,
            config,
            span,
        }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, ReasoningError>
    where
        F: Future<Output = Result<T, ReasoningError>>,
    {
        match tokio::time::timeout(self.config.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    parent: &self.span,
                    timeout = ?self.config.timeout,
                    "Backend call timed out"
                );
                Err(ReasoningError::Timeout(self.config.timeout))
            }
        }
    }

    /// Text for one piece of content; images are described by the backend
    async fn to_text(
        &self,
        content: &Content,
        content_type: ContentType,
        query: &str,
        components: &mut Vec<String>,
    ) -> Result<String, ReasoningError> {
        components.push(format!("normalize:{}", content_type));
        match normalize_content(content, content_type)? {
            Normalized::Text(text) => Ok(text),
            Normalized::Image { bytes, media_type } => {
                components.push("describe_image".to_string());
                self.bounded(self.backend.describe_image(&bytes, media_type, query))
                    .await
            }
        }
    }

    fn metadata(
        &self,
        started: Instant,
        mut components: Vec<String>,
        content_type: Option<ContentType>,
        passages: usize,
    ) -> AnalysisMetadata {
        components.push(format!("backend:{}", self.backend.name()));
        AnalysisMetadata {
            elapsed_ms: started.elapsed().as_millis() as u64,
            components,
            backend: self.backend.name().to_string(),
            content_type,
            passages,
        }
    }

    async fn analyze(
        &self,
        content: &Content,
        content_type: ContentType,
        query: &str,
    ) -> Result<AnalysisResult, ReasoningError> {
        let started = Instant::now();
        let mut components = Vec::new();

        let text = self.to_text(content, content_type, query, &mut components).await?;
        let passages: Vec<Passage> = split_passages(&text)
            .into_iter()
            .map(|p| Passage::new("document", p))
            .collect();

        let answer = self.bounded(self.backend.answer(query, &passages)).await?;
        tracing::debug!(
            passages = passages.len(),
            confidence = answer.confidence,
            "Analyzed document"
        );

        Ok(AnalysisResult {
            insight: answer.text,
            extracted: None,
            confidence: answer.confidence,
            metadata: self.metadata(started, components, Some(content_type), passages.len()),
        })
    }

    async fn extract(
        &self,
        content: &Content,
        content_type: ContentType,
        schema: &ExtractionSchema,
    ) -> Result<Extraction, ReasoningError> {
        let mut components = Vec::new();
        let query = schema.names().join(" ");
        let text = self.to_text(content, content_type, &query, &mut components).await?;

        let raw = self.bounded(self.backend.extract(&text, schema)).await?;
        let extracted = schema.conform(&raw);

        tracing::debug!(
            fields = schema.len(),
            resolved = extracted.values().filter(|v| !v.is_null()).count(),
            "Extraction conformed to schema"
        );
        Ok(extracted)
    }

    async fn analyze_many(
        &self,
        fragments: &[DocumentFragment],
        query: &str,
    ) -> Result<AnalysisResult, ReasoningError> {
        let started = Instant::now();
        let mut components = Vec::new();

        if fragments.is_empty() {
            return Ok(AnalysisResult {
                insight: "No relevant fragments were retrieved.".to_string(),
                extracted: None,
                confidence: 0.0,
                metadata: self.metadata(started, components, None, 0),
            });
        }

        let mut passages = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            let text = self
                .to_text(&fragment.content, fragment.content_type, query, &mut components)
                .await?;
            passages.push(Passage::new(fragment.id.clone(), text));
        }
        let mut seen = HashSet::new();
        components.retain(|c| seen.insert(c.clone()));

        // Reported only when every fragment shares one content type
        let content_type = fragments
            .iter()
            .map(|f| f.content_type)
            .try_fold(None, |acc: Option<ContentType>, ct| match acc {
                None => Some(Some(ct)),
                Some(prev) if prev == ct => Some(Some(ct)),
                Some(_) => None,
            })
            .flatten();

        let answer = self.bounded(self.backend.answer(query, &passages)).await?;

        Ok(AnalysisResult {
            insight: answer.text,
            extracted: None,
            confidence: answer.confidence,
            metadata: self.metadata(started, components, content_type, passages.len()),
        })
    }
}

#[async_trait]
impl Reasoner for MultimodalReasoner {
    async fn analyze_document(
        &self,
        content: &Content,
        content_type: ContentType,
        query: &str,
    ) -> Result<AnalysisResult, ReasoningError> {
        self.analyze(content, content_type, query)
            .instrument(self.span.clone())
            .await
    }

    async fn extract_information(
        &self,
        content: &Content,
        content_type: ContentType,
        schema: &ExtractionSchema,
    ) -> Result<Extraction, ReasoningError> {
        self.extract(content, content_type, schema)
            .instrument(self.span.clone())
            .await
    }

    async fn analyze_fragments(
        &self,
        fragments: &[DocumentFragment],
        query: &str,
    ) -> Result<AnalysisResult, ReasoningError> {
        self.analyze_many(fragments, query)
            .instrument(self.span.clone())
            .await
    }

    fn name(&self) -> &str {
        "multimodal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::reasoning::{BackendAnswer, ExtractiveBackend};
    use serde_json::{json, Value};

    fn reasoner() -> MultimodalReasoner {
        MultimodalReasoner::new(Arc::new(ExtractiveBackend::default()), ReasonerConfig::default())
    }

    struct SlowBackend;

    #[async_trait]
    impl ReasoningBackend for SlowBackend {
        async fn answer(&self, _: &str, _: &[Passage]) -> Result<BackendAnswer, ReasoningError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(BackendAnswer {
                text: "late".into(),
                confidence: 1.0,
            })
        }

        async fn extract(
            &self,
            _: &str,
            _: &ExtractionSchema,
        ) -> Result<Extraction, ReasoningError> {
            Ok(Extraction::new())
        }

        async fn describe_image(
            &self,
            _: &[u8],
            _: &str,
            _: &str,
        ) -> Result<String, ReasoningError> {
            Ok(String::new())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_table_analysis() {
        let table = Content::Text("region,revenue\neu,120\nus,340\n".into());
        let result = reasoner()
            .analyze_document(&table, ContentType::Table, "revenue us")
            .await
            .unwrap();

        assert!(result.insight.contains("340"));
        assert_eq!(result.metadata.content_type, Some(ContentType::Table));
        assert_eq!(result.metadata.components[0], "normalize:table");
        assert_eq!(result.metadata.backend, "extractive");
    }

    #[tokio::test]
    async fn test_extraction_nulls_missing_fields() {
        let content = Content::Text("x: 42\nsomething else".into());
        let schema = ExtractionSchema::from_names(["x", "y"]);
        let extracted = reasoner()
            .extract_information(&content, ContentType::Text, &schema)
            .await
            .unwrap();

        assert_eq!(extracted["x"], json!("42"));
        assert_eq!(extracted["y"], Value::Null);
        assert_eq!(extracted.len(), 2);
    }

    #[tokio::test]
    async fn test_table_extraction() {
        let content = Content::Text("vendor,total\nAcme,99\n".into());
        let schema =
            ExtractionSchema::from_value(&json!({"vendor": "string", "total": "integer"}))
                .unwrap();
        let extracted = reasoner()
            .extract_information(&content, ContentType::Table, &schema)
            .await
            .unwrap();

        assert_eq!(extracted["vendor"], json!("Acme"));
        assert_eq!(extracted["total"], json!(99));
    }

    #[tokio::test]
    async fn test_image_analysis_uses_description() {
        let gif = Content::Binary(b"GIF89a\x02\x00\x03\x00".to_vec());
        let result = reasoner()
            .analyze_document(&gif, ContentType::Image, "image size")
            .await
            .unwrap();

        assert!(result.insight.contains("2x3 pixels"));
        assert!(result.metadata.components.contains(&"describe_image".to_string()));
    }

    #[tokio::test]
    async fn test_backend_timeout() {
        let reasoner = MultimodalReasoner::new(
            Arc::new(SlowBackend),
            ReasonerConfig { timeout: Duration::from_millis(20) },
        );
        let result = reasoner
            .analyze_document(&Content::Text("text".into()), ContentType::Text, "q")
            .await;

        assert!(matches!(result, Err(ReasoningError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_analyze_fragments() {
        let doc = Document::new("d", "d.txt", "", ContentType::Text);
        let fragments = vec![
            DocumentFragment::new(
                &doc,
                0,
                Content::Text("Shipping takes five days.".into()),
                ContentType::Text,
            ),
            DocumentFragment::new(
                &doc,
                1,
                Content::Text("Returns are free.".into()),
                ContentType::Text,
            ),
        ];

        let result = reasoner().analyze_fragments(&fragments, "returns").await.unwrap();
        assert_eq!(result.insight, "Returns are free.");
        assert_eq!(result.metadata.passages, 2);
        assert_eq!(result.metadata.content_type, Some(ContentType::Text));

        let empty = reasoner().analyze_fragments(&[], "returns").await.unwrap();
        assert_eq!(empty.confidence, 0.0);
    }
}
