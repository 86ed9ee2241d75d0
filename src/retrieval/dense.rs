//! Brute-force in-memory vector index

use super::{Candidate, DenseIndex, RetrievalError};
use crate::document::DocumentFragment;
use crate::embedding::{cosine_similarity, EmbeddingProvider};
use async_trait::async_trait;
use std::sync::Arc;

/// Exact cosine search over every fragment embedding
///
/// Only candidates with positive similarity are returned. Equal scores keep
/// corpus order.
pub struct MemoryVectorIndex {
    provider: Arc<dyn EmbeddingProvider>,
    entries: Vec<(String, Vec<f32>)>,
}

impl MemoryVectorIndex {
    /// Embed `fragments` and build the index
    pub async fn build<'a, I>(
        provider: Arc<dyn EmbeddingProvider>,
        fragments: I,
    ) -> Result<Self, RetrievalError>
    where
        I: IntoIterator<Item = &'a DocumentFragment>,
    {
        let (ids, texts): (Vec<String>, Vec<String>) = fragments
            .into_iter()
            .map(|f| (f.id.clone(), f.index_text().to_string()))
            .unzip();

        let vectors = provider.embed_batch(&texts).await?;
        if vectors.len() != ids.len() {
            return Err(RetrievalError::Index(format!(
                "Expected {} embeddings, got {}",
                ids.len(),
                vectors.len()
            )));
        }

        tracing::debug!(
            model = provider.model_name(),
            vectors = vectors.len(),
            "Vector index built"
        );

        Ok(Self {
            provider,
            entries: ids.into_iter().zip(vectors).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DenseIndex for MemoryVectorIndex {
    async fn search(&self, text: &str, limit: usize) -> Result<Vec<Candidate>, RetrievalError> {
        if limit == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let query = self.provider.embed(text).await?;

        let mut scored: Vec<Candidate> = self
            .entries
            .iter()
            .map(|(id, vector)| Candidate::new(id.as_str(), cosine_similarity(&query, vector)))
            .filter(|c| c.score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ContentType, Document};
    use crate::embedding::HashingEmbedder;

    fn fragments() -> Vec<DocumentFragment> {
        [
            ("inv", "invoice total amount due"),
            ("wx", "weather forecast sunny"),
            ("pay", "payment of the invoice"),
        ]
        .iter()
        .map(|(id, text)| {
            let doc = Document::new(*id, *id, *text, ContentType::Text);
            DocumentFragment::new(&doc, 0, doc.content.clone(), ContentType::Text)
        })
        .collect()
    }

    #[tokio::test]
    async fn test_search_ranks_by_similarity() {
        let provider = Arc::new(HashingEmbedder::new(256).unwrap());
        let fragments = fragments();
        let index = MemoryVectorIndex::build(provider, &fragments).await.unwrap();
        assert_eq!(index.len(), 3);

        let results = index.search("invoice total", 10).await.unwrap();
        assert_eq!(results[0].fragment_id, "inv#0");
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(results.iter().all(|c| c.score > 0.0));
    }

    #[tokio::test]
    async fn test_limit_respected() {
        let provider = Arc::new(HashingEmbedder::new(256).unwrap());
        let fragments = fragments();
        let index = MemoryVectorIndex::build(provider, &fragments).await.unwrap();

        assert!(index.search("invoice", 1).await.unwrap().len() <= 1);
        assert!(index.search("invoice", 0).await.unwrap().is_empty());
    }
}
