//! Hybrid retrieval combining dense and sparse search

use super::{
    deduplicate_fragments, fuse, Corpus, DenseIndex, FusionConfig, Query, RetrievalError,
    Retriever, SparseIndex,
};
use crate::document::{Document, DocumentFragment};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{Instrument, Span};

/// Retriever tuning taken from the `retrieval` config section
#[derive(Debug, Clone)]
pub struct RetrieverSettings {
    pub fusion: FusionConfig,
    /// Each index is asked for `k * candidate_multiplier` candidates
    pub candidate_multiplier: usize,
    /// Fused scores below this are dropped
    pub min_score: f32,
    /// Drop fragments whose normalized content repeats a better-ranked one
    pub deduplicate: bool,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            fusion: FusionConfig::default(),
            candidate_multiplier: 3,
            min_score: 0.0,
            deduplicate: true,
        }
    }
}

/// Hybrid retriever combining dense and sparse search over a shared corpus
pub struct HybridRetriever {
    corpus: Arc<Corpus>,
    dense: Arc<dyn DenseIndex>,
    sparse: Arc<dyn SparseIndex>,
    settings: RetrieverSettings,
    span: Span,
}

impl HybridRetriever {
    pub fn new(
        corpus: Arc<Corpus>,
        dense: Arc<dyn DenseIndex>,
        sparse: Arc<dyn SparseIndex>,
        settings: RetrieverSettings,
    ) -> Self {
        let span = tracing::info_span!(
            "retriever",
            dense = dense.name(),
            sparse = sparse.name(),
            fusion = %settings.fusion.strategy,
        );

        Self {
            corpus,
            dense,
            sparse,
            settings,
            span,
        }
    }

    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }

    async fn search(&self, query: &Query) -> Result<Vec<DocumentFragment>, RetrievalError> {
        // A document filter can discard most candidates, so consider them all.
        // Neither index can return more fragments than the corpus holds.
        let fragment_count = self.corpus.fragment_count();
        let search_limit = match &query.document_filter {
            Some(_) => fragment_count,
            None => query
                .k
                .saturating_mul(self.settings.candidate_multiplier.max(1))
                .min(fragment_count),
        };

        // Step 1: Parallel dense + sparse search
        let (dense_results, sparse_results) = tokio::join!(
            self.dense.search(&query.text, search_limit),
            self.sparse.search(&query.text, search_limit)
        );
        let dense_results = dense_results?;
        let sparse_results = sparse_results?;

        tracing::debug!(
            dense = dense_results.len(),
            sparse = sparse_results.len(),
            "Candidates collected"
        );

        // Step 2: Rank fusion
        let fused = fuse(&dense_results, &sparse_results, &self.settings.fusion);

        // Step 3: Hydrate fragments from the corpus
        let mut candidates: Vec<DocumentFragment> = fused
            .into_iter()
            .filter_map(|candidate| match self.corpus.fragment(&candidate.fragment_id) {
                Some(fragment) => Some(fragment.clone().with_score(candidate.score)),
                None => {
                    tracing::warn!(
                        "Index returned unknown fragment '{}', skipping",
                        candidate.fragment_id
                    );
                    None
                }
            })
            .collect();

        // Step 4: Document filter
        if let Some(document_id) = &query.document_filter {
            candidates.retain(|f| &f.document_id == document_id);
        }

        // Step 5: Score threshold
        if self.settings.min_score > 0.0 {
            candidates.retain(|f| f.score >= self.settings.min_score);
        }

        // Step 6: Content deduplication
        if self.settings.deduplicate {
            candidates = deduplicate_fragments(candidates);
        }

        candidates.truncate(query.k);
        Ok(candidates)
    }
}

#[async_trait]
impl Retriever for HybridRetriever {
    async fn retrieve(&self, query: &Query) -> Result<Vec<DocumentFragment>, RetrievalError> {
        query.validate()?;

        if let Some(document_id) = &query.document_filter {
            if self.corpus.document(document_id).is_none() {
                return Err(RetrievalError::DocumentNotFound(document_id.clone()));
            }
        }

        if self.corpus.is_empty() {
            return Ok(Vec::new());
        }

        let results = self.search(query).instrument(self.span.clone()).await?;

        tracing::info!(
            parent: &self.span,
            k = query.k,
            returned = results.len(),
            "Retrieved fragments"
        );
        Ok(results)
    }

    async fn fetch_document(&self, document_id: &str) -> Result<Document, RetrievalError> {
        self.corpus
            .document(document_id)
            .cloned()
            .ok_or_else(|| RetrievalError::DocumentNotFound(document_id.to_string()))
    }

    fn name(&self) -> &str {
        "hybrid"
    }
}
