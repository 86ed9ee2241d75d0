//! Hybrid retrieval over the corpus with fixed-ranking indexes and the
//! built-in hashing + BM25 indexes

use async_trait::async_trait;
use iedp::document::{Chunker, ChunkerConfig, ContentType, Document};
use iedp::embedding::HashingEmbedder;
use iedp::error::ErrorKind;
use iedp::retrieval::{
    Candidate, Corpus, DenseIndex, FusionConfig, FusionStrategy, HybridRetriever, KeywordIndex,
    MemoryVectorIndex, Query, RetrievalError, Retriever, RetrieverSettings, SparseIndex,
};
use std::sync::Arc;

/// Index that always returns the same ranking
struct FixedRanking {
    name: &'static str,
    ids: Vec<&'static str>,
}

impl FixedRanking {
    fn candidates(&self, limit: usize) -> Vec<Candidate> {
        self.ids
            .iter()
            .enumerate()
            .take(limit)
            .map(|(rank, id)| Candidate::new(*id, 1.0 - rank as f32 * 0.1))
            .collect()
    }
}

#[async_trait]
impl DenseIndex for FixedRanking {
    async fn search(&self, _text: &str, limit: usize) -> Result<Vec<Candidate>, RetrievalError> {
        Ok(self.candidates(limit))
    }

    fn name(&self) -> &str {
        self.name
    }
}

#[async_trait]
impl SparseIndex for FixedRanking {
    async fn search(&self, _text: &str, limit: usize) -> Result<Vec<Candidate>, RetrievalError> {
        Ok(self.candidates(limit))
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Index whose backend is down
struct Offline;

#[async_trait]
impl DenseIndex for Offline {
    async fn search(&self, _text: &str, _limit: usize) -> Result<Vec<Candidate>, RetrievalError> {
        Err(RetrievalError::unavailable("qdrant", "connection refused"))
    }

    fn name(&self) -> &str {
        "offline"
    }
}

fn corpus() -> Arc<Corpus> {
    let docs = vec![
        Document::new("a", "a.txt", "Quarterly revenue grew by 12 percent", ContentType::Text),
        Document::new("b", "b.txt", "The cafeteria menu changes weekly", ContentType::Text),
        Document::new("c", "c.txt", "Revenue forecast for the next quarter", ContentType::Text),
    ];
    Arc::new(Corpus::build(docs, &Chunker::new(ChunkerConfig::default())))
}

fn fixed_retriever(settings: RetrieverSettings) -> HybridRetriever {
    let dense = FixedRanking {
        name: "dense",
        ids: vec!["a#0", "b#0", "c#0"],
    };
    let sparse = FixedRanking {
        name: "sparse",
        ids: vec!["c#0", "a#0", "b#0"],
    };
    HybridRetriever::new(corpus(), Arc::new(dense), Arc::new(sparse), settings)
}

#[tokio::test]
async fn test_rrf_fuses_both_rankings() {
    let retriever = fixed_retriever(RetrieverSettings::default());

    let results = retriever.retrieve(&Query::new("revenue", 2)).await.unwrap();
    let ids: Vec<&str> = results.iter().map(|f| f.document_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);

    // Same inputs, same order
    for _ in 0..5 {
        let again = retriever.retrieve(&Query::new("revenue", 2)).await.unwrap();
        let again_ids: Vec<&str> = again.iter().map(|f| f.document_id.as_str()).collect();
        assert_eq!(again_ids, ids);
    }
}

#[tokio::test]
async fn test_results_are_bounded_and_sorted() {
    let retriever = fixed_retriever(RetrieverSettings::default());

    for k in 1..=5 {
        let results = retriever.retrieve(&Query::new("anything", k)).await.unwrap();
        assert!(results.len() <= k);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(results.iter().all(|f| f.score > 0.0));
    }

    let all = retriever.retrieve(&Query::new("anything", 10)).await.unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn test_weighted_fusion_follows_weights() {
    let settings = RetrieverSettings {
        fusion: FusionConfig {
            strategy: FusionStrategy::Weighted,
            rrf_k: 60.0,
            dense_weight: 0.0,
            sparse_weight: 1.0,
        },
        ..RetrieverSettings::default()
    };
    let retriever = fixed_retriever(settings);

    let results = retriever.retrieve(&Query::new("revenue", 1)).await.unwrap();
    assert_eq!(results[0].document_id, "c");
}

#[tokio::test]
async fn test_document_filter() {
    let retriever = fixed_retriever(RetrieverSettings::default());

    let results = retriever
        .retrieve(&Query::new("revenue", 3).with_document_filter("b"))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document_id, "b");

    let err = retriever
        .retrieve(&Query::new("revenue", 3).with_document_filter("zzz"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DocumentNotFound);
}

#[tokio::test]
async fn test_invalid_queries() {
    let retriever = fixed_retriever(RetrieverSettings::default());

    let empty = retriever.retrieve(&Query::new("   ", 3)).await.unwrap_err();
    assert_eq!(empty.kind(), ErrorKind::InvalidQuery);

    let zero = retriever.retrieve(&Query::new("revenue", 0)).await.unwrap_err();
    assert_eq!(zero.kind(), ErrorKind::InvalidQuery);
}

#[tokio::test]
async fn test_unavailable_index_surfaces_as_retrieval_unavailable() {
    let sparse = FixedRanking {
        name: "sparse",
        ids: vec!["a#0"],
    };
    let retriever = HybridRetriever::new(
        corpus(),
        Arc::new(Offline),
        Arc::new(sparse),
        RetrieverSettings::default(),
    );

    let err = retriever.retrieve(&Query::new("revenue", 2)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RetrievalUnavailable);
    assert!(err.kind().is_retryable());
}

#[tokio::test]
async fn test_builtin_indexes_rank_lexical_match_first() {
    let corpus = corpus();
    let provider = Arc::new(HashingEmbedder::new(256).unwrap());
    let dense = MemoryVectorIndex::build(provider, corpus.fragments())
        .await
        .unwrap();
    let sparse = KeywordIndex::build(corpus.fragments()).unwrap();
    let retriever = HybridRetriever::new(
        corpus,
        Arc::new(dense),
        Arc::new(sparse),
        RetrieverSettings::default(),
    );

    let results = retriever
        .retrieve(&Query::new("cafeteria menu", 3))
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].document_id, "b");

    let document = retriever.fetch_document("c").await.unwrap();
    assert_eq!(document.title, "c.txt");
}

#[tokio::test]
async fn test_huge_k_returns_whole_corpus() {
    let corpus = corpus();
    let provider = Arc::new(HashingEmbedder::new(256).unwrap());
    let dense = MemoryVectorIndex::build(provider, corpus.fragments())
        .await
        .unwrap();
    let sparse = KeywordIndex::build(corpus.fragments()).unwrap();
    let retriever = HybridRetriever::new(
        corpus,
        Arc::new(dense),
        Arc::new(sparse),
        RetrieverSettings::default(),
    );

    for k in [1_000_000_000, usize::MAX / 2, usize::MAX] {
        let results = retriever.retrieve(&Query::new("revenue", k)).await.unwrap();
        assert!(!results.is_empty());
        assert!(results.len() <= 3);
    }
}
