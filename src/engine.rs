//! Wires configuration into concrete retriever, reasoner and orchestrator

use crate::config::Config;
use crate::document::{load_directory, Chunker, Document, DocumentFragment};
use crate::embedding::{EmbeddingProvider, HashingEmbedder, OpenAiEmbedder, OpenAiEmbedderConfig};
use crate::error::{IedpError, Result};
use crate::orchestrator::{Orchestrator, Task, TaskReport};
use crate::reasoning::{
    ExtractiveBackend, MultimodalReasoner, OpenAiBackend, OpenAiBackendConfig, ReasoningBackend,
};
use crate::retrieval::{
    Corpus, DenseIndex, HybridRetriever, KeywordIndex, MemoryVectorIndex, QdrantConfig,
    QdrantIndex, Query, RetrievalError, Retriever,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Timeout for embedding and vector store requests
const REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// A corpus with its indexes and the components built over them
pub struct Engine {
    corpus: Arc<Corpus>,
    retriever: Arc<HybridRetriever>,
    orchestrator: Arc<Orchestrator>,
}

impl Engine {
    /// Chunk and index `documents` with the configured backends
    pub async fn build(config: &Config, documents: Vec<Document>) -> Result<Self> {
        let chunker = Chunker::new(config.chunker_config());
        let corpus = Arc::new(Corpus::build(documents, &chunker));

        let provider = embedding_provider(config)?;
        let dense = dense_index(config, provider, &corpus).await?;
        let sparse = Arc::new(KeywordIndex::build(corpus.fragments())?);

        let retriever = Arc::new(HybridRetriever::new(
            corpus.clone(),
            dense,
            sparse,
            config.retriever_settings()?,
        ));

        let reasoner = Arc::new(MultimodalReasoner::new(
            reasoning_backend(config)?,
            config.reasoner_config()?,
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            retriever.clone(),
            reasoner,
            config.orchestrator_config()?,
        ));

        tracing::info!(
            documents = corpus.document_count(),
            fragments = corpus.fragment_count(),
            embedding = %config.embedding.provider,
            vector_store = %config.vector_store.backend,
            reasoning = %config.reasoning.backend,
            "Engine ready"
        );

        Ok(Self {
            corpus,
            retriever,
            orchestrator,
        })
    }

    /// Load up to `limit` documents from `dir` and build over them
    pub async fn from_directory(config: &Config, dir: &Path, limit: Option<usize>) -> Result<Self> {
        let documents = if dir.exists() {
            load_directory(dir, limit)?
        } else {
            tracing::warn!("Data directory {} does not exist, starting empty", dir.display());
            Vec::new()
        };
        Self::build(config, documents).await
    }

    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }

    pub fn retriever(&self) -> &Arc<HybridRetriever> {
        &self.retriever
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub async fn retrieve(&self, query: &Query) -> Result<Vec<DocumentFragment>> {
        Ok(self.retriever.retrieve(query).await?)
    }

    pub async fn dispatch(&self, task: Task) -> TaskReport {
        self.orchestrator.dispatch_task(task).await
    }
}

fn api_key(env_name: &str, path: &str) -> Result<String> {
    std::env::var(env_name)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| IedpError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("environment variable {} is not set", env_name),
        })
}

fn embedding_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedding = &config.embedding;
    let provider: Arc<dyn EmbeddingProvider> = match embedding.provider.as_str() {
        "hashing" => Arc::new(
            HashingEmbedder::new(embedding.dimension).map_err(RetrievalError::from)?,
        ),
        "openai" => Arc::new(
            OpenAiEmbedder::new(OpenAiEmbedderConfig {
                base_url: embedding.base_url.clone(),
                model: embedding.model.clone(),
                dimension: embedding.dimension,
                api_key: api_key(&embedding.api_key_env, "embedding.api_key_env")?,
                timeout: REMOTE_TIMEOUT,
            })
            .map_err(RetrievalError::from)?,
        ),
        other => {
            return Err(IedpError::InvalidConfigValue {
                path: "embedding.provider".to_string(),
                message: format!("unknown provider '{}'", other),
            })
        }
    };
    Ok(provider)
}

async fn dense_index(
    config: &Config,
    provider: Arc<dyn EmbeddingProvider>,
    corpus: &Corpus,
) -> Result<Arc<dyn DenseIndex>> {
    let store = &config.vector_store;
    match store.backend.as_str() {
        "memory" => Ok(Arc::new(
            MemoryVectorIndex::build(provider, corpus.fragments()).await?,
        )),
        "qdrant" => {
            let index = QdrantIndex::connect(
                QdrantConfig {
                    url: store.url.clone(),
                    collection: store.collection.clone(),
                    api_key: std::env::var(&store.api_key_env).ok().filter(|k| !k.is_empty()),
                    timeout: REMOTE_TIMEOUT,
                },
                provider,
            )
            .await?;
            index.upsert(corpus.fragments()).await?;
            Ok(Arc::new(index))
        }
        other => Err(IedpError::InvalidConfigValue {
            path: "vector_store.backend".to_string(),
            message: format!("unknown backend '{}'", other),
        }),
    }
}

fn reasoning_backend(config: &Config) -> Result<Arc<dyn ReasoningBackend>> {
    let reasoning = &config.reasoning;
    match reasoning.backend.as_str() {
        "extractive" => Ok(Arc::new(ExtractiveBackend::default())),
        "openai" => Ok(Arc::new(OpenAiBackend::new(OpenAiBackendConfig {
            base_url: reasoning.base_url.clone(),
            model: reasoning.model.clone(),
            api_key: api_key(&reasoning.api_key_env, "reasoning.api_key_env")?,
            temperature: reasoning.temperature,
            timeout: config.reasoner_config()?.timeout,
        })?)),
        other => Err(IedpError::InvalidConfigValue {
            path: "reasoning.backend".to_string(),
            message: format!("unknown backend '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ContentType;

    #[tokio::test]
    async fn test_build_with_defaults() {
        let engine = Engine::build(
            &Config::default(),
            vec![
                Document::new("a", "a.txt", "Quarterly revenue was 12M.", ContentType::Text),
                Document::new("b", "b.csv", "item,qty\nbolts,4\n", ContentType::Table),
            ],
        )
        .await
        .unwrap();

        assert_eq!(engine.corpus().document_count(), 2);
        let hits = engine.retrieve(&Query::new("revenue", 1)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "a");

        let report = engine.dispatch(Task::new("quarterly revenue")).await;
        assert!(report.is_done());
    }

    #[tokio::test]
    async fn test_unknown_backend_rejected() {
        let mut config = Config::default();
        config.reasoning.backend = "oracle".to_string();
        assert!(Engine::build(&config, Vec::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::from_directory(&Config::default(), &dir.path().join("none"), None)
            .await
            .unwrap();
        assert!(engine.corpus().is_empty());
    }
}
