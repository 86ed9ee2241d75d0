/// Tantivy keyword index for BM25 full-text search
use super::{Candidate, RetrievalError, SparseIndex};
use crate::document::DocumentFragment;
use async_trait::async_trait;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy};

/// In-RAM BM25 index over fragment text
///
/// Built once from the corpus; read-only afterwards.
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    id_field: Field,
    text_field: Field,
    len: usize,
}

impl KeywordIndex {
    pub fn build<'a, I>(fragments: I) -> Result<Self, RetrievalError>
    where
        I: IntoIterator<Item = &'a DocumentFragment>,
    {
        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("fragment_id", STRING | STORED);
        let text_field = schema_builder.add_text_field("text", TEXT);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);

        let mut writer: IndexWriter = index
            .writer_with_num_threads(1, 50_000_000)
            .map_err(|e| RetrievalError::Index(format!("Keyword index init failed: {}", e)))?;

        let mut len = 0;
        for fragment in fragments {
            writer
                .add_document(doc!(
                    id_field => fragment.id.as_str(),
                    text_field => fragment.index_text(),
                ))
                .map_err(|e| RetrievalError::Index(format!("Insert failed: {}", e)))?;
            len += 1;
        }

        writer
            .commit()
            .map_err(|e| RetrievalError::Index(format!("Commit failed: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| RetrievalError::Index(format!("Reader init failed: {}", e)))?;

        tracing::debug!(documents = len, "Keyword index built");

        Ok(Self {
            index,
            reader,
            id_field,
            text_field,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[async_trait]
impl SparseIndex for KeywordIndex {
    /// Query syntax errors never fail a search: the query is parsed leniently
    async fn search(&self, text: &str, limit: usize) -> Result<Vec<Candidate>, RetrievalError> {
        if limit == 0 || self.len == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        let query_parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        let (query, errors) = query_parser.parse_query_lenient(text);
        if !errors.is_empty() {
            tracing::debug!("Lenient query parse dropped {} clause(s)", errors.len());
        }

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit.min(self.len)))
            .map_err(|e| RetrievalError::Index(format!("Search failed: {}", e)))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let retrieved: tantivy::TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| RetrievalError::Index(format!("Search failed: {}", e)))?;

            let id = retrieved
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
                .ok_or_else(|| RetrievalError::Index("Missing fragment id field".to_string()))?;

            results.push(Candidate::new(id, score));
        }

        Ok(results)
    }

    fn name(&self) -> &str {
        "tantivy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ContentType, Document};

    fn fragments(texts: &[(&str, &str)]) -> Vec<DocumentFragment> {
        texts
            .iter()
            .map(|(id, text)| {
                let doc = Document::new(*id, *id, *text, ContentType::Text);
                DocumentFragment::new(&doc, 0, doc.content.clone(), ContentType::Text)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_insert_and_search() {
        let fragments = fragments(&[
            ("d1", "The quick brown fox jumps over the lazy dog"),
            ("d2", "A fast red fox leaps above a sleepy canine"),
            ("d3", "Python programming language tutorial"),
        ]);
        let index = KeywordIndex::build(&fragments).unwrap();
        assert_eq!(index.len(), 3);

        let results = index.search("fox", 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].fragment_id == "d1#0" || results[0].fragment_id == "d2#0");

        let results = index.search("python", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].fragment_id, "d3#0");
    }

    #[tokio::test]
    async fn test_punctuation_does_not_fail() {
        let fragments = fragments(&[("d1", "Revenue grew in Q3")]);
        let index = KeywordIndex::build(&fragments).unwrap();

        let results = index.search("what about \"revenue (Q3?", 5).await.unwrap();
        assert!(results.len() <= 1);
        assert!(index.search("AND OR :", 5).await.is_ok());
    }

    #[tokio::test]
    async fn test_limit_larger_than_index() {
        let fragments = fragments(&[("d1", "invoice paid"), ("d2", "invoice overdue")]);
        let index = KeywordIndex::build(&fragments).unwrap();

        let results = index.search("invoice", usize::MAX).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_index() {
        let none: Vec<DocumentFragment> = Vec::new();
        let index = KeywordIndex::build(&none).unwrap();
        assert!(index.is_empty());
        assert!(index.search("anything", 5).await.unwrap().is_empty());
    }
}
