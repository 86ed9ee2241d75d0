//! In-memory document store the retriever hydrates fragments from

use crate::document::{Chunker, Document, DocumentFragment};
use std::collections::HashMap;

/// Documents and their fragments, kept in insertion order
#[derive(Debug, Default)]
pub struct Corpus {
    documents: HashMap<String, Document>,
    document_order: Vec<String>,
    fragments: HashMap<String, DocumentFragment>,
    fragment_order: Vec<String>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunk every document into the corpus
    pub fn build(documents: Vec<Document>, chunker: &Chunker) -> Self {
        let mut corpus = Self::new();
        for document in documents {
            let fragments = chunker.fragments(&document);
            corpus.add(document, fragments);
        }
        tracing::debug!(
            documents = corpus.document_count(),
            fragments = corpus.fragment_count(),
            "Corpus built"
        );
        corpus
    }

    /// Add a document with its fragments; returns false if the id is taken
    pub fn add(&mut self, document: Document, fragments: Vec<DocumentFragment>) -> bool {
        if self.documents.contains_key(&document.id) {
            tracing::warn!("Duplicate document id '{}', skipping", document.id);
            return false;
        }

        for fragment in fragments {
            self.fragment_order.push(fragment.id.clone());
            self.fragments.insert(fragment.id.clone(), fragment);
        }
        self.document_order.push(document.id.clone());
        self.documents.insert(document.id.clone(), document);
        true
    }

    pub fn document(&self, id: &str) -> Option<&Document> {
        self.documents.get(id)
    }

    pub fn fragment(&self, id: &str) -> Option<&DocumentFragment> {
        self.fragments.get(id)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.document_order
            .iter()
            .filter_map(|id| self.documents.get(id))
    }

    pub fn fragments(&self) -> impl Iterator<Item = &DocumentFragment> {
        self.fragment_order
            .iter()
            .filter_map(|id| self.fragments.get(id))
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}
