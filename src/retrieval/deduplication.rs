//! Result deduplication by content

use crate::document::{Content, DocumentFragment};
use crate::text::normalize;
use std::collections::HashSet;

/// Drop fragments whose content repeats an earlier one, keeping the
/// highest-scored instance
///
/// Text is compared after lowercasing and whitespace collapsing; binary
/// content by BLAKE3 digest. Input is expected in descending score order,
/// which the output preserves.
pub fn deduplicate_fragments(fragments: Vec<DocumentFragment>) -> Vec<DocumentFragment> {
    let mut seen: HashSet<String> = HashSet::new();

    fragments
        .into_iter()
        .filter(|fragment| seen.insert(content_key(&fragment.content)))
        .collect()
}

fn content_key(content: &Content) -> String {
    match content {
        Content::Text(text) => format!("t:{}", normalize(text)),
        Content::Binary(bytes) => format!("b:{}", blake3::hash(bytes).to_hex()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ContentType, Document};

    fn fragment(doc: &str, text: &str, score: f32) -> DocumentFragment {
        let document = Document::new(doc, doc, text, ContentType::Text);
        DocumentFragment::new(&document, 0, document.content.clone(), ContentType::Text)
            .with_score(score)
    }

    #[test]
    fn test_deduplication() {
        let fragments = vec![
            fragment("a", "Total: 42", 0.9),
            fragment("b", "Other text", 0.8),
            fragment("c", "total:   42\n", 0.7), // Duplicate after normalization
        ];

        let deduped = deduplicate_fragments(fragments);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].document_id, "a");
        assert_eq!(deduped[0].score, 0.9); // Keeps first (highest score)
    }

    #[test]
    fn test_binary_compared_by_digest() {
        let doc = Document::new("img", "img.png", vec![1u8, 2, 3], ContentType::Image);
        let a = DocumentFragment::new(&doc, 0, doc.content.clone(), ContentType::Image);
        let b = DocumentFragment::new(&doc, 1, Content::Binary(vec![1, 2, 4]), ContentType::Image);
        let c = a.clone();

        assert_eq!(deduplicate_fragments(vec![a, b, c]).len(), 2);
    }
}
