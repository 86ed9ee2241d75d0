//! Splits documents into overlapping fragments

use super::{pdf, table, Content, ContentType, Document, DocumentFragment};

/// Chunking parameters, measured in characters
#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Turns a [`Document`] into [`DocumentFragment`]s
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Split a document according to its content type
    ///
    /// Text is windowed with overlap, tables are grouped by rows with the header
    /// repeated, PDFs are converted to text first, images stay whole.
    pub fn fragments(&self, document: &Document) -> Vec<DocumentFragment> {
        match (document.content_type, &document.content) {
            (ContentType::Text, Content::Text(text)) => self.text_fragments(document, text),
            (ContentType::Text, Content::Binary(bytes)) => {
                let text = String::from_utf8_lossy(bytes);
                self.text_fragments(document, &text)
            }
            (ContentType::Table, content) => {
                let text = match content {
                    Content::Text(text) => text.clone(),
                    Content::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                };
                self.split_table(&text)
                    .into_iter()
                    .enumerate()
                    .map(|(i, chunk)| {
                        DocumentFragment::new(document, i, Content::Text(chunk), ContentType::Table)
                    })
                    .collect()
            }
            (ContentType::Pdf, Content::Text(text)) => self.text_fragments(document, text),
            (ContentType::Pdf, Content::Binary(bytes)) => match pdf::extract_text(bytes) {
                Ok(text) => self.text_fragments(document, &text),
                Err(e) => {
                    tracing::warn!(
                        document = %document.id,
                        error = %e,
                        "PDF text extraction failed, indexing document whole"
                    );
                    vec![DocumentFragment::new(
                        document,
                        0,
                        document.content.clone(),
                        ContentType::Pdf,
                    )]
                }
            },
            (ContentType::Image, content) => vec![DocumentFragment::new(
                document,
                0,
                content.clone(),
                ContentType::Image,
            )],
        }
    }

    fn text_fragments(&self, document: &Document, text: &str) -> Vec<DocumentFragment> {
        self.split_text(text)
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                DocumentFragment::new(document, i, Content::Text(chunk), ContentType::Text)
            })
            .collect()
    }

    /// Split text into windows of `chunk_size` characters overlapping by
    /// `chunk_overlap`, preferring to break on whitespace
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let size = self.config.chunk_size.max(1);
        let overlap = self.config.chunk_overlap.min(size - 1);

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let mut end = (start + size).min(chars.len());

            if end < chars.len() {
                let floor = (start + size / 2).max(start + 1);
                if let Some(ws) = (floor..end).rev().find(|&i| chars[i].is_whitespace()) {
                    end = ws;
                }
            }

            let chunk: String = chars[start..end].iter().collect();
            let trimmed = chunk.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }

            if end >= chars.len() {
                break;
            }

            let next = end.saturating_sub(overlap);
            start = if next > start { next } else { end };
        }

        chunks
    }

    /// Group table rows into chunks, each starting with the header row
    pub fn split_table(&self, text: &str) -> Vec<String> {
        let rows = table::raw_rows(text);
        let Some((header, body)) = rows.split_first() else {
            return Vec::new();
        };

        let size = self.config.chunk_size.max(1);
        let mut chunks = Vec::new();
        let mut current = header.to_string();
        let mut rows_in_chunk = 0;

        for row in body {
            if rows_in_chunk > 0 && current.len() + 1 + row.len() > size {
                chunks.push(std::mem::replace(&mut current, header.to_string()));
                rows_in_chunk = 0;
            }
            current.push('\n');
            current.push_str(row);
            rows_in_chunk += 1;
        }

        chunks.push(current);
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkerConfig {
            chunk_size: size,
            chunk_overlap: overlap,
        })
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunker(100, 20).split_text("A short paragraph.");
        assert_eq!(chunks, vec!["A short paragraph.".to_string()]);
    }

    #[test]
    fn test_chunks_respect_size_and_overlap() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        let chunks = chunker(20, 6).split_text(text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20, "chunk too long: {chunk:?}");
        }
        // Overlap means the tail of one chunk reappears at the head of the next
        let joined = chunks.join(" ");
        for word in text.split_whitespace() {
            assert!(joined.contains(word), "lost word {word}");
        }
    }

    #[test]
    fn test_unbroken_text_still_progresses() {
        let text = "x".repeat(45);
        let chunks = chunker(10, 9).split_text(&text);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.len() <= 10));
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(chunker(10, 2).split_text("").is_empty());
    }

    #[test]
    fn test_table_chunks_repeat_header() {
        let table = "name,amount\nacme,10\nglobex,20\ninitech,30\n";
        let chunks = chunker(25, 0).split_table(table);

        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.starts_with("name,amount\n"));
        }
        let rows: usize = chunks.iter().map(|c| c.lines().count() - 1).sum();
        assert_eq!(rows, 3);
    }

    #[test]
    fn test_quoted_line_break_stays_in_one_row() {
        let table = "id,note\n1,\"spans\ntwo lines\"\n2,short\n";
        let chunks = chunker(20, 0).split_table(table);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "id,note\n1,\"spans\ntwo lines\"");
        assert_eq!(chunks[1], "id,note\n2,short");
    }

    #[test]
    fn test_image_document_is_one_fragment() {
        let doc = Document::new("logo", "logo.png", vec![0u8; 64], ContentType::Image);
        let fragments = chunker(10, 2).fragments(&doc);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].content_type, ContentType::Image);
        assert_eq!(fragments[0].id, "logo#0");
    }

    #[test]
    fn test_unparseable_pdf_kept_whole() {
        let doc = Document::new("broken", "broken.pdf", b"not a pdf".to_vec(), ContentType::Pdf);
        let fragments = chunker(100, 10).fragments(&doc);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].content_type, ContentType::Pdf);
    }
}
