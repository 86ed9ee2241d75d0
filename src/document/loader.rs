//! Loading documents from the filesystem

use super::{Content, ContentType, Document};
use crate::error::{IedpError, Result};
use std::collections::HashSet;
use std::path::Path;
use walkdir::WalkDir;

/// Load a single document, inferring its content type from the extension
pub fn load_document(path: &Path) -> Result<Document> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let content_type =
        ContentType::from_extension(ext).ok_or_else(|| IedpError::DocumentLoad {
            path: path.to_path_buf(),
            message: format!("unsupported file extension '{}'", ext),
        })?;

    let bytes = std::fs::read(path).map_err(|e| IedpError::Io {
        source: e,
        context: format!("Failed to read document: {:?}", path),
    })?;

    let content = match content_type {
        ContentType::Text | ContentType::Table => {
            Content::Text(String::from_utf8(bytes).map_err(|_| IedpError::DocumentLoad {
                path: path.to_path_buf(),
                message: "content is not valid UTF-8".to_string(),
            })?)
        }
        ContentType::Image | ContentType::Pdf => Content::Binary(bytes),
    };

    let title = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("untitled")
        .to_string();

    Ok(Document::new(document_id_for(path), title, content, content_type).with_source(path))
}

/// Load up to `limit` supported documents under `dir`, in file-name order
///
/// Unsupported files are skipped. Identifiers are made unique by suffixing
/// `-2`, `-3`, ... on collision.
pub fn load_directory(dir: &Path, limit: Option<usize>) -> Result<Vec<Document>> {
    if !dir.exists() {
        return Err(IedpError::DocumentLoad {
            path: dir.to_path_buf(),
            message: "directory does not exist".to_string(),
        });
    }

    let mut documents = Vec::new();
    let mut seen_ids = HashSet::new();

    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = entry.map_err(|e| IedpError::DocumentLoad {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        if limit.is_some_and(|l| documents.len() >= l) {
            break;
        }

        let path = entry.path();
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ContentType::from_extension)
            .is_some();
        if !supported {
            tracing::debug!("Skipping unsupported file {:?}", path);
            continue;
        }

        let mut document = load_document(path)?;
        if !seen_ids.insert(document.id.clone()) {
            let base = document.id.clone();
            let mut n = 2;
            while !seen_ids.insert(format!("{}-{}", base, n)) {
                n += 1;
            }
            document.id = format!("{}-{}", base, n);
        }
        documents.push(document);
    }

    tracing::info!("Loaded {} documents from {:?}", documents.len(), dir);
    Ok(documents)
}

/// Document identifier derived from the file stem: lowercase, `[a-z0-9_-]`
pub fn document_id_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_lowercase();

    let mut id = String::with_capacity(stem.len());
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            id.push(c);
        } else if !id.ends_with('-') {
            id.push('-');
        }
    }

    let id = id.trim_matches('-').to_string();
    if id.is_empty() {
        "document".to_string()
    } else {
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_document_id_for() {
        assert_eq!(document_id_for(Path::new("/x/Q3 Report (final).txt")), "q3-report-final");
        assert_eq!(document_id_for(Path::new("invoice_042.pdf")), "invoice_042");
        assert_eq!(document_id_for(Path::new("...txt")), "document");
    }

    #[test]
    fn test_load_text_and_table() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("notes.md"), "hello world").unwrap();
        std::fs::write(temp.path().join("sales.csv"), "region,total\neu,10\n").unwrap();

        let notes = load_document(&temp.path().join("notes.md")).unwrap();
        assert_eq!(notes.content_type, ContentType::Text);
        assert_eq!(notes.content.as_text(), Some("hello world"));
        assert_eq!(notes.title, "notes.md");

        let sales = load_document(&temp.path().join("sales.csv")).unwrap();
        assert_eq!(sales.content_type, ContentType::Table);
    }

    #[test]
    fn test_unsupported_extension() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("archive.zip");
        std::fs::write(&path, [0u8; 4]).unwrap();
        assert!(matches!(
            load_document(&path),
            Err(IedpError::DocumentLoad { .. })
        ));
    }

    #[test]
    fn test_load_directory_limit_and_unique_ids() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), "first").unwrap();
        std::fs::write(temp.path().join("a.md"), "second").unwrap();
        std::fs::write(temp.path().join("b.txt"), "third").unwrap();
        std::fs::write(temp.path().join("skip.bin"), "ignored").unwrap();
        std::fs::write(temp.path().join(".hidden.txt"), "ignored").unwrap();

        let all = load_directory(temp.path(), None).unwrap();
        let ids: Vec<&str> = all.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "a-2", "b"]);

        let limited = load_directory(temp.path(), Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
    }
}
