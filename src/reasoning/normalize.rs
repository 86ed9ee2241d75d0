//! Content-type dispatch: every content type becomes text or an image

use super::ReasoningError;
use crate::document::{pdf, table, Content, ContentType};
use image::ImageFormat;

/// Content ready for a reasoning backend
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Text(String),
    Image {
        bytes: Vec<u8>,
        media_type: &'static str,
    },
}

pub fn normalize_content(
    content: &Content,
    content_type: ContentType,
) -> Result<Normalized, ReasoningError> {
    match content_type {
        ContentType::Text => Ok(Normalized::Text(decode_text(content)?)),
        ContentType::Table => Ok(Normalized::Text(render_table(&decode_text(content)?))),
        ContentType::Pdf => match content {
            Content::Text(text) => Ok(Normalized::Text(text.clone())),
            Content::Binary(bytes) => pdf::extract_text(bytes)
                .map(Normalized::Text)
                .map_err(|e| ReasoningError::InvalidContent(e.to_string())),
        },
        ContentType::Image => match content {
            Content::Binary(bytes) => Ok(Normalized::Image {
                media_type: sniff_image_type(bytes),
                bytes: bytes.clone(),
            }),
            Content::Text(_) => Err(ReasoningError::InvalidContent(
                "image content must be binary".to_string(),
            )),
        },
    }
}

fn decode_text(content: &Content) -> Result<String, ReasoningError> {
    match content {
        Content::Text(text) => Ok(text.clone()),
        Content::Binary(bytes) => String::from_utf8(bytes.clone())
            .map_err(|_| ReasoningError::InvalidContent("content is not valid UTF-8".to_string())),
    }
}

/// Render CSV, TSV or pipe-delimited rows as blank-line separated records
/// of `header: value` lines
pub fn render_table(text: &str) -> String {
    let mut rows = table::parse_rows(text).into_iter();
    let Some(headers) = rows.next() else {
        return String::new();
    };

    let records: Vec<String> = rows
        .filter_map(|cells| {
            let record: Vec<String> = cells
                .iter()
                .enumerate()
                .filter(|(_, value)| !value.is_empty())
                .map(|(i, value)| match headers.get(i) {
                    Some(header) if !header.is_empty() => format!("{}: {}", header, value),
                    _ => format!("column_{}: {}", i + 1, value),
                })
                .collect();
            (!record.is_empty()).then(|| record.join("\n"))
        })
        .collect();

    if records.is_empty() {
        headers.join(", ")
    } else {
        records.join("\n\n")
    }
}

/// Media type from the image's magic bytes
pub fn sniff_image_type(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Bmp) => "image/bmp",
        Ok(ImageFormat::Tiff) => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// Split normalized text into passages at blank lines
pub fn split_passages(text: &str) -> Vec<String> {
    let mut passages = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.trim().is_empty() {
                passages.push(current.trim().to_string());
            }
            current.clear();
        } else {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
    }
    if !current.trim().is_empty() {
        passages.push(current.trim().to_string());
    }
    passages
}
