//! Delimited tables: CSV, TSV and pipe-delimited rows
//!
//! CSV and TSV go through the `csv` reader so quoted cells may hold the
//! delimiter or line breaks. Pipe tables (`| a | b |`) are split per line.

use csv::{ReaderBuilder, Trim};

/// Column separator, detected from the first non-blank line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Tab,
    Pipe,
}

impl Delimiter {
    pub fn detect(text: &str) -> Self {
        let header = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        if header.contains('\t') {
            Delimiter::Tab
        } else if header.contains('|') {
            Delimiter::Pipe
        } else {
            Delimiter::Comma
        }
    }

    fn byte(self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Tab => b'\t',
            Delimiter::Pipe => b'|',
        }
    }
}

fn reader(text: &str, delimiter: Delimiter) -> csv::Reader<&[u8]> {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter.byte())
        .trim(Trim::All)
        .from_reader(text.as_bytes())
}

/// Rows as trimmed cells, header first. Rows without any content are skipped.
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let delimiter = Delimiter::detect(text);
    if delimiter == Delimiter::Pipe {
        return text
            .lines()
            .filter(|l| !l.trim().is_empty() && !is_separator_row(l))
            .map(split_pipe_row)
            .collect();
    }

    let mut rows = Vec::new();
    for record in reader(text, delimiter).records() {
        match record {
            Ok(record) => {
                let cells: Vec<String> = record.iter().map(str::to_string).collect();
                if cells.iter().any(|c| !c.is_empty()) {
                    rows.push(cells);
                }
            }
            Err(e) => tracing::debug!("Skipping unreadable table row: {}", e),
        }
    }
    rows
}

/// Source text of each row, header first
///
/// A quoted cell spanning lines stays inside its row.
pub fn raw_rows(text: &str) -> Vec<&str> {
    let delimiter = Delimiter::detect(text);
    if delimiter == Delimiter::Pipe {
        return text
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty())
            .collect();
    }

    let mut starts = Vec::new();
    let mut reader = reader(text, delimiter);
    let mut record = csv::ByteRecord::new();
    loop {
        match reader.read_byte_record(&mut record) {
            Ok(true) => {
                if let Some(position) = record.position() {
                    starts.push(position.byte() as usize);
                }
            }
            Ok(false) => break,
            Err(e) => {
                tracing::debug!("Stopped reading table rows: {}", e);
                break;
            }
        }
    }

    let mut rows = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        if let Some(row) = text.get(start..end) {
            let row = row.trim_matches(|c| c == '\r' || c == '\n').trim_end();
            if !row.trim().is_empty() {
                rows.push(row);
            }
        }
    }
    rows
}

fn split_pipe_row(line: &str) -> Vec<String> {
    line.trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .split('|')
        .map(|cell| cell.trim().to_string())
        .collect()
}

fn is_separator_row(line: &str) -> bool {
    line.chars()
        .all(|c| matches!(c, '|' | '-' | ':' | '+' | ' ' | '\t'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(Delimiter::detect("\n\na\tb\n"), Delimiter::Tab);
        assert_eq!(Delimiter::detect("| a | b |"), Delimiter::Pipe);
        assert_eq!(Delimiter::detect("a,b"), Delimiter::Comma);
        assert_eq!(Delimiter::detect(""), Delimiter::Comma);
    }

    #[test]
    fn test_quoted_cells() {
        let rows = parse_rows("name,note\n\"globex, inc\",\"said \"\"hi\"\"\"\n");
        assert_eq!(rows[1], vec!["globex, inc", "said \"hi\""]);
    }

    #[test]
    fn test_ragged_rows_are_kept() {
        let rows = parse_rows("a\tb\n1\t2\t3\n\n4\n");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].len(), 3);
        assert_eq!(rows[2], vec!["4"]);
    }

    #[test]
    fn test_pipe_table_skips_separator() {
        let rows = parse_rows("| region | total |\n|---|---|\n| eu | 12 |\n");
        assert_eq!(rows, vec![vec!["region", "total"], vec!["eu", "12"]]);
    }

    #[test]
    fn test_raw_rows_keep_multiline_cells() {
        let text = "id,comment\n1,\"first line\nsecond line\"\n2,plain\n";
        let rows = raw_rows(text);
        assert_eq!(
            rows,
            vec!["id,comment", "1,\"first line\nsecond line\"", "2,plain"]
        );
    }
}
