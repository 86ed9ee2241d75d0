//! Tokenization helpers shared by the hashing embedder, deduplication and the
//! extractive reasoner

const STOP_WORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "any", "are", "as", "at", "be", "been", "but", "by", "can",
    "could", "did", "do", "does", "for", "from", "had", "has", "have", "how", "i", "if", "in",
    "into", "is", "it", "its", "me", "my", "of", "on", "or", "our", "so", "than", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "those", "to", "was", "we", "were",
    "what", "when", "where", "which", "who", "whom", "why", "will", "with", "would", "you",
    "your",
];

/// Lowercase alphanumeric word tokens
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.binary_search(&token).is_ok()
}

/// Tokens with stop words removed, in order, without repeats
pub fn content_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for token in tokenize(text) {
        if !is_stop_word(&token) && !terms.contains(&token) {
            terms.push(token);
        }
    }
    terms
}

/// Lowercase and collapse whitespace; two texts with equal normal forms are
/// treated as duplicates
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_words_sorted() {
        let mut sorted = STOP_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOP_WORDS);
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Q3 revenue: $4.2M (up 12%)"),
            vec!["q3", "revenue", "4", "2m", "up", "12"]
        );
    }

    #[test]
    fn test_content_terms_drop_stop_words_and_repeats() {
        assert_eq!(
            content_terms("What is the revenue of the revenue team?"),
            vec!["revenue", "team"]
        );
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Hello\n\tWORLD  "), "hello world");
    }
}
