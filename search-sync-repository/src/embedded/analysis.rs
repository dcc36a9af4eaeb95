//! Text analysis for the embedded index.

use tantivy::tokenizer::{LowerCaser, RawTokenizer, TextAnalyzer};
use tantivy::Index;

/// Analyzer of full-text fields: simple tokenizer, lower-casing and English
/// stemming. Registered by tantivy on every index.
pub(crate) const STEMMED_ANALYZER: &str = "en_stem";

/// Analyzer of exact-match fields: the whole value, lower-cased.
pub(crate) const EXACT_ANALYZER: &str = "exact_lowercase";

/// Register the analyzers tantivy does not ship with.
///
/// Tokenizers are not persisted with the index, so this runs every time an
/// index is created or opened.
pub(crate) fn register_analyzers(index: &Index) {
    index.tokenizers().register(
        EXACT_ANALYZER,
        TextAnalyzer::builder(RawTokenizer::default())
            .filter(LowerCaser)
            .build(),
    );
}

/// Split text into lower-case alphanumeric tokens.
///
/// # Example
///
/// ```
/// use search_sync_repository::embedded::tokenize;
///
/// assert_eq!(tokenize("Hello, World!"), vec!["hello", "world"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Whether a query word carries anything searchable.
pub(crate) fn is_searchable_word(word: &str) -> bool {
    !tokenize(word).is_empty()
}

/// Normalise a whole value for exact matching on non-analyzed fields.
pub(crate) fn exact_term(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tantivy::schema::Schema;
    use tantivy::tokenizer::TokenStream;

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Hello World"), vec!["hello", "world"]);
        assert_eq!(tokenize("  rust-lang 2021 "), vec!["rust", "lang", "2021"]);
        assert!(tokenize("...").is_empty());
    }

    #[test]
    fn test_punctuation_is_not_searchable() {
        assert!(is_searchable_word("Hello"));
        assert!(is_searchable_word("e-mail"));
        assert!(!is_searchable_word("-"));
        assert!(!is_searchable_word("!"));
    }

    #[test]
    fn test_exact_term() {
        assert_eq!(exact_term(" Ada "), Some("ada".to_string()));
        assert_eq!(exact_term("   "), None);
    }

    #[test]
    fn test_registered_analyzers() {
        let index = Index::create_in_ram(Schema::builder().build());
        register_analyzers(&index);

        let mut exact = index.tokenizers().get(EXACT_ANALYZER).unwrap();
        let mut tokens = Vec::new();
        exact
            .token_stream("Published Draft")
            .process(&mut |token| tokens.push(token.text.clone()));
        assert_eq!(tokens, vec!["published draft"]);

        let mut stemmed = index.tokenizers().get(STEMMED_ANALYZER).unwrap();
        let mut tokens = Vec::new();
        stemmed
            .token_stream("Running tips")
            .process(&mut |token| tokens.push(token.text.clone()));
        assert_eq!(tokens, vec!["run", "tip"]);
    }
}
