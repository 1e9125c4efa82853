use std::collections::{BTreeSet, HashSet};

/// Splits text into the lowercase alphabetic tokens used for knowledge overlap scoring.
///
/// Corpus entries and queries must go through the same tokenizer so that overlap is
/// symmetric; the index owns one instance and uses it for both.
#[derive(Clone, Debug, Default)]
pub struct Tokenizer {
    stopwords: HashSet<String>,
}

impl Tokenizer {
    pub fn new<I, S>(stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let stopwords = stopwords
            .into_iter()
            .map(|word| word.as_ref().trim().to_ascii_lowercase())
            .filter(|word| !word.is_empty())
            .collect();
        Self { stopwords }
    }

    pub fn tokenize(&self, text: &str) -> BTreeSet<String> {
        text.split(|character: char| !character.is_ascii_alphabetic())
            .filter(|run| !run.is_empty())
            .map(|run| run.to_ascii_lowercase())
            .filter(|token| !self.stopwords.contains(token))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::Tokenizer;

    fn set(tokens: &[&str]) -> BTreeSet<String> {
        tokens.iter().map(|token| token.to_string()).collect()
    }

    #[test]
    fn strips_stopwords_and_punctuation() {
        let tokenizer = Tokenizer::new(["how", "do", "i", "my"]);
        assert_eq!(tokenizer.tokenize("How do I reset my password?"), set(&["reset", "password"]));
    }

    #[test]
    fn digits_and_non_ascii_split_runs() {
        let tokenizer = Tokenizer::default();
        assert_eq!(tokenizer.tokenize("error500code café"), set(&["error", "code", "caf"]));
    }

    #[test]
    fn blank_input_yields_no_tokens() {
        let tokenizer = Tokenizer::new(["the"]);
        assert!(tokenizer.tokenize("").is_empty());
        assert!(tokenizer.tokenize("   \t\n").is_empty());
        assert!(tokenizer.tokenize("123 -- !!").is_empty());
    }

    #[test]
    fn stopword_casing_is_normalized() {
        let tokenizer = Tokenizer::new(["The", " AND "]);
        assert_eq!(tokenizer.tokenize("THE cat AND dog"), set(&["cat", "dog"]));
    }

    #[test]
    fn duplicate_words_collapse() {
        let tokenizer = Tokenizer::default();
        assert_eq!(tokenizer.tokenize("Reset reset RESET"), set(&["reset"]));
    }
}
