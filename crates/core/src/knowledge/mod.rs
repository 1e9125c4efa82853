//! In-memory knowledge index.
//!
//! Built once from the deployment corpus and read-only afterwards, so a single index can be
//! shared across sessions behind an `Arc` without locking. Three lexical strategies are
//! available; which one `search` uses is fixed when the index is built.

use std::collections::{BTreeSet, HashSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::deployment::{KnowledgeRecord, TextProcessingConfig};
use crate::text::Tokenizer;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Keyword,
    Semantic,
    Hybrid,
}

impl SearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "semantic" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            other => {
                Err(format!("unsupported search mode `{other}` (expected keyword|semantic|hybrid)"))
            }
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("duplicate knowledge entry id `{0}`")]
    DuplicateId(String),
    #[error("knowledge entry at position {0} has an empty id")]
    EmptyId(usize),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KnowledgeEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    pub tokens: BTreeSet<String>,
}

impl KnowledgeEntry {
    pub fn to_record(&self) -> KnowledgeRecord {
        KnowledgeRecord {
            id: self.id.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
            category: self.category.clone(),
        }
    }

    fn overlap(&self, query_tokens: &BTreeSet<String>) -> usize {
        self.tokens.intersection(query_tokens).count()
    }
}

/// Entries matched by one search, borrowed from the index in result order.
#[derive(Clone, Debug)]
pub struct SearchResult<'a> {
    pub search_mode: SearchMode,
    pub matches: Vec<&'a KnowledgeEntry>,
    pub response_time_ms: f64,
}

impl SearchResult<'_> {
    pub fn to_response(&self) -> SearchResponse {
        SearchResponse {
            search_mode: Some(self.search_mode),
            matches: self.matches.iter().map(|entry| entry.to_record()).collect(),
            response_time_ms: self.response_time_ms,
        }
    }
}

/// Wire form of a search, as served on `knowledge://search/...`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_mode: Option<SearchMode>,
    pub matches: Vec<KnowledgeRecord>,
    #[serde(default)]
    pub response_time_ms: f64,
}

#[derive(Clone, Debug)]
pub struct KnowledgeIndex {
    entries: Vec<KnowledgeEntry>,
    tokenizer: Tokenizer,
    min_token_match: usize,
    mode: SearchMode,
}

impl KnowledgeIndex {
    pub fn build(
        corpus: &[KnowledgeRecord],
        text_processing: &TextProcessingConfig,
        mode: SearchMode,
    ) -> Result<Self, IndexError> {
        let tokenizer = Tokenizer::new(&text_processing.stopwords);
        let mut seen_ids = HashSet::new();
        let mut entries = Vec::with_capacity(corpus.len());

        for (position, record) in corpus.iter().enumerate() {
            if record.id.trim().is_empty() {
                return Err(IndexError::EmptyId(position));
            }
            if !seen_ids.insert(record.id.as_str()) {
                return Err(IndexError::DuplicateId(record.id.clone()));
            }

            let combined = format!("{} {}", record.title, record.content);
            entries.push(KnowledgeEntry {
                id: record.id.clone(),
                title: record.title.clone(),
                content: record.content.clone(),
                category: record.category.clone(),
                tokens: tokenizer.tokenize(&combined),
            });
        }

        tracing::debug!(
            event_name = "knowbot.index.built",
            entries = entries.len(),
            search_mode = mode.as_str(),
            min_token_match = text_processing.min_token_match,
            "knowledge index built"
        );

        Ok(Self { entries, tokenizer, min_token_match: text_processing.min_token_match, mode })
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs the configured strategy and stamps the elapsed time.
    pub fn search(&self, query: &str) -> SearchResult<'_> {
        let started = Instant::now();
        let matches = match self.mode {
            SearchMode::Keyword => self.keyword_search(query),
            SearchMode::Semantic => self.semantic_search(query),
            SearchMode::Hybrid => self.hybrid_search(query),
        };
        let response_time_ms = round_ms(started.elapsed().as_secs_f64() * 1000.0);
        SearchResult { search_mode: self.mode, matches, response_time_ms }
    }

    /// Entries sharing at least `min_token_match` tokens with the query, in corpus order.
    /// A query with no tokens left after stopword removal matches nothing.
    pub fn keyword_search(&self, query: &str) -> Vec<&KnowledgeEntry> {
        let query_tokens = self.tokenizer.tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }
        self.entries.iter().filter(|entry| entry.overlap(&query_tokens) >= self.min_token_match).collect()
    }

    /// Entries with any overlap, highest overlap first; ties keep corpus order.
    pub fn semantic_search(&self, query: &str) -> Vec<&KnowledgeEntry> {
        self.semantic_scores(query).into_iter().map(|(_, entry)| entry).collect()
    }

    pub fn semantic_scores(&self, query: &str) -> Vec<(usize, &KnowledgeEntry)> {
        let query_tokens = self.tokenizer.tokenize(query);
        let mut scored = self
            .entries
            .iter()
            .map(|entry| (entry.overlap(&query_tokens), entry))
            .filter(|(score, _)| *score > 0)
            .collect::<Vec<_>>();
        // sort_by is stable, which keeps equal scores in corpus order
        scored.sort_by(|left, right| right.0.cmp(&left.0));
        scored
    }

    /// Keyword hits first, then semantic-only hits in score order, de-duplicated by id.
    pub fn hybrid_search(&self, query: &str) -> Vec<&KnowledgeEntry> {
        let mut merged = self.keyword_search(query);
        let mut seen = merged.iter().map(|entry| entry.id.as_str()).collect::<HashSet<_>>();

        for entry in self.semantic_search(query) {
            if seen.insert(entry.id.as_str()) {
                merged.push(entry);
            }
        }

        merged
    }

    pub fn search_all(&self) -> Vec<&KnowledgeEntry> {
        self.entries.iter().collect()
    }
}

/// First record (corpus order) whose category equals `category`. This is the fallback used
/// when a search returns nothing.
pub fn first_in_category<'a>(
    records: &'a [KnowledgeRecord],
    category: &str,
) -> Option<&'a KnowledgeRecord> {
    records.iter().find(|record| record.category == category)
}

fn round_ms(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::{first_in_category, IndexError, KnowledgeIndex, SearchMode};
    use crate::deployment::{KnowledgeRecord, TextProcessingConfig};

    fn record(id: &str, title: &str, content: &str, category: &str) -> KnowledgeRecord {
        KnowledgeRecord {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            category: category.to_string(),
        }
    }

    fn text_processing(stopwords: &[&str], min_token_match: usize) -> TextProcessingConfig {
        TextProcessingConfig {
            stopwords: stopwords.iter().map(|word| word.to_string()).collect(),
            min_token_match,
        }
    }

    fn corpus() -> Vec<KnowledgeRecord> {
        vec![
            record("kb-1", "Invoice copies", "download an invoice from billing", "billing"),
            record("kb-2", "Password reset", "reset your password from the login page", "account"),
            record(
                "kb-3",
                "Refund and invoice disputes",
                "refund requests for a disputed invoice charge",
                "billing",
            ),
            record("kb-4", "Shipping", "orders ship within two days", "orders"),
        ]
    }

    fn index(mode: SearchMode, min_token_match: usize) -> KnowledgeIndex {
        KnowledgeIndex::build(
            &corpus(),
            &text_processing(&["how", "do", "i", "my", "a", "the", "an", "from", "for"], min_token_match),
            mode,
        )
        .expect("index should build")
    }

    #[test]
    fn keyword_search_matches_worked_example() {
        let corpus = vec![record("1", "Reset", "password reset steps", "account")];
        let index = KnowledgeIndex::build(
            &corpus,
            &text_processing(&["how", "do", "i", "my"], 1),
            SearchMode::Keyword,
        )
        .expect("index should build");

        let matches = index.keyword_search("How do I reset my password?");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "1");
    }

    #[test]
    fn stopword_only_query_matches_nothing() {
        let index = index(SearchMode::Keyword, 1);
        assert!(index.keyword_search("how do I").is_empty());
        assert!(index.keyword_search("").is_empty());
        assert!(index.semantic_search("the a an").is_empty());
        assert!(index.hybrid_search("  ").is_empty());
    }

    #[test]
    fn keyword_search_keeps_corpus_order_and_threshold() {
        let index = index(SearchMode::Keyword, 1);
        let ids = index.keyword_search("refund invoice").iter().map(|e| e.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["kb-1", "kb-3"]);

        let strict = self::index(SearchMode::Keyword, 2);
        let ids = strict.keyword_search("refund invoice").iter().map(|e| e.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["kb-3"]);
    }

    #[test]
    fn semantic_scores_are_non_increasing_with_stable_ties() {
        let index = index(SearchMode::Semantic, 1);
        let scored = index.semantic_scores("refund invoice password reset");

        let scores = scored.iter().map(|(score, _)| *score).collect::<Vec<_>>();
        assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]), "scores: {scores:?}");

        let ids = scored.iter().map(|(_, entry)| entry.id.as_str()).collect::<Vec<_>>();
        // kb-2 and kb-3 both score 2; kb-2 comes first in the corpus
        assert_eq!(ids, vec!["kb-2", "kb-3", "kb-1"]);
    }

    #[test]
    fn hybrid_puts_keyword_hits_first() {
        let index = index(SearchMode::Hybrid, 2);
        let query = "refund invoice password";

        let keyword = index.keyword_search(query).iter().map(|e| e.id.clone()).collect::<Vec<_>>();
        let hybrid = index.hybrid_search(query).iter().map(|e| e.id.clone()).collect::<Vec<_>>();

        assert_eq!(keyword, vec!["kb-3"]);
        assert_eq!(&hybrid[..keyword.len()], keyword.as_slice());
        assert_eq!(hybrid, vec!["kb-3", "kb-1", "kb-2"]);
    }

    #[test]
    fn search_dispatches_on_configured_mode() {
        let index = index(SearchMode::Semantic, 1);
        let result = index.search("password reset");
        assert_eq!(result.search_mode, SearchMode::Semantic);
        assert_eq!(result.matches.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["kb-2"]);
        assert!(result.response_time_ms >= 0.0);

        let response = result.to_response();
        assert_eq!(response.search_mode, Some(SearchMode::Semantic));
        assert_eq!(response.matches[0].title, "Password reset");
    }

    #[test]
    fn search_all_and_category_lookup() {
        let index = index(SearchMode::Keyword, 1);
        assert_eq!(index.search_all().len(), 4);

        let corpus = corpus();
        assert_eq!(first_in_category(&corpus, "billing").map(|r| r.id.as_str()), Some("kb-1"));
        assert!(first_in_category(&corpus, "legal").is_none());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let corpus = vec![record("dup", "a", "b", "c"), record("dup", "d", "e", "f")];
        let error = KnowledgeIndex::build(&corpus, &text_processing(&[], 1), SearchMode::Keyword)
            .expect_err("duplicate ids should fail");
        assert_eq!(error, IndexError::DuplicateId("dup".to_string()));
    }

    #[test]
    fn search_mode_parses_case_insensitively() {
        assert_eq!("Hybrid".parse::<SearchMode>(), Ok(SearchMode::Hybrid));
        assert!("vector".parse::<SearchMode>().is_err());
    }
}
