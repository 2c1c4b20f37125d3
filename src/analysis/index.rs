//! In-process keyword similarity index.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use super::services::SemanticIndex;
use crate::error::AnalysisResult;

/// TF-IDF scored index over whole documents.
///
/// Scores are recomputed per query against the current corpus, so inserts
/// never invalidate anything.
#[derive(Debug, Clone, Default)]
pub struct KeywordIndex {
    documents: Vec<IndexedDocument>,
    document_frequency: HashMap<String, usize>,
}

#[derive(Debug, Clone)]
struct IndexedDocument {
    text: String,
    term_counts: HashMap<String, usize>,
    term_total: usize,
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index over `documents`.
    pub fn from_documents<I, S>(documents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = Self::new();
        for document in documents {
            index.add(document.into());
        }
        index
    }

    fn add(&mut self, text: String) {
        let tokens = tokenize(&text);
        let mut term_counts: HashMap<String, usize> = HashMap::new();
        for token in &tokens {
            *term_counts.entry(token.clone()).or_insert(0) += 1;
        }
        for term in term_counts.keys() {
            *self.document_frequency.entry(term.clone()).or_insert(0) += 1;
        }
        self.documents.push(IndexedDocument {
            text,
            term_counts,
            term_total: tokens.len(),
        });
    }

    /// Documents sharing at least one term with `query`, best first.
    ///
    /// Ties keep insertion order.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<&str> {
        if self.documents.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let n_docs = self.documents.len() as f64;
        let query_terms: HashSet<String> = tokenize(query).into_iter().collect();

        let mut scored: Vec<(usize, f64)> = self
            .documents
            .iter()
            .enumerate()
            .filter_map(|(position, doc)| {
                if doc.term_total == 0 {
                    return None;
                }
                let score: f64 = query_terms
                    .iter()
                    .filter_map(|term| {
                        let count = *doc.term_counts.get(term)? as f64;
                        let doc_freq = *self.document_frequency.get(term)? as f64;
                        let idf = (n_docs / doc_freq).ln() + 1.0;
                        Some(count / doc.term_total as f64 * idf)
                    })
                    .sum();
                (score > 0.0).then_some((position, score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);
        scored
            .into_iter()
            .map(|(position, _)| self.documents[position].text.as_str())
            .collect()
    }

    /// Stored documents in insertion order.
    pub fn documents(&self) -> impl Iterator<Item = &str> {
        self.documents.iter().map(|d| d.text.as_str())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl SemanticIndex for KeywordIndex {
    async fn insert(&mut self, documents: Vec<String>) -> AnalysisResult<()> {
        for document in documents {
            self.add(document);
        }
        Ok(())
    }

    async fn retrieve(&self, query: &str, top_k: usize) -> AnalysisResult<Vec<String>> {
        Ok(self
            .search(query, top_k)
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    fn len(&self) -> usize {
        self.documents.len()
    }
}

/// Lowercased alphanumeric words longer than two characters, minus stop words.
fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| w.chars().count() > 2 && !is_stop_word(w))
        .collect()
}

fn is_stop_word(word: &str) -> bool {
    matches!(
        word,
        "the"
            | "and"
            | "for"
            | "are"
            | "but"
            | "not"
            | "you"
            | "all"
            | "can"
            | "has"
            | "have"
            | "been"
            | "from"
            | "this"
            | "that"
            | "with"
            | "they"
            | "will"
            | "which"
            | "their"
            | "what"
            | "its"
            | "into"
            | "more"
            | "other"
            | "how"
            | "why"
            | "does"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> KeywordIndex {
        KeywordIndex::from_documents([
            "Freight costs rose sharply after the carrier contract renewal",
            "Customer churn is concentrated in the mid-market segment",
            "Carrier consolidation reduced freight options in the northeast",
        ])
    }

    #[test]
    fn test_search_ranks_matching_documents() {
        let index = corpus();
        let hits = index.search("Why did freight costs rise?", 3);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].starts_with("Freight costs rose"));
        assert!(hits.iter().all(|h| !h.contains("churn")));
    }

    #[test]
    fn test_search_respects_top_k() {
        let index = corpus();
        assert_eq!(index.search("freight carrier", 1).len(), 1);
        assert!(index.search("freight", 0).is_empty());
    }

    #[test]
    fn test_search_without_overlap_is_empty() {
        let index = corpus();
        assert!(index.search("quantum entanglement", 3).is_empty());
        assert!(KeywordIndex::new().search("freight", 3).is_empty());
    }

    #[test]
    fn test_tokenize_drops_short_and_stop_words() {
        assert_eq!(
            tokenize("The cost of a Freight-lane is up"),
            vec!["cost".to_string(), "freightlane".to_string()]
        );
    }

    #[tokio::test]
    async fn test_semantic_index_insert_and_retrieve() {
        let mut index = KeywordIndex::new();
        assert!(SemanticIndex::is_empty(&index));

        index
            .insert(vec![
                "Pricing power is weak".to_string(),
                "Pricing tiers confuse buyers".to_string(),
            ])
            .await
            .unwrap();
        assert_eq!(SemanticIndex::len(&index), 2);

        let hits = index.retrieve("pricing tiers", 5).await.unwrap();
        assert_eq!(hits[0], "Pricing tiers confuse buyers");
        assert_eq!(hits.len(), 2);
    }
}
