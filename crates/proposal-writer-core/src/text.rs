//! Tokenization and lexical relevance scoring.
//!
//! Text is split on word boundaries (any non-alphanumeric character),
//! lowercased, and stripped of a fixed English stopword list. Keyword
//! relevance uses Okapi BM25 over the candidate set being ranked.

use std::collections::{HashMap, HashSet};

/// English stopwords dropped from both queries and indexed text.
pub const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

fn is_stopword(token: &str) -> bool {
    STOPWORDS.binary_search(&token).is_ok()
}

/// Split `text` into lowercase, stopword-free word tokens.
///
/// ```rust
/// use proposal_writer_core::text::tokenize;
///
/// assert_eq!(tokenize("The Snowflake data-warehouse"), vec!["snowflake", "data", "warehouse"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| !is_stopword(t))
        .collect()
}

/// Distinct query terms, in first-seen order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Okapi BM25 parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length normalisation.
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

/// BM25 scorer built over one candidate corpus.
///
/// Scores are only comparable within the corpus the index was built from,
/// which is exactly the pre-filtered candidate set of one keyword search.
pub struct Bm25Index {
    params: Bm25Params,
    doc_terms: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    doc_freq: HashMap<String, usize>,
    avg_len: f64,
}

impl Bm25Index {
    /// Tokenize and index each text of the corpus.
    pub fn build<'a>(texts: impl IntoIterator<Item = &'a str>, params: Bm25Params) -> Self {
        let mut doc_terms = Vec::new();
        let mut doc_lens = Vec::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for text in texts {
            let tokens = tokenize(text);
            doc_lens.push(tokens.len());
            let mut tf: HashMap<String, usize> = HashMap::new();
            for t in tokens {
                *tf.entry(t).or_insert(0) += 1;
            }
            for term in tf.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            doc_terms.push(tf);
        }

        let total: usize = doc_lens.iter().sum();
        let avg_len = if doc_lens.is_empty() {
            0.0
        } else {
            total as f64 / doc_lens.len() as f64
        };

        Self {
            params,
            doc_terms,
            doc_lens,
            doc_freq,
            avg_len,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.len() as f64;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// BM25 score of corpus entry `doc` for `terms`, or `None` if the
    /// entry shares no term with the query.
    pub fn score(&self, doc: usize, terms: &[String]) -> Option<f64> {
        let tf_map = self.doc_terms.get(doc)?;
        let len = self.doc_lens[doc] as f64;
        let norm = if self.avg_len > 0.0 {
            1.0 - self.params.b + self.params.b * len / self.avg_len
        } else {
            1.0
        };

        let mut matched = false;
        let mut score = 0.0;
        for term in terms {
            let tf = match tf_map.get(term) {
                Some(&tf) if tf > 0 => tf as f64,
                _ => continue,
            };
            matched = true;
            score += self.idf(term) * (tf * (self.params.k1 + 1.0)) / (tf + self.params.k1 * norm);
        }
        matched.then_some(score)
    }
}
