//! TF-IDF vector index over analyzed chunks.
//!
//! Weighting follows the common smoothed formulation:
//!
//! ```text
//! tf(t, d)  = raw count of t in d
//! idf(t)    = ln((1 + n) / (1 + df(t))) + 1
//! row(d)    = tf · idf, L2-normalized
//! ```
//!
//! Rows are stored sparse, sorted by term id. The index is immutable; the
//! knowledge base rebuilds it from scratch whenever the chunk set changes.

use std::collections::{BTreeSet, HashMap};

/// `(term id, weight)` pairs sorted by term id.
pub type SparseVector = Vec<(usize, f64)>;

#[derive(Debug, Clone)]
pub struct TfIdfIndex {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    rows: Vec<SparseVector>,
}

impl TfIdfIndex {
    /// Builds an index with one row per document, in input order. Returns
    /// `None` for an empty corpus.
    pub fn build(documents: &[Vec<String>]) -> Option<Self> {
        if documents.is_empty() {
            return None;
        }

        let terms: BTreeSet<&str> = documents
            .iter()
            .flat_map(|doc| doc.iter().map(String::as_str))
            .collect();
        let vocabulary: HashMap<String, usize> = terms
            .into_iter()
            .enumerate()
            .map(|(id, term)| (term.to_string(), id))
            .collect();

        let mut df = vec![0usize; vocabulary.len()];
        for doc in documents {
            let unique: BTreeSet<usize> = doc
                .iter()
                .filter_map(|t| vocabulary.get(t))
                .copied()
                .collect();
            for id in unique {
                df[id] += 1;
            }
        }

        let n = documents.len() as f64;
        let idf: Vec<f64> = df
            .iter()
            .map(|&d| ((1.0 + n) / (1.0 + d as f64)).ln() + 1.0)
            .collect();

        let mut index = Self {
            vocabulary,
            idf,
            rows: Vec::with_capacity(documents.len()),
        };
        let rows = documents.iter().map(|doc| index.vectorize(doc)).collect();
        index.rows = rows;
        Some(index)
    }

    /// Number of rows (one per indexed document).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// Maps terms onto the index vocabulary. Unknown terms are ignored.
    pub fn vectorize(&self, terms: &[String]) -> SparseVector {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for term in terms {
            if let Some(&id) = self.vocabulary.get(term) {
                *counts.entry(id).or_insert(0.0) += 1.0;
            }
        }

        let mut vector: SparseVector = counts
            .into_iter()
            .map(|(id, tf)| (id, tf * self.idf[id]))
            .collect();
        vector.sort_by_key(|(id, _)| *id);

        let norm = vector.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > f64::EPSILON {
            for (_, w) in vector.iter_mut() {
                *w /= norm;
            }
        }
        vector
    }

    /// Cosine similarity of the query terms against every row, in row order.
    pub fn scores(&self, query_terms: &[String]) -> Vec<f64> {
        let query = self.vectorize(query_terms);
        self.rows
            .iter()
            .map(|row| cosine_similarity(&query, row))
            .collect()
    }
}

/// Cosine similarity between two sparse vectors.
///
/// Returns `0.0` when either vector is all zeros.
pub fn cosine_similarity(a: &SparseVector, b: &SparseVector) -> f64 {
    let mut dot = 0.0;
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }

    let norm_a = a.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
    let denom = norm_a * norm_b;
    if denom < f64::EPSILON {
        return 0.0;
    }
    dot / denom
}
