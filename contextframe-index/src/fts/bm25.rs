// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! A native inverted index with BM25 scoring (§4.6), used instead of
//! delegating to tantivy's own `Index` so that term postings live
//! alongside this crate's other row-addressed structures.

use std::collections::HashMap;

use crate::vector::RowAddress;

use super::tokenizer::{FrameTokenizer, TokenizerConfig};

pub const K1: f32 = 1.2;
pub const B: f32 = 0.75;

#[derive(Debug, Default, Clone)]
struct Posting {
    /// Term frequency within the document.
    term_freq: u32,
}

#[derive(Debug, Default)]
pub struct InvertedIndex {
    /// term -> (row -> posting)
    postings: HashMap<String, HashMap<RowAddress, Posting>>,
    doc_lengths: HashMap<RowAddress, u32>,
    total_doc_length: u64,
    doc_count: u64,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(documents: impl IntoIterator<Item = (RowAddress, String)>, config: &TokenizerConfig) -> Self {
        let mut index = Self::new();
        let mut tokenizer = FrameTokenizer::new(config);
        for (row, text) in documents {
            let tokens = tokenizer.tokenize(&text);
            index.add_document(row, &tokens.into_iter().map(|(t, _)| t).collect::<Vec<_>>());
        }
        index
    }

    pub fn add_document(&mut self, row: RowAddress, terms: &[String]) {
        let length = terms.len() as u32;
        self.doc_lengths.insert(row, length);
        self.total_doc_length += length as u64;
        self.doc_count += 1;

        let mut counts: HashMap<&str, u32> = HashMap::new();
        for term in terms {
            *counts.entry(term.as_str()).or_insert(0) += 1;
        }
        for (term, term_freq) in counts {
            self.postings
                .entry(term.to_string())
                .or_default()
                .insert(row, Posting { term_freq });
        }
    }

    fn avg_doc_length(&self) -> f32 {
        if self.doc_count == 0 {
            0.0
        } else {
            self.total_doc_length as f32 / self.doc_count as f32
        }
    }

    /// Inverse document frequency, Robertson-Sparck-Jones form with the
    /// `+1` smoothing term so a word appearing in every document still
    /// gets a small positive weight.
    fn idf(&self, term: &str) -> f32 {
        let n = self.doc_count as f32;
        let df = self.postings.get(term).map(|p| p.len()).unwrap_or(0) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn score_term(&self, term: &str, row: RowAddress) -> f32 {
        let Some(postings) = self.postings.get(term) else { return 0.0 };
        let Some(posting) = postings.get(&row) else { return 0.0 };
        let doc_len = *self.doc_lengths.get(&row).unwrap_or(&0) as f32;
        let avg_len = self.avg_doc_length().max(1.0);
        let tf = posting.term_freq as f32;

        let numerator = tf * (K1 + 1.0);
        let denominator = tf + K1 * (1.0 - B + B * doc_len / avg_len);
        self.idf(term) * numerator / denominator
    }

    /// Score and rank all documents matching any of `query_terms`,
    /// descending by BM25 score (§4.6 full-text search).
    pub fn search(&self, query_terms: &[String], limit: usize) -> Vec<(RowAddress, f32)> {
        let mut scores: HashMap<RowAddress, f32> = HashMap::new();
        for term in query_terms {
            let Some(postings) = self.postings.get(term) else { continue };
            for &row in postings.keys() {
                *scores.entry(row).or_insert(0.0) += self.score_term(term, row);
            }
        }
        let mut ranked: Vec<(RowAddress, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
    }

    pub fn search_text(&self, query: &str, config: &TokenizerConfig, limit: usize) -> Vec<(RowAddress, f32)> {
        let mut tokenizer = FrameTokenizer::new(config);
        let terms: Vec<String> = tokenizer.tokenize(query).into_iter().map(|(t, _)| t).collect();
        self.search(&terms, limit)
    }

    pub fn document_count(&self) -> u64 {
        self.doc_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TokenizerConfig {
        TokenizerConfig::default()
    }

    #[test]
    fn search_ranks_more_relevant_documents_first() {
        let docs = vec![
            (RowAddress::new(0, 1), "rust programming language".to_string()),
            (RowAddress::new(0, 2), "rust rust rust systems programming".to_string()),
            (RowAddress::new(0, 3), "cooking recipes".to_string()),
        ];
        let index = InvertedIndex::build(docs, &config());
        let results = index.search_text("rust programming", &config(), 10);
        assert!(!results.is_empty());
        assert_eq!(results[0].0, RowAddress::new(0, 2));
        assert!(results.iter().all(|(row, _)| *row != RowAddress::new(0, 3)));
    }

    #[test]
    fn unknown_terms_yield_empty_results() {
        let docs = vec![(RowAddress::new(0, 1), "alpha beta".to_string())];
        let index = InvertedIndex::build(docs, &config());
        let results = index.search_text("zzz nonexistent", &config(), 10);
        assert!(results.is_empty());
    }
}
