// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! An n-gram index accelerating `LIKE '%substr%'` predicates over a
//! utf8 field (§4.6): every row contributes the set of its trigrams,
//! and a query intersects the postings of the query string's own
//! trigrams before falling back to an exact substring check on the
//! surviving candidates (n-gram membership is necessary, not
//! sufficient, for a substring match).

use std::collections::HashMap;

use roaring::RoaringTreemap;

use crate::vector::RowAddress;

fn row_to_u64(row: RowAddress) -> u64 {
    (row.fragment_id << 32) | row.offset as u64
}

fn u64_to_row(packed: u64) -> RowAddress {
    RowAddress::new(packed >> 32, packed as u32)
}

const N: usize = 3;

fn ngrams(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.to_lowercase().chars().collect();
    if chars.len() < N {
        return vec![chars.into_iter().collect()];
    }
    chars.windows(N).map(|w| w.iter().collect()).collect()
}

#[derive(Debug, Default)]
pub struct NgramIndex {
    postings: HashMap<String, RoaringTreemap>,
    /// Retained so substring candidates can be verified exactly; an
    /// n-gram match alone can be a false positive (e.g. query
    /// "abcabc" against document "cabcab").
    values: HashMap<u64, String>,
}

impl NgramIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(pairs: impl IntoIterator<Item = (String, RowAddress)>) -> Self {
        let mut index = Self::new();
        for (value, row) in pairs {
            index.insert(&value, row);
        }
        index
    }

    pub fn insert(&mut self, value: &str, row: RowAddress) {
        let packed = row_to_u64(row);
        for gram in ngrams(value) {
            self.postings.entry(gram).or_default().insert(packed);
        }
        self.values.insert(packed, value.to_lowercase());
    }

    /// Rows whose indexed field contains `needle` as a substring.
    pub fn contains_substring(&self, needle: &str) -> Vec<RowAddress> {
        let needle = needle.to_lowercase();
        if needle.is_empty() {
            return self.values.keys().map(|&p| u64_to_row(p)).collect();
        }

        let grams = ngrams(&needle);
        let mut candidates: Option<RoaringTreemap> = None;
        for gram in &grams {
            let Some(bitmap) = self.postings.get(gram) else {
                return Vec::new();
            };
            candidates = Some(match candidates {
                Some(mut acc) => {
                    acc &= bitmap;
                    acc
                }
                None => bitmap.clone(),
            });
        }

        candidates
            .unwrap_or_default()
            .iter()
            .filter(|&packed| {
                self.values
                    .get(&packed)
                    .map(|v| v.contains(&needle))
                    .unwrap_or(false)
            })
            .map(u64_to_row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_substring_matches() {
        let mut index = NgramIndex::new();
        index.insert("the quick brown fox", RowAddress::new(0, 1));
        index.insert("lazy dog sleeps", RowAddress::new(0, 2));

        let hits = index.contains_substring("quick");
        assert_eq!(hits, vec![RowAddress::new(0, 1)]);
    }

    #[test]
    fn rejects_ngram_false_positives_via_exact_check() {
        let mut index = NgramIndex::new();
        index.insert("abcabc", RowAddress::new(0, 1));
        // Shares trigrams with "abcabc" but is not a substring match.
        let hits = index.contains_substring("cabcabc");
        assert!(hits.is_empty());
    }
}
