// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! A label-list index: each row contributes zero or more labels (a
//! `Value::List` of utf8), and the index answers "rows containing
//! label L" and "rows containing all of labels L1..Ln" (§4.6, used for
//! tag-style fields).

use std::collections::HashMap;

use contextframe_core::datatype::Value;
use roaring::RoaringTreemap;

use crate::vector::RowAddress;

fn row_to_u64(row: RowAddress) -> u64 {
    (row.fragment_id << 32) | row.offset as u64
}

fn u64_to_row(packed: u64) -> RowAddress {
    RowAddress::new(packed >> 32, packed as u32)
}

#[derive(Debug, Default)]
pub struct LabelListIndex {
    postings: HashMap<String, RoaringTreemap>,
}

impl LabelListIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(pairs: impl IntoIterator<Item = (Value, RowAddress)>) -> Self {
        let mut index = Self::new();
        for (value, row) in pairs {
            index.insert(&value, row);
        }
        index
    }

    /// `value` is expected to be a `Value::List` of `Value::Utf8`
    /// labels; any other shape is a no-op, matching the bitmap index's
    /// convention of silently excluding values it wasn't built for.
    pub fn insert(&mut self, value: &Value, row: RowAddress) {
        let Value::List(items) = value else { return };
        for item in items {
            if let Value::Utf8(label) = item {
                self.postings
                    .entry(label.clone())
                    .or_default()
                    .insert(row_to_u64(row));
            }
        }
    }

    pub fn contains(&self, label: &str) -> Vec<RowAddress> {
        self.postings
            .get(label)
            .map(|b| b.iter().map(u64_to_row).collect())
            .unwrap_or_default()
    }

    pub fn contains_any(&self, labels: &[String]) -> Vec<RowAddress> {
        let mut union = RoaringTreemap::new();
        for label in labels {
            if let Some(bitmap) = self.postings.get(label) {
                union |= bitmap;
            }
        }
        union.iter().map(u64_to_row).collect()
    }

    pub fn contains_all(&self, labels: &[String]) -> Vec<RowAddress> {
        let mut iter = labels.iter();
        let Some(first) = iter.next() else { return Vec::new() };
        let Some(mut intersection) = self.postings.get(first).cloned() else {
            return Vec::new();
        };
        for label in iter {
            match self.postings.get(label) {
                Some(bitmap) => intersection &= bitmap,
                None => return Vec::new(),
            }
        }
        intersection.iter().map(u64_to_row).collect()
    }

    pub fn distinct_label_count(&self) -> usize {
        self.postings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(words: &[&str]) -> Value {
        Value::List(words.iter().map(|w| Value::Utf8(w.to_string())).collect())
    }

    #[test]
    fn contains_all_intersects_postings() {
        let mut index = LabelListIndex::new();
        index.insert(&labels(&["rust", "async"]), RowAddress::new(0, 1));
        index.insert(&labels(&["rust"]), RowAddress::new(0, 2));
        index.insert(&labels(&["rust", "async"]), RowAddress::new(0, 3));

        let both = index.contains_all(&["rust".to_string(), "async".to_string()]);
        assert_eq!(both.len(), 2);
    }

    #[test]
    fn contains_any_unions_postings() {
        let mut index = LabelListIndex::new();
        index.insert(&labels(&["a"]), RowAddress::new(0, 1));
        index.insert(&labels(&["b"]), RowAddress::new(0, 2));
        let any = index.contains_any(&["a".to_string(), "b".to_string()]);
        assert_eq!(any.len(), 2);
    }
}
