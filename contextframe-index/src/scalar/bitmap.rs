// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! A bitmap index over a low-cardinality field: one roaring bitmap per
//! distinct value, intended for fields like `bool` or a small enum-like
//! `utf8` column where a b-tree's per-key overhead isn't worth it
//! (§4.6).

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

/// Hashable key for `Value`s indexed by this structure. Only the value
/// kinds a bitmap index is meant for (bool, short utf8, int64) are
/// supported; anything else is rejected at build time by the caller's
/// cardinality check, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum BitmapKey {
    Bool(bool),
    Utf8(String),
    Int64(i64),
    Null,
}

fn key_of(value: &Value) -> Option<BitmapKey> {
    match value {
        Value::Bool(b) => Some(BitmapKey::Bool(*b)),
        Value::Utf8(s) => Some(BitmapKey::Utf8(s.clone())),
        Value::Int64(i) => Some(BitmapKey::Int64(*i)),
        Value::Null => Some(BitmapKey::Null),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct BitmapIndex {
    buckets: HashMap<BitmapKey, RoaringTreemap>,
}

impl BitmapIndex {
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

    pub fn insert(&mut self, value: &Value, row: RowAddress) {
        if let Some(key) = key_of(value) {
            self.buckets.entry(key).or_default().insert(row_to_u64(row));
        }
    }

    pub fn equals(&self, value: &Value) -> Vec<RowAddress> {
        key_of(value)
            .and_then(|key| self.buckets.get(&key))
            .map(|bitmap| bitmap.iter().map(u64_to_row).collect())
            .unwrap_or_default()
    }

    /// `value IN (...)`, realized as a union of per-value bitmaps.
    pub fn any_of(&self, values: &[Value]) -> Vec<RowAddress> {
        let mut union = RoaringTreemap::new();
        for v in values {
            if let Some(key) = key_of(v) {
                if let Some(bitmap) = self.buckets.get(&key) {
                    union |= bitmap;
                }
            }
        }
        union.iter().map(u64_to_row).collect()
    }

    pub fn distinct_value_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equals_and_any_of_return_matching_rows() {
        let mut index = BitmapIndex::new();
        index.insert(&Value::Bool(true), RowAddress::new(0, 1));
        index.insert(&Value::Bool(false), RowAddress::new(0, 2));
        index.insert(&Value::Bool(true), RowAddress::new(0, 3));

        assert_eq!(index.equals(&Value::Bool(true)).len(), 2);
        assert_eq!(index.any_of(&[Value::Bool(true), Value::Bool(false)]).len(), 3);
    }

    #[test]
    fn unsupported_value_kinds_are_silently_excluded() {
        let mut index = BitmapIndex::new();
        index.insert(&Value::Float32(1.0), RowAddress::new(0, 1));
        assert_eq!(index.distinct_value_count(), 0);
    }
}
