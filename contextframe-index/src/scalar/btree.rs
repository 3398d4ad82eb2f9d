// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! A sorted scalar index over one field: supports equality and range
//! predicates with `O(log n + |matches|)` lookups (§4.6).

use std::collections::BTreeMap;

use contextframe_core::datatype::Value;
use roaring::RoaringTreemap;

use crate::vector::RowAddress;

fn row_to_u64(row: RowAddress) -> u64 {
    (row.fragment_id << 32) | row.offset as u64
}

fn u64_to_row(packed: u64) -> RowAddress {
    RowAddress::new(packed >> 32, packed as u32)
}

/// Total-ordering wrapper over `Value` so it can key a `BTreeMap`.
/// Mixed-type comparisons order by `type_name` first; this only
/// matters when a field legitimately holds heterogeneous values, which
/// the schema registry otherwise prevents.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
struct OrderedValue(Value);

impl Eq for OrderedValue {}
impl Ord for OrderedValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (&self.0, &other.0) {
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            (Value::Utf8(a), Value::Utf8(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Decimal(a), Value::Decimal(b)) => a.cmp(b),
            (Value::Float32(a), Value::Float32(b)) => a.total_cmp(b),
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            _ => self.0.type_name().cmp(other.0.type_name()),
        }
    }
}

#[derive(Debug, Default)]
pub struct BTreeIndex {
    entries: BTreeMap<OrderedValue, RoaringTreemap>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(pairs: impl IntoIterator<Item = (Value, RowAddress)>) -> Self {
        let mut index = Self::new();
        for (value, row) in pairs {
            index.insert(value, row);
        }
        index
    }

    pub fn insert(&mut self, value: Value, row: RowAddress) {
        self.entries
            .entry(OrderedValue(value))
            .or_default()
            .insert(row_to_u64(row));
    }

    pub fn equals(&self, value: &Value) -> RoaringTreemap {
        self.entries
            .get(&OrderedValue(value.clone()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn range(
        &self,
        lower: Option<&Value>,
        upper: Option<&Value>,
        lower_inclusive: bool,
        upper_inclusive: bool,
    ) -> RoaringTreemap {
        let mut result = RoaringTreemap::new();
        for (key, bitmap) in self.entries.iter() {
            if let Some(l) = lower {
                let cmp = key.0.partial_cmp(l);
                let ok = match cmp {
                    Some(std::cmp::Ordering::Greater) => true,
                    Some(std::cmp::Ordering::Equal) => lower_inclusive,
                    _ => false,
                };
                if !ok {
                    continue;
                }
            }
            if let Some(u) = upper {
                let cmp = key.0.partial_cmp(u);
                let ok = match cmp {
                    Some(std::cmp::Ordering::Less) => true,
                    Some(std::cmp::Ordering::Equal) => upper_inclusive,
                    _ => false,
                };
                if !ok {
                    continue;
                }
            }
            result |= bitmap;
        }
        result
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|b| b.len() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Helper to decode the packed row ids a bitmap search returns back
/// into `RowAddress`es.
pub fn rows_from_bitmap(bitmap: &RoaringTreemap) -> Vec<RowAddress> {
    bitmap.iter().map(u64_to_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_lookup_returns_matching_rows() {
        let mut index = BTreeIndex::new();
        index.insert(Value::Int64(5), RowAddress::new(0, 1));
        index.insert(Value::Int64(7), RowAddress::new(0, 2));
        index.insert(Value::Int64(5), RowAddress::new(0, 3));

        let matches = index.equals(&Value::Int64(5));
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn range_query_is_inclusive_exclusive_as_requested() {
        let mut index = BTreeIndex::new();
        for i in 0..10 {
            index.insert(Value::Int64(i), RowAddress::new(0, i as u32));
        }
        let inclusive = index.range(Some(&Value::Int64(3)), Some(&Value::Int64(6)), true, true);
        assert_eq!(inclusive.len(), 4);
        let exclusive = index.range(Some(&Value::Int64(3)), Some(&Value::Int64(6)), false, false);
        assert_eq!(exclusive.len(), 2);
    }
}
