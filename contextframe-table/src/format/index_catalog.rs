// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Index catalog entries (§4.3, §6.3): the manifest-level bookkeeping for
//! a named index -- which column/kind/params it was built with, which
//! files it owns, and which fragments it is valid for. The index
//! implementations themselves live in `contextframe-index`; this type is
//! the pure serializable metadata that ties an index to a dataset
//! snapshot.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The index kind, spanning both the vector-index family (C5) and the
/// scalar/FTS family (C6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    IvfPq,
    IvfHnsw,
    IvfHnswPq,
    IvfHnswSq,
    BTree,
    Bitmap,
    LabelList,
    Ngram,
    Fts,
}

impl IndexKind {
    pub fn is_vector(&self) -> bool {
        matches!(
            self,
            Self::IvfPq | Self::IvfHnsw | Self::IvfHnswPq | Self::IvfHnswSq
        )
    }

    pub fn is_scalar(&self) -> bool {
        !self.is_vector()
    }
}

/// One delta segment accumulated since the index was last merged
/// (§4.6: "the index is extended (delta segment) and later merged by
/// maintenance").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaSegment {
    pub file: String,
    pub fragment_ids: Vec<u64>,
}

/// A named index's catalog entry, as recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexCatalogEntry {
    pub name: String,
    pub kind: IndexKind,
    pub column: String,
    pub params: HashMap<String, String>,
    pub files: Vec<String>,
    pub deltas: Vec<DeltaSegment>,
    /// The fragments this index currently covers. Compaction rewriting
    /// any of these invalidates the index until rebuilt (§4.5, §4.9).
    pub valid_for_fragments: Vec<u64>,
    pub built_at_version: u64,
}

impl IndexCatalogEntry {
    pub fn new(
        name: impl Into<String>,
        kind: IndexKind,
        column: impl Into<String>,
        built_at_version: u64,
        valid_for_fragments: Vec<u64>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            column: column.into(),
            params: HashMap::new(),
            files: Vec::new(),
            deltas: Vec::new(),
            valid_for_fragments,
            built_at_version,
        }
    }

    /// True iff every fragment this index references is still present in
    /// `current_fragment_ids` (§4.5: "An index is marked invalid when any
    /// referenced fragment is removed").
    pub fn is_valid_for(&self, current_fragment_ids: &[u64]) -> bool {
        self.valid_for_fragments
            .iter()
            .all(|id| current_fragment_ids.contains(id))
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_when_referenced_fragment_missing() {
        let entry = IndexCatalogEntry::new("idx", IndexKind::IvfPq, "vector", 1, vec![0, 1]);
        assert!(entry.is_valid_for(&[0, 1, 2]));
        assert!(!entry.is_valid_for(&[0, 2]));
    }

    #[test]
    fn vector_vs_scalar_classification() {
        assert!(IndexKind::IvfHnsw.is_vector());
        assert!(IndexKind::Fts.is_scalar());
        assert!(IndexKind::Bitmap.is_scalar());
    }
}
