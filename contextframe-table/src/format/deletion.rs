// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Deletion vectors (§4.3): a compressed bitmap of row indices within one
//! fragment that are tombstoned at a given version. Deletions are
//! additive across versions.

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

/// A reference to the deletion-vector file for one fragment, as recorded
/// in the manifest. `None` means the fragment has no tombstoned rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionVectorRef {
    pub path: String,
    /// The version at which this deletion-vector file was written. Used
    /// to reconcile deltas: version `V_k`'s effective deletion is the
    /// union of all dv updates with version <= k.
    pub written_at_version: u64,
    pub cardinality: u64,
}

/// An in-memory deletion vector: tombstoned row offsets within one
/// fragment, backed by a Roaring bitmap for compact storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionVector {
    bitmap: RoaringBitmap,
}

impl DeletionVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_indices(indices: impl IntoIterator<Item = u32>) -> Self {
        Self {
            bitmap: indices.into_iter().collect(),
        }
    }

    pub fn contains(&self, row_offset: u32) -> bool {
        self.bitmap.contains(row_offset)
    }

    pub fn insert(&mut self, row_offset: u32) -> bool {
        self.bitmap.insert(row_offset)
    }

    pub fn len(&self) -> u64 {
        self.bitmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmap.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.bitmap.iter()
    }

    /// Union this deletion vector with another, used to reconcile
    /// per-version dv deltas into one effective mask.
    pub fn union_with(&mut self, other: &Self) {
        self.bitmap |= &other.bitmap;
    }

    pub fn serialize(&self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.bitmap.serialize_into(&mut buf)?;
        Ok(buf)
    }

    pub fn deserialize(bytes: &[u8]) -> std::io::Result<Self> {
        let bitmap = RoaringBitmap::deserialize_from(bytes)?;
        Ok(Self { bitmap })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_is_additive() {
        let mut a = DeletionVector::from_indices([1, 2, 3]);
        let b = DeletionVector::from_indices([3, 4]);
        a.union_with(&b);
        assert_eq!(a.len(), 4);
        assert!(a.contains(1));
        assert!(a.contains(4));
    }

    #[test]
    fn serialize_roundtrip() {
        let dv = DeletionVector::from_indices([5, 10, 15]);
        let bytes = dv.serialize().unwrap();
        let back = DeletionVector::deserialize(&bytes).unwrap();
        assert_eq!(dv, back);
    }
}
