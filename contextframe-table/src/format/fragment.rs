// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Fragments (§4.3): immutable horizontal slices of the dataset, stored
//! as one file per column plus an optional blob file.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::deletion::DeletionVectorRef;

/// Per-column statistics footer (§4.3): min/max, null count and an
/// optional bloom filter, enough for the planner's index-selection and
/// late-materialization heuristics without decoding the column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    pub min: Option<String>,
    pub max: Option<String>,
    pub null_count: u64,
    /// Present only when the column was built with a bloom filter
    /// (typically high-cardinality string columns used in equality
    /// predicates).
    pub bloom_filter: Option<Vec<u8>>,
}

/// A single per-column chunk file reference within a fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    pub path: String,
    /// Field ids stored in this file (normally one, but small columns
    /// may be coalesced).
    pub field_ids: Vec<i32>,
    pub statistics: HashMap<i32, ColumnStatistics>,
}

impl DataFile {
    pub fn new(path: impl Into<String>, field_ids: Vec<i32>) -> Self {
        Self {
            path: path.into(),
            field_ids,
            statistics: HashMap::new(),
        }
    }
}

/// A reference to the blob side-store file for one fragment's blob
/// column(s). The column file itself stores `(blob_id, length, offset)`
/// triples; the bytes live here. A scan of non-blob columns never
/// touches this file (§4.3 lazy-load guarantee).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobRef {
    pub path: String,
    pub total_bytes: u64,
}

/// An immutable, contiguous row-range of the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Monotonic within the dataset; ids may have gaps after deletions.
    pub id: u64,
    pub num_rows: u64,
    pub files: Vec<DataFile>,
    pub blob_ref: Option<BlobRef>,
    pub deletion_vector: Option<DeletionVectorRef>,
}

impl Fragment {
    pub fn new(id: u64, num_rows: u64, files: Vec<DataFile>) -> Self {
        Self {
            id,
            num_rows,
            files,
            blob_ref: None,
            deletion_vector: None,
        }
    }

    pub fn with_blob(mut self, blob_ref: BlobRef) -> Self {
        self.blob_ref = Some(blob_ref);
        self
    }

    pub fn with_deletion_vector(mut self, dv: DeletionVectorRef) -> Self {
        self.deletion_vector = Some(dv);
        self
    }

    pub fn field_ids(&self) -> Vec<i32> {
        self.files.iter().flat_map(|f| f.field_ids.iter().copied()).collect()
    }

    pub fn max_field_id(&self) -> Option<i32> {
        self.field_ids().into_iter().max()
    }
}

/// Precomputed row-offset prefix sums over an ordered fragment list,
/// accelerating fragment lookup by logical offset range -- the same
/// structure the teacher keeps on its manifest rather than recomputing a
/// linear scan on every `take`/offset-based read.
pub fn compute_fragment_offsets(fragments: &[Fragment]) -> Vec<u64> {
    let mut offsets = Vec::with_capacity(fragments.len() + 1);
    let mut running = 0u64;
    for fragment in fragments {
        offsets.push(running);
        running += fragment.num_rows;
    }
    offsets.push(running);
    offsets
}

/// Find the fragments overlapping a logical row-offset range, returning
/// `(starting_offset_of_fragment, fragment_index)` pairs.
pub fn fragments_by_offset_range(
    fragments: &[Fragment],
    offsets: &[u64],
    range: std::ops::Range<u64>,
) -> Vec<(u64, usize)> {
    if fragments.is_empty() {
        return Vec::new();
    }
    let start_idx = match offsets[..fragments.len()].binary_search(&range.start) {
        Ok(idx) => idx,
        Err(idx) => idx.saturating_sub(1),
    };

    let mut result = Vec::new();
    for i in start_idx..fragments.len() {
        let frag_start = offsets[i];
        let frag_end = offsets[i + 1];
        if frag_start >= range.end {
            break;
        }
        if frag_end <= range.start {
            continue;
        }
        result.push((frag_start, i));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(id: u64, rows: u64) -> Fragment {
        Fragment::new(id, rows, vec![DataFile::new(format!("f{id}.col"), vec![0])])
    }

    #[test]
    fn offsets_match_cumulative_row_counts() {
        let fragments = vec![frag(0, 10), frag(1, 15), frag(2, 20)];
        let offsets = compute_fragment_offsets(&fragments);
        assert_eq!(offsets, vec![0, 10, 25, 45]);
    }

    #[test]
    fn range_lookup_matches_overlapping_fragments() {
        let fragments = vec![frag(0, 10), frag(1, 15), frag(2, 20)];
        let offsets = compute_fragment_offsets(&fragments);

        let hits = fragments_by_offset_range(&fragments, &offsets, 5..15);
        assert_eq!(hits, vec![(0, 0), (10, 1)]);

        let hits = fragments_by_offset_range(&fragments, &offsets, 45..100);
        assert!(hits.is_empty());

        let hits = fragments_by_offset_range(&fragments, &offsets, 0..45);
        assert_eq!(hits.len(), 3);
    }
}
