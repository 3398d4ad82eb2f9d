// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! The manifest (§4.3, §6.3): the JSON file naming one committed
//! snapshot version. Structure mirrors the teacher's `Manifest`
//! (schema snapshot, ordered fragment list, precomputed fragment
//! offsets, max-fragment-id high-water mark, writer version) but is
//! serialized as JSON rather than protobuf, per §6.3's on-disk format.

use std::collections::HashMap;

use contextframe_core::Result;
use serde::{Deserialize, Serialize};

use crate::format::fragment::{compute_fragment_offsets, Fragment};
use crate::format::index_catalog::IndexCatalogEntry;
use crate::schema::DatasetSchema;

/// The writer library/version that produced a manifest, used to gate
/// reader-compatibility checks. Distinct from the user-facing
/// `Record.version` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterVersion {
    pub library: String,
    pub version: String,
}

impl Default for WriterVersion {
    fn default() -> Self {
        Self {
            library: "contextframe".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl WriterVersion {
    pub fn semver(&self) -> Option<(u64, u64, u64)> {
        let v = semver::Version::parse(&self.version).ok()?;
        Some((v.major, v.minor, v.patch))
    }

    pub fn older_than(&self, major: u64, minor: u64, patch: u64) -> bool {
        match self.semver() {
            Some(v) => v < (major, minor, patch),
            None => false,
        }
    }
}

/// Manifest of a dataset snapshot.
///
///  * Schema
///  * Version
///  * Fragments
///  * Indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema: DatasetSchema,

    /// Monotonically increasing version number (§3.3, §5).
    pub version: u64,

    pub parent_version: Option<u64>,

    pub writer_version: WriterVersion,

    /// Fragments, stored in order and sorted by fragment id. The id
    /// sequence may have gaps after deletions/compaction.
    pub fragments: Vec<Fragment>,

    /// Precomputed row-offset prefix sums, recomputed on
    /// construction/deserialize rather than (de)serialized, since they
    /// are a pure function of `fragments`.
    #[serde(skip, default)]
    fragment_offsets: Vec<u64>,

    pub indices: Vec<IndexCatalogEntry>,

    pub created_at: String,

    pub message: String,

    /// High-water mark for fragment ids; survives fragment deletion so
    /// ids are never recycled.
    pub max_fragment_id: Option<u64>,

    /// Table-level configuration (e.g. version-archive settings).
    pub config: HashMap<String, String>,
}

impl Manifest {
    pub fn new(schema: DatasetSchema) -> Self {
        Self {
            schema,
            version: 0,
            parent_version: None,
            writer_version: WriterVersion::default(),
            fragments: Vec::new(),
            fragment_offsets: vec![0],
            indices: Vec::new(),
            created_at: contextframe_core::time::now_iso8601(),
            message: "create dataset".to_string(),
            max_fragment_id: None,
            config: HashMap::new(),
        }
    }

    /// Build the next manifest from `self`, inheriting schema/config and
    /// bumping the version. Callers supply the new fragment list and
    /// index catalog; `indices` defaults to carrying the previous
    /// manifest's catalog forward (callers invalidate/replace entries as
    /// needed for their transaction kind).
    pub fn new_from_previous(
        previous: &Self,
        fragments: Vec<Fragment>,
        message: impl Into<String>,
    ) -> Self {
        let mut manifest = Self {
            schema: previous.schema.clone(),
            version: previous.version + 1,
            parent_version: Some(previous.version),
            writer_version: WriterVersion::default(),
            fragments,
            fragment_offsets: Vec::new(),
            indices: previous.indices.clone(),
            created_at: contextframe_core::time::now_iso8601(),
            message: message.into(),
            max_fragment_id: previous.max_fragment_id,
            config: previous.config.clone(),
        };
        manifest.finalize();
        manifest
    }

    /// Recompute derived fields after mutating `fragments` directly
    /// (used by deserialization and by callers building a manifest by
    /// hand rather than through `new_from_previous`).
    pub fn finalize(&mut self) {
        self.fragment_offsets = compute_fragment_offsets(&self.fragments);
        self.update_max_fragment_id();
    }

    /// Check the current fragment list and update the high-water mark.
    /// Only moves forward, preserving ids used by now-deleted fragments.
    pub fn update_max_fragment_id(&mut self) {
        if self.fragments.is_empty() {
            return;
        }
        let max_in_fragments = self.fragments.iter().map(|f| f.id).max().unwrap();
        self.max_fragment_id = Some(match self.max_fragment_id {
            Some(current) if current >= max_in_fragments => current,
            _ => max_in_fragments,
        });
    }

    pub fn max_fragment_id(&self) -> Option<u64> {
        self.max_fragment_id
            .or_else(|| self.fragments.iter().map(|f| f.id).max())
    }

    pub fn next_fragment_id(&self) -> u64 {
        self.max_fragment_id().map(|id| id + 1).unwrap_or(0)
    }

    pub fn total_rows(&self) -> u64 {
        self.fragments.iter().map(|f| f.num_rows).sum()
    }

    pub fn fragment_offsets(&self) -> &[u64] {
        &self.fragment_offsets
    }

    /// Fragments newer than `since` (i.e. not present in it), used to
    /// compute what a transaction actually touched.
    pub fn fragments_since(&self, since: &Self) -> Result<Vec<Fragment>> {
        if since.version >= self.version {
            return Err(contextframe_core::Error::internal(format!(
                "fragments_since: given version {} is not older than manifest version {}",
                since.version, self.version
            )));
        }
        let start = since.max_fragment_id();
        Ok(self
            .fragments
            .iter()
            .filter(|f| start.map(|s| f.id > s).unwrap_or(true))
            .cloned()
            .collect())
    }

    pub fn max_field_id(&self) -> i32 {
        let schema_max = self.schema.max_field_id();
        let fragment_max = self
            .fragments
            .iter()
            .filter_map(|f| f.max_field_id())
            .max()
            .unwrap_or(-1);
        schema_max.max(fragment_max)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let mut manifest: Self = serde_json::from_slice(bytes)?;
        manifest.fragment_offsets = compute_fragment_offsets(&manifest.fragments);
        Ok(manifest)
    }

    /// A compact, flattened summary used by the version archive ledger
    /// (§4.9 supplement) so history survives manifest cleanup.
    pub fn summary(&self) -> ManifestSummary {
        ManifestSummary {
            total_fragments: self.fragments.len() as u64,
            total_data_files: self.fragments.iter().map(|f| f.files.len() as u64).sum(),
            total_deletion_files: self
                .fragments
                .iter()
                .filter(|f| f.deletion_vector.is_some())
                .count() as u64,
            total_rows: self.total_rows(),
        }
    }
}

/// Flattened manifest statistics, stored per-version in the archive
/// ledger rather than keeping full manifests around forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestSummary {
    pub total_fragments: u64,
    pub total_data_files: u64,
    pub total_deletion_files: u64,
    pub total_rows: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::fragment::DataFile;

    fn frag(id: u64, rows: u64) -> Fragment {
        Fragment::new(id, rows, vec![DataFile::new(format!("f{id}.col"), vec![0])])
    }

    #[test]
    fn new_manifest_is_version_zero() {
        let manifest = Manifest::new(DatasetSchema::new(4));
        assert_eq!(manifest.version, 0);
        assert!(manifest.parent_version.is_none());
        assert_eq!(manifest.total_rows(), 0);
    }

    #[test]
    fn new_from_previous_bumps_version_and_links_parent() {
        let v0 = Manifest::new(DatasetSchema::new(4));
        let v1 = Manifest::new_from_previous(&v0, vec![frag(0, 10)], "append");
        assert_eq!(v1.version, 1);
        assert_eq!(v1.parent_version, Some(0));
        assert_eq!(v1.total_rows(), 10);
        assert_eq!(v1.max_fragment_id(), Some(0));
    }

    #[test]
    fn max_fragment_id_survives_deletion() {
        let v0 = Manifest::new(DatasetSchema::new(4));
        let v1 = Manifest::new_from_previous(&v0, vec![frag(0, 10), frag(1, 10)], "append");
        assert_eq!(v1.max_fragment_id(), Some(1));
        // Simulate fragment 1 being dropped by compaction while keeping the watermark.
        let v2 = Manifest::new_from_previous(&v1, vec![frag(0, 10)], "compact");
        assert_eq!(v2.max_fragment_id(), Some(1));
        assert_eq!(v2.next_fragment_id(), 2);
    }

    #[test]
    fn json_roundtrip_preserves_fragment_offsets() {
        let v0 = Manifest::new(DatasetSchema::new(4));
        let v1 = Manifest::new_from_previous(&v0, vec![frag(0, 10), frag(1, 15)], "append");
        let bytes = v1.to_json().unwrap();
        let back = Manifest::from_json(&bytes).unwrap();
        assert_eq!(back.fragment_offsets(), v1.fragment_offsets());
        assert_eq!(back, v1);
    }

    #[test]
    fn fragments_since_is_empty_for_append_only_diff() {
        let v0 = Manifest::new(DatasetSchema::new(4));
        let v1 = Manifest::new_from_previous(&v0, vec![frag(0, 10)], "append");
        let v2 = Manifest::new_from_previous(&v1, vec![frag(0, 10), frag(1, 5)], "append");
        let added = v2.fragments_since(&v1).unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].id, 1);
    }
}
