// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Maintenance operations (C9, §4.9): background housekeeping a dataset
//! owner runs periodically rather than on every write -- compacting
//! small/tombstoned fragments, reclaiming storage for versions nobody
//! needs anymore, folding unmerged vector-index deltas back into the
//! trained index, and auditing relationship referential integrity.
//!
//! None of these run implicitly. A caller invokes them explicitly
//! (typically from a cron job or an admin command), and each returns a
//! report describing what it actually did.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use contextframe_core::datatype::Value;
use contextframe_core::error::{Error, Result};
use contextframe_index::vector::{RowAddress, VectorIndex};
use contextframe_table::format::{IndexCatalogEntry, Manifest};
use uuid::Uuid;

use crate::dataset::store::{core_field_ids, FragmentReader, FragmentWriter};
use crate::dataset::{manifest_path, FrameDataset, DELETIONS_DIR};
use crate::transaction::TransactionOp;
use crate::RelationshipTarget;

/// What `compact` did (§4.9: "merges small fragments, rewrites
/// tombstoned rows out of existence").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionReport {
    pub fragments_before: usize,
    pub fragments_after: usize,
    pub rows_rewritten: u64,
}

/// Which committed versions `cleanup_old_versions` is allowed to
/// reclaim. The latest version and every tagged version are always
/// kept regardless of the selector (§8 boundary behavior).
#[derive(Debug, Clone)]
pub enum VersionCleanupSelector {
    /// Keep the `n` most recent versions (at least 1).
    KeepLast(usize),
    /// Keep every version created at or after this ISO-8601 timestamp.
    OlderThan(String),
}

/// What `cleanup_old_versions` reclaimed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub versions_removed: Vec<u64>,
    pub fragment_files_removed: usize,
    pub blob_files_removed: usize,
    pub deletion_files_removed: usize,
    pub index_files_removed: usize,
}

/// One dangling relationship found by `validate_relationships`: a
/// record whose relationship targets a uuid that no longer resolves to
/// any live row (§4.8, §9 Open Question -- referential integrity is
/// audited, not enforced).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DanglingRelationship {
    pub source_uuid: Uuid,
    pub relationship_index: usize,
    pub target_uuid: Uuid,
}

impl FrameDataset {
    /// Rewrite small and/or tombstoned fragments into `target_rows_per_fragment`-sized
    /// fragments (§4.9). Fragments that already meet the target and carry
    /// no deletions are left untouched, so indices that reference only
    /// those fragments stay valid (§4.5).
    pub async fn compact(&self, target_rows_per_fragment: u64) -> Result<CompactionReport> {
        let target = target_rows_per_fragment.max(1);
        let op = TransactionOp::Compact;
        let store = Arc::clone(&self.store);
        let root = self.root.clone();
        let fragments_before = Arc::new(AtomicUsize::new(0));
        let fragments_after = Arc::new(AtomicUsize::new(0));
        let rows_rewritten = Arc::new(AtomicU64::new(0));
        let fragments_before_build = Arc::clone(&fragments_before);
        let fragments_after_build = Arc::clone(&fragments_after);
        let rows_rewritten_build = Arc::clone(&rows_rewritten);

        self.commit_loop(&op, move |base| {
            let store = Arc::clone(&store);
            let root = root.clone();
            let fragments_before = Arc::clone(&fragments_before_build);
            let fragments_after = Arc::clone(&fragments_after_build);
            let rows_rewritten = Arc::clone(&rows_rewritten_build);
            async move {
                fragments_before.store(base.fragments.len(), Ordering::SeqCst);
                let schema = base.schema.clone();
                let field_ids: HashSet<i32> = schema.field_ids().into_iter().collect();

                let mut keep = Vec::new();
                let mut to_merge = Vec::new();
                for fragment in &base.fragments {
                    if fragment.num_rows < target || fragment.deletion_vector.is_some() {
                        to_merge.push(fragment.clone());
                    } else {
                        keep.push(fragment.clone());
                    }
                }

                if to_merge.is_empty() {
                    fragments_after.store(keep.len(), Ordering::SeqCst);
                    return Ok((base.fragments.clone(), base.indices.clone(), "compact (nothing to do)".to_string()));
                }

                let mut live_records = Vec::new();
                for fragment in &to_merge {
                    let rows = FragmentReader::read(&store, fragment, &schema, &field_ids, false).await?;
                    live_records.extend(rows.into_iter().map(|(_, record)| record));
                }
                rows_rewritten.store(live_records.len() as u64, Ordering::SeqCst);

                let mut next_id = base.next_fragment_id();
                let mut rewritten = Vec::new();
                for chunk in live_records.chunks(target as usize) {
                    let fragment = FragmentWriter::write(&store, &root, next_id, chunk, &schema).await?;
                    rewritten.push(fragment);
                    next_id += 1;
                }

                let mut fragments = keep;
                fragments.extend(rewritten);
                fragments.sort_by_key(|f| f.id);
                fragments_after.store(fragments.len(), Ordering::SeqCst);

                // Indices that referenced a rewritten fragment are now
                // stale; `IndexCatalogEntry::is_valid_for` will refuse to
                // load them until `create_*_index`/`merge_index_deltas`
                // rebuilds against the new fragment ids (§4.5).
                Ok((fragments, base.indices.clone(), "compact".to_string()))
            }
        })
        .await?;
        self.invalidate_scalar_fts_caches();
        Ok(CompactionReport {
            fragments_before: fragments_before.load(Ordering::SeqCst),
            fragments_after: fragments_after.load(Ordering::SeqCst),
            rows_rewritten: rows_rewritten.load(Ordering::SeqCst),
        })
    }

    /// Reclaim manifests and now-unreferenced fragment/blob/deletion/index
    /// files for versions `selector` does not keep (§4.9). The latest
    /// version and every tagged version are never removed.
    pub async fn cleanup_old_versions(&self, selector: VersionCleanupSelector) -> Result<CleanupReport> {
        let latest = Self::latest_version(&self.store, &self.root).await?;
        let mut manifests = Vec::new();
        for v in 0..=latest {
            if let Ok(m) = Self::load_manifest(&self.store, &self.root, v).await {
                manifests.push(m);
            }
        }

        let tagged: HashSet<u64> = self.list_tags().await?.into_iter().map(|t| t.version).collect();

        let mut keep: HashSet<u64> = match &selector {
            VersionCleanupSelector::KeepLast(n) => {
                let mut versions: Vec<u64> = manifests.iter().map(|m| m.version).collect();
                versions.sort_unstable_by(|a, b| b.cmp(a));
                versions.into_iter().take((*n).max(1)).collect()
            }
            VersionCleanupSelector::OlderThan(threshold) => {
                let cutoff = contextframe_core::time::parse_iso8601(threshold).map_err(Error::invalid_filter)?;
                manifests
                    .iter()
                    .filter_map(|m| {
                        let created = contextframe_core::time::parse_iso8601(&m.created_at).ok()?;
                        (created >= cutoff).then_some(m.version)
                    })
                    .collect()
            }
        };
        keep.insert(latest);
        keep.extend(tagged.iter().copied());

        let removable: Vec<u64> = manifests.iter().map(|m| m.version).filter(|v| !keep.contains(v)).collect();
        let removable_set: HashSet<u64> = removable.iter().copied().collect();

        for version in &removable {
            self.store.delete(&manifest_path(&self.root, *version)).await?;
        }

        let surviving: Vec<&Manifest> = manifests.iter().filter(|m| !removable_set.contains(&m.version)).collect();
        let mut live_fragment_files = HashSet::new();
        let mut live_blob_files = HashSet::new();
        let mut live_deletion_files = HashSet::new();
        let mut live_index_files = HashSet::new();
        for manifest in &surviving {
            for fragment in &manifest.fragments {
                for file in &fragment.files {
                    live_fragment_files.insert(file.path.clone());
                }
                if let Some(blob) = &fragment.blob_ref {
                    live_blob_files.insert(blob.path.clone());
                }
                if let Some(dv) = &fragment.deletion_vector {
                    live_deletion_files.insert(dv.path.clone());
                }
            }
            for entry in &manifest.indices {
                live_index_files.extend(entry.files.iter().cloned());
                live_index_files.extend(entry.deltas.iter().map(|d| d.file.clone()));
            }
        }

        let fragment_files_removed =
            self.delete_unreferenced(&self.root.child("fragments"), &live_fragment_files).await?;
        let blob_files_removed = self.delete_unreferenced(&self.root.child("blobs"), &live_blob_files).await?;
        let deletion_files_removed =
            self.delete_unreferenced(&self.root.child(DELETIONS_DIR), &live_deletion_files).await?;
        let index_files_removed = self.delete_unreferenced(&self.root.child("indices"), &live_index_files).await?;

        {
            let mut archive = self.archive().lock().await;
            archive.mark_cleaned_up(&removable_set);
            archive.flush().await?;
        }

        Ok(CleanupReport {
            versions_removed: removable,
            fragment_files_removed,
            blob_files_removed,
            deletion_files_removed,
            index_files_removed,
        })
    }

    async fn delete_unreferenced(&self, prefix: &object_store::path::Path, live: &HashSet<String>) -> Result<usize> {
        let mut removed = 0;
        for path in self.store.list_prefix(prefix).await? {
            if !live.contains(&path.to_string()) {
                self.store.delete(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Fold every unmerged delta segment of a vector index back into its
    /// trained partitions (§4.6: "the index is extended (delta segment)
    /// and later merged by maintenance"). This implementation retrains
    /// the whole index over `valid_for_fragments` plus the delta
    /// fragments using the index's existing parameters, rather than
    /// incrementally inserting into the trained structure -- a
    /// deliberate simplification recorded in `DESIGN.md` given IVF
    /// partition assignment is not cheaply incremental for PQ codebooks.
    pub async fn merge_index_deltas(&self, index_name: &str) -> Result<()> {
        let existing = self.ensure_vector_index_loaded(index_name).await?;
        let params = existing.params().clone();

        let manifest = self.current_manifest().await;
        let entry = manifest
            .indices
            .iter()
            .find(|e| e.name == index_name)
            .ok_or_else(|| Error::not_found(format!("no such index: {index_name}")))?
            .clone();
        if entry.deltas.is_empty() {
            return Ok(());
        }

        let column = entry.column.clone();
        let schema = manifest.schema.clone();
        let field = schema
            .field_by_name(&column)
            .ok_or_else(|| Error::not_found(format!("no such column: {column}")))?;
        let mut field_ids = core_field_ids(&schema);
        field_ids.insert(field.id);

        let mut delta_fragment_ids: HashSet<u64> = HashSet::new();
        for delta in &entry.deltas {
            delta_fragment_ids.extend(delta.fragment_ids.iter().copied());
        }
        let covered: HashSet<u64> =
            entry.valid_for_fragments.iter().copied().chain(delta_fragment_ids.iter().copied()).collect();

        let mut vectors: Vec<(RowAddress, Vec<f32>)> = Vec::new();
        let mut covered_ids = Vec::new();
        for fragment in &manifest.fragments {
            if !covered.contains(&fragment.id) {
                continue;
            }
            covered_ids.push(fragment.id);
            let rows = FragmentReader::read(&self.store, fragment, &schema, &field_ids, false).await?;
            for (addr, record) in rows {
                let value = crate::dataset::store::record_column_value(&record, &schema, &column);
                if let Value::List(items) = value {
                    let vector: Option<Vec<f32>> = items
                        .into_iter()
                        .map(|item| match item {
                            Value::Float32(f) => Some(f),
                            _ => None,
                        })
                        .collect();
                    if let Some(vector) = vector {
                        vectors.push((addr, vector));
                    }
                }
            }
        }
        if vectors.is_empty() {
            return Err(Error::validation(format!("no vectors found in column {column} to index"), Vec::new()));
        }

        let index = VectorIndex::train(&vectors, params)?;
        let bytes = index.to_bytes()?;
        let store = Arc::clone(&self.store);
        let root = self.root.clone();
        let name = index_name.to_string();
        let kind = entry.kind;

        let op = TransactionOp::MergeIndexDeltas { name: name.clone() };
        self.commit_loop(&op, move |base| {
            let store = Arc::clone(&store);
            let root = root.clone();
            let name = name.clone();
            let column = column.clone();
            let bytes = bytes.clone();
            let covered_ids = covered_ids.clone();
            async move {
                let path = root.child("indices").child(&name).child("vector.bin");
                store.put(&path, bytes).await?;
                let mut rebuilt =
                    IndexCatalogEntry::new(name.as_str(), kind, column.as_str(), base.version + 1, covered_ids);
                rebuilt.files = vec![path.to_string()];
                let mut indices: Vec<_> = base.indices.into_iter().filter(|e| e.name != name).collect();
                indices.push(rebuilt);
                Ok((base.fragments, indices, format!("merge_index_deltas {name}")))
            }
        })
        .await?;
        self.vector_indices.remove(index_name);
        Ok(())
    }

    /// Scan every live record's relationships and report any whose
    /// target is a uuid that no record in the current snapshot carries
    /// (§4.8). Referential integrity is audited, not enforced: deleting
    /// a record never cascades to or blocks relationships pointing at
    /// it (§9 Open Question).
    pub async fn validate_relationships(&self) -> Result<Vec<DanglingRelationship>> {
        let manifest = self.current_manifest().await;
        let schema = &manifest.schema;
        let field_ids: HashSet<i32> = schema.field_ids().into_iter().collect();

        let mut live_uuids = HashSet::new();
        let mut all_records = Vec::new();
        for fragment in &manifest.fragments {
            let rows = FragmentReader::read(&self.store, fragment, schema, &field_ids, false).await?;
            for (_, record) in rows {
                live_uuids.insert(record.uuid);
                all_records.push(record);
            }
        }

        let mut dangling = Vec::new();
        for record in &all_records {
            for (index, relationship) in record.relationships.iter().enumerate() {
                if let RelationshipTarget::Uuid(target) = &relationship.target {
                    if !live_uuids.contains(target) {
                        dangling.push(DanglingRelationship {
                            source_uuid: record.uuid,
                            relationship_index: index,
                            target_uuid: *target,
                        });
                    }
                }
            }
        }
        Ok(dangling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RecordBuilder, Relationship, RelationshipType};
    use contextframe_index::vector::VectorIndexParams;

    async fn dataset_with_rows(dir: &std::path::Path, n: i64) -> FrameDataset {
        let ds = FrameDataset::create(dir.to_str().unwrap(), 2).await.unwrap();
        let schema = ds.schema().await;
        for i in 0..n {
            let record = RecordBuilder::new(format!("doc-{i}"))
                .vector(vec![i as f32, 0.0])
                .build(&schema)
                .unwrap();
            ds.add(record).await.unwrap();
        }
        ds
    }

    #[tokio::test]
    async fn compact_merges_undersized_fragments() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dataset_with_rows(dir.path(), 5).await;
        assert_eq!(ds.current_manifest().await.fragments.len(), 5);

        let report = ds.compact(10).await.unwrap();
        assert_eq!(report.fragments_before, 5);
        assert_eq!(report.fragments_after, 1);
        assert_eq!(report.rows_rewritten, 5);
        assert_eq!(ds.current_manifest().await.total_rows(), 5);
    }

    #[tokio::test]
    async fn compact_leaves_right_sized_fragments_alone() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dataset_with_rows(dir.path(), 3).await;
        let report = ds.compact(1).await.unwrap();
        assert_eq!(report.fragments_before, 3);
        assert_eq!(report.fragments_after, 3);
        assert_eq!(report.rows_rewritten, 0);
    }

    #[tokio::test]
    async fn compact_drops_tombstoned_rows() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dataset_with_rows(dir.path(), 4).await;
        ds.compact(10).await.unwrap();
        let deleted = ds.delete(crate::dataset::DeleteSelector::Predicate("title = 'doc-0'".to_string())).await.unwrap();
        assert_eq!(deleted, 1);

        let report = ds.compact(10).await.unwrap();
        assert_eq!(report.rows_rewritten, 3);
        assert_eq!(ds.current_manifest().await.total_rows(), 3);
    }

    #[tokio::test]
    async fn cleanup_keep_last_preserves_latest_and_tagged() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dataset_with_rows(dir.path(), 3).await;
        ds.create_tag("v1", 1).await.unwrap();
        let latest = ds.version().await;

        let report = ds.cleanup_old_versions(VersionCleanupSelector::KeepLast(1)).await.unwrap();
        assert!(!report.versions_removed.contains(&latest));
        assert!(!report.versions_removed.contains(&1));

        assert!(manifest_still_loads(&ds, 1).await);
        assert!(manifest_still_loads(&ds, latest).await);
    }

    async fn manifest_still_loads(ds: &FrameDataset, version: u64) -> bool {
        FrameDataset::load_manifest(&ds.store, &ds.root, version).await.is_ok()
    }

    #[tokio::test]
    async fn merge_index_deltas_folds_new_rows_into_the_trained_index() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dataset_with_rows(dir.path(), 4).await;
        ds.create_vector_index("vec_idx", "vector", VectorIndexParams::default()).await.unwrap();

        let schema = ds.schema().await;
        let record = RecordBuilder::new("doc-4").vector(vec![4.0, 0.0]).build(&schema).unwrap();
        ds.add(record).await.unwrap();

        let before = ds.current_manifest().await.indices[0].clone();
        assert!(!before.deltas.is_empty());

        ds.merge_index_deltas("vec_idx").await.unwrap();
        let after = ds.current_manifest().await.indices[0].clone();
        assert!(after.deltas.is_empty());
        assert_eq!(after.valid_for_fragments.len(), ds.current_manifest().await.fragments.len());
    }

    #[tokio::test]
    async fn validate_relationships_reports_dangling_targets() {
        let dir = tempfile::tempdir().unwrap();
        let ds = FrameDataset::create(dir.path().to_str().unwrap(), 2).await.unwrap();
        let schema = ds.schema().await;
        let ghost = Uuid::new_v4();
        let record = RecordBuilder::new("doc-0")
            .vector(vec![0.0, 0.0])
            .relationship(Relationship {
                kind: RelationshipType::Reference,
                target: RelationshipTarget::Uuid(ghost),
                title: None,
                description: None,
            })
            .build(&schema)
            .unwrap();
        ds.add(record).await.unwrap();

        let dangling = ds.validate_relationships().await.unwrap();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].target_uuid, ghost);
    }
}
