// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! [`FrameDataset`]: the dataset engine's public entry point (§6.2).
//!
//! A dataset is a sequence of immutable, JSON-encoded manifests under
//! `_versions/`, each naming the committed fragment list for one
//! version (§4.3). Mutating operations build a candidate manifest
//! against an in-memory base snapshot and publish it with
//! [`FrameObjectStore::atomic_rename_or_cas`]; a race is resolved by
//! [`transaction::conflicts_with`] against every intervening manifest
//! rather than by blindly retrying (§4.4, §9 Open Question).

pub mod archive;
pub mod statistics;
pub mod store;

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use contextframe_core::cache::{CacheConfig, FrameCache};
use contextframe_core::datatype::Value;
use contextframe_core::error::{Error, Result};
use contextframe_index::fts::InvertedIndex;
use contextframe_index::vector::VectorIndex;
use contextframe_io::commit::CommitLock;
use contextframe_io::object_store::{FrameObjectStore, ObjectStoreParams};
use contextframe_table::format::deletion::{DeletionVector, DeletionVectorRef};
use contextframe_table::format::fragment::fragments_by_offset_range;
use contextframe_table::format::{DeltaSegment, Fragment, IndexCatalogEntry, Manifest};
use contextframe_table::schema::DatasetSchema;
use contextframe_table::Record;
use object_store::path::Path;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::blob::BlobHandle;
use crate::dataset::archive::{VersionArchive, VersionArchiveConfig, VersionSummary};
use crate::dataset::store::{core_field_ids, record_column_value, FragmentReader, FragmentWriter};
use crate::filter;
use crate::index::ScalarIndexState;
use crate::transaction::{self, TransactionOp};

pub(crate) const VERSIONS_DIR: &str = "_versions";
pub(crate) const TAGS_DIR: &str = "tags";
pub(crate) const DELETIONS_DIR: &str = "deletions";

pub(crate) fn manifest_path(root: &Path, version: u64) -> Path {
    root.child(VERSIONS_DIR).child(format!("{version:020}.manifest.json"))
}

/// Parameters governing how a write operation shapes new fragments
/// (§4.3). Currently only fragment sizing; the design's other write
/// knobs (index-build-on-write) are left to the maintenance layer.
#[derive(Debug, Clone)]
pub struct WriteParams {
    pub max_rows_per_fragment: u64,
}

impl Default for WriteParams {
    fn default() -> Self {
        Self { max_rows_per_fragment: 1_000_000 }
    }
}

/// Options governing how a dataset is opened (§6.2, §6.4).
#[derive(Clone)]
pub struct OpenOptions {
    pub version: Option<u64>,
    pub tag: Option<String>,
    /// Open the latest version committed at or before this ISO-8601
    /// timestamp.
    pub as_of: Option<String>,
    /// Required for backends without native atomic rename-if-absent
    /// (§6.4); unused by the local filesystem backend.
    pub commit_lock: Option<Arc<dyn CommitLock>>,
    pub cache_config: CacheConfig,
    pub version_archive: VersionArchiveConfig,
    pub max_commit_retries: usize,
    pub write_params: WriteParams,
    pub object_store_params: ObjectStoreParams,
}

impl std::fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenOptions")
            .field("version", &self.version)
            .field("tag", &self.tag)
            .field("as_of", &self.as_of)
            .field("max_commit_retries", &self.max_commit_retries)
            .field("write_params", &self.write_params)
            .finish()
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            version: None,
            tag: None,
            as_of: None,
            commit_lock: None,
            cache_config: CacheConfig::default(),
            version_archive: VersionArchiveConfig::default(),
            max_commit_retries: 10,
            write_params: WriteParams::default(),
            object_store_params: ObjectStoreParams::default(),
        }
    }
}

/// A named pointer at a version (§3.3, §6.2). Deleting the pointed-at
/// version is forbidden while the tag exists (§8 boundary behavior).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub version: u64,
}

/// One entry of `versions()` (§6.2): everything callers need without
/// paying to materialize the full manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionInfo {
    pub version: u64,
    pub created_at: String,
    pub message: String,
}

/// Which rows a `delete` call selects (§4.4, §6.2).
#[derive(Debug, Clone)]
pub enum DeleteSelector {
    Predicate(String),
    Uuids(Vec<Uuid>),
}

/// The dataset engine's public handle (§3.3, §6.2).
///
/// Mutating methods block until their commit is durable or has
/// conclusively failed (§5); they never return early with work still
/// in flight. Reads are served from the in-memory snapshot last
/// published by `open`/`checkout`/`refresh`/a successful mutation --
/// concurrent writers never change what an already-open dataset
/// handle sees until the caller asks to move forward (§8 snapshot
/// isolation).
pub struct FrameDataset {
    pub(crate) store: Arc<FrameObjectStore>,
    pub(crate) root: Path,
    pub(crate) manifest: RwLock<Manifest>,
    #[allow(dead_code)]
    pub(crate) commit_lock: Option<Arc<dyn CommitLock>>,
    pub(crate) manifest_cache: FrameCache<Manifest>,
    archive: Mutex<VersionArchive>,
    pub(crate) write_params: WriteParams,
    max_commit_retries: usize,
    pub(crate) vector_indices: dashmap::DashMap<String, Arc<VectorIndex>>,
    pub(crate) scalar_indices: dashmap::DashMap<String, Arc<ScalarIndexState>>,
    pub(crate) fts_indices: dashmap::DashMap<String, Arc<InvertedIndex>>,
}

fn resolve_store(uri: &str) -> Result<(Arc<FrameObjectStore>, Path)> {
    let path_str = uri.strip_prefix("file://").unwrap_or(uri);
    let store = FrameObjectStore::local(path_str)?;
    Ok((Arc::new(store), Path::from("")))
}

impl FrameDataset {
    /// Create a fresh, empty dataset at `uri` with a fixed `embed_dim`
    /// (§3.3, §4.2: `embed_dim` cannot change after any vector is
    /// written). Fails with [`Error::Conflict`] if a dataset already
    /// exists there.
    pub async fn create(uri: &str, embed_dim: u32) -> Result<Self> {
        Self::create_with_options(uri, embed_dim, OpenOptions::default()).await
    }

    pub async fn create_with_options(uri: &str, embed_dim: u32, options: OpenOptions) -> Result<Self> {
        let (store, root) = resolve_store(uri)?;
        let schema = DatasetSchema::new(embed_dim);
        let manifest = Manifest::new(schema);
        let path = manifest_path(&root, manifest.version);
        if !store.put_if_absent(&path, manifest.to_json()?).await? {
            return Err(Error::conflict(format!("dataset already exists at {uri}")));
        }
        let archive = VersionArchive::load_or_new(root.clone(), Arc::clone(&store), options.version_archive).await?;
        Ok(Self::assemble(store, root, manifest, archive, options))
    }

    /// Open an existing dataset at the version/tag/as-of point named by
    /// `options`, or its latest version if none is given (§6.2).
    pub async fn open(uri: &str, options: OpenOptions) -> Result<Self> {
        let (store, root) = resolve_store(uri)?;
        let version = Self::resolve_version(&store, &root, &options).await?;
        let manifest = Self::load_manifest(&store, &root, version).await?;
        let archive = VersionArchive::load_or_new(root.clone(), Arc::clone(&store), options.version_archive).await?;
        Ok(Self::assemble(store, root, manifest, archive, options))
    }

    fn assemble(
        store: Arc<FrameObjectStore>,
        root: Path,
        manifest: Manifest,
        archive: VersionArchive,
        options: OpenOptions,
    ) -> Self {
        Self {
            store,
            root,
            manifest: RwLock::new(manifest),
            commit_lock: options.commit_lock,
            manifest_cache: FrameCache::new(options.cache_config),
            archive: Mutex::new(archive),
            write_params: options.write_params,
            max_commit_retries: options.max_commit_retries.max(1),
            vector_indices: dashmap::DashMap::new(),
            scalar_indices: dashmap::DashMap::new(),
            fts_indices: dashmap::DashMap::new(),
        }
    }

    async fn resolve_version(store: &FrameObjectStore, root: &Path, options: &OpenOptions) -> Result<u64> {
        if let Some(tag) = &options.tag {
            let path = root.child(TAGS_DIR).child(format!("{tag}.json"));
            let bytes = store
                .get_all(&path)
                .await
                .map_err(|_| Error::not_found(format!("no such tag: {tag}")))?;
            let tag: Tag = serde_json::from_slice(&bytes)?;
            return Ok(tag.version);
        }
        if let Some(version) = options.version {
            return Ok(version);
        }
        if let Some(as_of) = &options.as_of {
            let target = contextframe_core::time::parse_iso8601(as_of).map_err(Error::invalid_filter)?;
            let latest = Self::latest_version(store, root).await?;
            let mut best = None;
            for v in 0..=latest {
                if let Ok(m) = Self::load_manifest(store, root, v).await {
                    if let Ok(created) = contextframe_core::time::parse_iso8601(&m.created_at) {
                        if created <= target {
                            best = Some(v);
                        }
                    }
                }
            }
            return best.ok_or_else(|| Error::not_found(format!("no version as of {as_of}")));
        }
        Self::latest_version(store, root).await
    }

    pub(crate) async fn latest_version(store: &FrameObjectStore, root: &Path) -> Result<u64> {
        let dir = root.child(VERSIONS_DIR);
        let mut max_version: Option<u64> = None;
        for path in store.list_prefix(&dir).await? {
            if let Some(filename) = path.filename() {
                if let Some(v) = filename.strip_suffix(".manifest.json").and_then(|s| s.parse::<u64>().ok()) {
                    max_version = Some(max_version.map_or(v, |m| m.max(v)));
                }
            }
        }
        max_version.ok_or_else(|| Error::not_found("dataset has no committed versions"))
    }

    pub(crate) async fn load_manifest(store: &FrameObjectStore, root: &Path, version: u64) -> Result<Manifest> {
        let path = manifest_path(root, version);
        let bytes = store
            .get_all(&path)
            .await
            .map_err(|_| Error::not_found(format!("version {version} not found (cleaned up or never existed)")))?;
        Manifest::from_json(&bytes)
    }

    pub async fn current_manifest(&self) -> Manifest {
        self.manifest.read().await.clone()
    }

    pub async fn schema(&self) -> DatasetSchema {
        self.manifest.read().await.schema.clone()
    }

    pub async fn version(&self) -> u64 {
        self.manifest.read().await.version
    }

    /// All committed versions still resolvable (versions removed by
    /// `cleanup_old_versions` are skipped; their flattened summary
    /// survives in the version archive instead) (§6.2).
    pub async fn versions(&self) -> Result<Vec<VersionInfo>> {
        let latest = Self::latest_version(&self.store, &self.root).await?;
        let mut out = Vec::new();
        for v in 0..=latest {
            if let Ok(m) = Self::load_manifest(&self.store, &self.root, v).await {
                out.push(VersionInfo { version: m.version, created_at: m.created_at.clone(), message: m.message.clone() });
            }
        }
        Ok(out)
    }

    /// Move this handle's snapshot to `version` (§6.2).
    pub async fn checkout(&self, version: u64) -> Result<()> {
        let manifest = Self::load_manifest(&self.store, &self.root, version).await?;
        *self.manifest.write().await = manifest;
        self.scalar_indices.clear();
        self.fts_indices.clear();
        Ok(())
    }

    pub async fn checkout_tag(&self, name: &str) -> Result<()> {
        let tag = self
            .get_tag(name)
            .await?
            .ok_or_else(|| Error::not_found(format!("no such tag: {name}")))?;
        self.checkout(tag.version).await
    }

    /// Move this handle's snapshot to the dataset's current latest
    /// version, observing any commits made since `open`/the last
    /// `refresh` (§6.2, used to recover from a `ConflictError`).
    pub async fn refresh(&self) -> Result<u64> {
        let latest = Self::latest_version(&self.store, &self.root).await?;
        let manifest = Self::load_manifest(&self.store, &self.root, latest).await?;
        *self.manifest.write().await = manifest;
        self.scalar_indices.clear();
        self.fts_indices.clear();
        Ok(latest)
    }

    fn tag_path(&self, name: &str) -> Path {
        self.root.child(TAGS_DIR).child(format!("{name}.json"))
    }

    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        let dir = self.root.child(TAGS_DIR);
        let mut tags = Vec::new();
        for path in self.store.list_prefix(&dir).await? {
            let bytes = self.store.get_all(&path).await?;
            tags.push(serde_json::from_slice::<Tag>(&bytes)?);
        }
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    pub async fn get_tag(&self, name: &str) -> Result<Option<Tag>> {
        let path = self.tag_path(name);
        if !self.store.exists(&path).await? {
            return Ok(None);
        }
        let bytes = self.store.get_all(&path).await?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    pub async fn create_tag(&self, name: &str, version: u64) -> Result<()> {
        Self::load_manifest(&self.store, &self.root, version).await?;
        let bytes = serde_json::to_vec(&Tag { name: name.to_string(), version })?;
        if !self.store.put_if_absent(&self.tag_path(name), bytes).await? {
            return Err(Error::conflict(format!("tag {name} already exists")));
        }
        Ok(())
    }

    pub async fn update_tag(&self, name: &str, version: u64) -> Result<()> {
        Self::load_manifest(&self.store, &self.root, version).await?;
        let bytes = serde_json::to_vec(&Tag { name: name.to_string(), version })?;
        self.store.put(&self.tag_path(name), bytes).await?;
        Ok(())
    }

    pub async fn delete_tag(&self, name: &str) -> Result<()> {
        self.store.delete(&self.tag_path(name)).await
    }

    pub async fn data_statistics(&self) -> Result<statistics::DataStatistics> {
        let manifest = self.current_manifest().await;
        statistics::calculate_data_stats(&self.store, &manifest).await
    }

    /// Append `record` after validating it against the current schema
    /// (§4.1, §4.4). Returns the same record unchanged; it already
    /// carries its uuid and timestamps from [`crate::RecordBuilder`].
    pub async fn add(&self, record: Record) -> Result<Record> {
        let mut records = self.add_many(vec![record]).await?;
        Ok(records.remove(0))
    }

    pub async fn add_many(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        if records.is_empty() {
            return Ok(records);
        }
        let schema = self.schema().await;
        for record in &records {
            let errors = record.validate(&schema);
            if !errors.is_empty() {
                return Err(Error::validation(
                    "one or more records failed validation",
                    errors.into_iter().map(|e| e.to_string()).collect(),
                ));
            }
        }

        let op = TransactionOp::Append { records: records.clone() };
        let store = Arc::clone(&self.store);
        let root = self.root.clone();
        let payload = records.clone();
        self.commit_loop(&op, move |base| {
            let store = Arc::clone(&store);
            let root = root.clone();
            let payload = payload.clone();
            async move {
                let fragment_id = base.next_fragment_id();
                let fragment = FragmentWriter::write(&store, &root, fragment_id, &payload, &base.schema).await?;
                let mut fragments = base.fragments.clone();
                fragments.push(fragment);
                // New rows land in a fresh fragment rather than the
                // vector index's trained partitions; record them as an
                // unmerged delta so `merge_index_deltas` knows to fold
                // this fragment in on its next pass (§4.6).
                let mut indices = base.indices.clone();
                for entry in indices.iter_mut() {
                    if entry.kind.is_vector() {
                        entry.deltas.push(DeltaSegment { file: String::new(), fragment_ids: vec![fragment_id] });
                    }
                }
                Ok((fragments, indices, "append".to_string()))
            }
        })
        .await?;
        Ok(records)
    }

    /// Delete rows by predicate or explicit uuid set (§4.4, §6.2).
    /// Returns the number of rows tombstoned.
    pub async fn delete(&self, selector: DeleteSelector) -> Result<u64> {
        let op = match &selector {
            DeleteSelector::Predicate(p) => TransactionOp::DeleteByPredicate { predicate: p.clone() },
            DeleteSelector::Uuids(u) => TransactionOp::DeleteByUuids { uuids: u.clone() },
        };
        let store = Arc::clone(&self.store);
        let root = self.root.clone();
        let selector_for_build = selector.clone();
        let deleted = Arc::new(AtomicU64::new(0));
        let deleted_for_build = Arc::clone(&deleted);

        self.commit_loop(&op, move |base| {
            let store = Arc::clone(&store);
            let root = root.clone();
            let selector = selector_for_build.clone();
            let deleted = Arc::clone(&deleted_for_build);
            async move {
                let schema = base.schema.clone();
                let next_version = base.version + 1;

                let predicate_ast = match &selector {
                    DeleteSelector::Predicate(p) => Some(filter::parse(p)?),
                    DeleteSelector::Uuids(_) => None,
                };
                let target_uuids: Option<HashSet<Uuid>> = match &selector {
                    DeleteSelector::Uuids(u) => Some(u.iter().copied().collect()),
                    DeleteSelector::Predicate(_) => None,
                };

                let mut field_ids = core_field_ids(&schema);
                if let Some(ast) = &predicate_ast {
                    let mut cols = Vec::new();
                    ast.referenced_columns(&mut cols);
                    for c in cols {
                        if let Some(f) = schema.field_by_name(&c) {
                            field_ids.insert(f.id);
                        }
                    }
                }

                let mut total_deleted = 0u64;
                let mut new_fragments = Vec::with_capacity(base.fragments.len());
                for fragment in &base.fragments {
                    let rows = FragmentReader::read(&store, fragment, &schema, &field_ids, false).await?;
                    let mut to_delete = Vec::new();
                    for (addr, record) in &rows {
                        let matches = match (&predicate_ast, &target_uuids) {
                            (Some(ast), _) => filter::eval(ast, &|name| record_column_value(record, &schema, name))?,
                            (None, Some(uuids)) => uuids.contains(&record.uuid),
                            (None, None) => false,
                        };
                        if matches {
                            to_delete.push(addr.offset);
                        }
                    }
                    if to_delete.is_empty() {
                        new_fragments.push(fragment.clone());
                        continue;
                    }
                    total_deleted += to_delete.len() as u64;
                    new_fragments.push(
                        tombstone_fragment(&store, &root, fragment, &to_delete, next_version).await?,
                    );
                }
                deleted.store(total_deleted, Ordering::SeqCst);
                Ok((new_fragments, base.indices.clone(), "delete".to_string()))
            }
        })
        .await?;
        self.invalidate_scalar_fts_caches();
        Ok(deleted.load(Ordering::SeqCst))
    }

    /// Replace the record with `record.uuid`, refreshing `updated_at`
    /// (§4.4, §8 scenario 3). Implemented as tombstone-the-old-row plus
    /// append-the-new-row, matching the immutable-fragment model (§4.3).
    pub async fn update(&self, mut record: Record) -> Result<Record> {
        record.touch();
        let schema = self.schema().await;
        let errors = record.validate(&schema);
        if !errors.is_empty() {
            return Err(Error::validation(
                "record failed validation",
                errors.into_iter().map(|e| e.to_string()).collect(),
            ));
        }

        let mut touched = HashSet::new();
        touched.insert(record.uuid);
        let op = TransactionOp::Update { records_by_uuid: [(record.uuid, record.clone())].into_iter().collect() };
        let store = Arc::clone(&self.store);
        let root = self.root.clone();
        let payload = record.clone();

        self.commit_loop(&op, move |base| {
            let store = Arc::clone(&store);
            let root = root.clone();
            let record = payload.clone();
            async move {
                let schema = base.schema.clone();
                let field_ids = core_field_ids(&schema);
                let next_version = base.version + 1;
                let mut found = false;
                let mut new_fragments = Vec::with_capacity(base.fragments.len() + 1);
                for fragment in &base.fragments {
                    let rows = FragmentReader::read(&store, fragment, &schema, &field_ids, false).await?;
                    match rows.iter().find(|(_, r)| r.uuid == record.uuid) {
                        None => new_fragments.push(fragment.clone()),
                        Some((addr, _)) => {
                            found = true;
                            new_fragments.push(
                                tombstone_fragment(&store, &root, fragment, &[addr.offset], next_version).await?,
                            );
                        }
                    }
                }
                if !found {
                    return Err(Error::not_found(format!("no record with uuid {} to update", record.uuid)));
                }
                let fragment_id = base.next_fragment_id();
                let fragment =
                    FragmentWriter::write(&store, &root, fragment_id, std::slice::from_ref(&record), &schema).await?;
                new_fragments.push(fragment);
                Ok((new_fragments, base.indices.clone(), "update".to_string()))
            }
        })
        .await?;
        self.invalidate_scalar_fts_caches();
        Ok(record)
    }

    /// Insert-or-replace every record in `records`, keyed by uuid (§4.4,
    /// §8 upsert idempotence). Touches every uuid regardless of whether
    /// it previously existed.
    pub async fn upsert(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        if records.is_empty() {
            return Ok(records);
        }
        let schema = self.schema().await;
        let mut touched = Vec::with_capacity(records.len());
        for mut record in records {
            record.touch();
            let errors = record.validate(&schema);
            if !errors.is_empty() {
                return Err(Error::validation(
                    "one or more records failed validation",
                    errors.into_iter().map(|e| e.to_string()).collect(),
                ));
            }
            touched.push(record);
        }

        let op = TransactionOp::Upsert { records: touched.clone() };
        let store = Arc::clone(&self.store);
        let root = self.root.clone();
        let payload = touched.clone();

        self.commit_loop(&op, move |base| {
            let store = Arc::clone(&store);
            let root = root.clone();
            let records = payload.clone();
            async move {
                let schema = base.schema.clone();
                let field_ids = core_field_ids(&schema);
                let next_version = base.version + 1;
                let incoming: HashSet<Uuid> = records.iter().map(|r| r.uuid).collect();

                let mut new_fragments = Vec::with_capacity(base.fragments.len() + 1);
                for fragment in &base.fragments {
                    let rows = FragmentReader::read(&store, fragment, &schema, &field_ids, false).await?;
                    let offsets: Vec<u32> = rows
                        .iter()
                        .filter(|(_, r)| incoming.contains(&r.uuid))
                        .map(|(addr, _)| addr.offset)
                        .collect();
                    if offsets.is_empty() {
                        new_fragments.push(fragment.clone());
                    } else {
                        new_fragments.push(tombstone_fragment(&store, &root, fragment, &offsets, next_version).await?);
                    }
                }
                let fragment_id = base.next_fragment_id();
                let fragment = FragmentWriter::write(&store, &root, fragment_id, &records, &schema).await?;
                new_fragments.push(fragment);
                Ok((new_fragments, base.indices.clone(), "upsert".to_string()))
            }
        })
        .await?;
        self.invalidate_scalar_fts_caches();
        Ok(touched)
    }

    pub async fn get_by_uuid(&self, uuid: Uuid) -> Result<Option<Record>> {
        let manifest = self.current_manifest().await;
        let field_ids: HashSet<i32> = manifest.schema.field_ids().into_iter().collect();
        for fragment in &manifest.fragments {
            let rows = FragmentReader::read(&self.store, fragment, &manifest.schema, &field_ids, false).await?;
            if let Some((_, record)) = rows.into_iter().find(|(_, r)| r.uuid == uuid) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    fn resolve_projection(&self, schema: &DatasetSchema, columns: Option<&[String]>) -> HashSet<i32> {
        match columns {
            None => schema.field_ids().into_iter().collect(),
            Some(cols) => {
                let mut ids = core_field_ids(schema);
                for c in cols {
                    if let Some(f) = schema.field_by_name(c) {
                        ids.insert(f.id);
                    }
                }
                ids
            }
        }
    }

    /// Random-access row fetch by logical offset (§4.7, §6.2).
    pub async fn take(&self, indices: &[u64], columns: Option<&[String]>) -> Result<Vec<Record>> {
        let manifest = self.current_manifest().await;
        let field_ids = self.resolve_projection(&manifest.schema, columns);
        let offsets = manifest.fragment_offsets().to_vec();
        let mut out = Vec::with_capacity(indices.len());
        for &idx in indices {
            let hits = fragments_by_offset_range(&manifest.fragments, &offsets, idx..idx + 1);
            let (frag_start, frag_idx) =
                hits.into_iter().next().ok_or_else(|| Error::not_found(format!("row index {idx} out of range")))?;
            let fragment = &manifest.fragments[frag_idx];
            let local_offset = (idx - frag_start) as u32;
            let record = FragmentReader::read_one(&self.store, fragment, &manifest.schema, local_offset, &field_ids)
                .await?
                .ok_or_else(|| Error::not_found(format!("row index {idx} was deleted")))?;
            out.push(record);
        }
        Ok(out)
    }

    /// Fetch lazily-readable blob handles for `column` by uuid (§9
    /// design note: blobs are never inlined into a scan's row path).
    pub async fn take_blobs(&self, column: &str, uuids: &[Uuid]) -> Result<Vec<BlobHandle>> {
        let manifest = self.current_manifest().await;
        let schema = &manifest.schema;
        let field = schema.field_by_name(column).ok_or_else(|| Error::not_found(format!("no such column: {column}")))?;
        if !field.data_type.is_blob() {
            return Err(Error::validation(format!("{column} is not a blob column"), Vec::new()));
        }
        let uuid_field_id = schema.field_by_name("uuid").map(|f| f.id).expect("uuid field always present");
        let probe_fields: HashSet<i32> = [uuid_field_id].into_iter().collect();

        let mut handles = Vec::with_capacity(uuids.len());
        for &uuid in uuids {
            let mut located: Option<(&Fragment, u32)> = None;
            for fragment in &manifest.fragments {
                let rows = FragmentReader::read(&self.store, fragment, schema, &probe_fields, false).await?;
                if let Some((addr, _)) = rows.into_iter().find(|(_, r)| r.uuid == uuid) {
                    located = Some((fragment, addr.offset));
                    break;
                }
            }
            let (fragment, offset) = located.ok_or_else(|| Error::not_found(format!("no record with uuid {uuid}")))?;
            let blob_ref = fragment
                .blob_ref
                .as_ref()
                .ok_or_else(|| Error::not_found(format!("uuid {uuid} has no blob data")))?;
            let data_file = fragment
                .files
                .iter()
                .find(|f| f.field_ids.contains(&field.id))
                .ok_or_else(|| Error::corruption(format!("fragment {} missing column file for {column}", fragment.id)))?;
            let bytes = self.store.get_all(&Path::from(data_file.path.clone())).await?;
            let values: Vec<Value> = serde_json::from_slice(&bytes)?;
            let entry = values
                .get(offset as usize)
                .ok_or_else(|| Error::corruption("row offset out of range for blob column"))?;
            let (offset_in_blob, len) = match entry {
                Value::List(parts) if parts.len() == 2 => match (&parts[0], &parts[1]) {
                    (Value::Int64(o), Value::Int64(l)) => (*o as u64, *l as u64),
                    _ => return Err(Error::corruption("malformed blob offset/length pair")),
                },
                Value::Null => return Err(Error::not_found(format!("uuid {uuid} has no blob data in column {column}"))),
                _ => return Err(Error::corruption("unexpected blob column encoding")),
            };
            handles.push(BlobHandle::new(Arc::clone(&self.store), Path::from(blob_ref.path.clone()), offset_in_blob, len));
        }
        Ok(handles)
    }

    pub(crate) fn invalidate_scalar_fts_caches(&self) {
        self.scalar_indices.clear();
        self.fts_indices.clear();
    }

    async fn archive_version(&self, manifest: &Manifest) -> Result<()> {
        let mut archive = self.archive.lock().await;
        if !archive.is_enabled() {
            return Ok(());
        }
        let timestamp_millis =
            contextframe_core::time::parse_iso8601(&manifest.created_at).map(|d| d.timestamp_millis()).unwrap_or(0);
        archive.add_summaries(&[VersionSummary {
            version: manifest.version,
            timestamp_millis,
            manifest_summary: manifest.summary(),
            is_tagged: false,
            is_cleaned_up: false,
            transaction_uuid: None,
            read_version: manifest.parent_version,
            operation_type: Some(manifest.message.clone()),
            transaction_properties: manifest.config.clone(),
        }]);
        archive.flush().await
    }

    pub(crate) fn archive(&self) -> &Mutex<VersionArchive> {
        &self.archive
    }

    /// The commit protocol (§4.4): build a candidate manifest against
    /// `base`, publish it atomically, and on a lost race either rebase
    /// and retry (when `op`'s touched uuid set is known and disjoint
    /// from every intervening commit) or surface [`Error::Conflict`]
    /// immediately (when the touched set is unknown -- a predicate
    /// delete or compaction -- or it actually overlaps).
    pub(crate) async fn commit_loop<F, Fut>(&self, op: &TransactionOp, mut build: F) -> Result<Manifest>
    where
        F: FnMut(Manifest) -> Fut,
        Fut: Future<Output = Result<(Vec<Fragment>, Vec<IndexCatalogEntry>, String)>>,
    {
        let touched = op.touched_uuids();
        let mut base = self.current_manifest().await;

        for _ in 0..self.max_commit_retries {
            let (fragments, indices, message) = build(base.clone()).await?;
            let mut next = Manifest::new_from_previous(&base, fragments, message);
            next.indices = indices;
            transaction::record_touch_metadata(&mut next.config, op);

            let path = manifest_path(&self.root, next.version);
            match self.store.atomic_rename_or_cas(&path, next.to_json()?).await {
                Ok(()) => {
                    self.archive_version(&next).await?;
                    *self.manifest.write().await = next.clone();
                    return Ok(next);
                }
                Err(e) if e.is_retryable() => {
                    let latest_version = Self::latest_version(&self.store, &self.root).await?;
                    if latest_version <= base.version {
                        // A concurrent writer raced us but has not
                        // actually advanced past our base yet; reload
                        // and retry without treating it as a conflict.
                        base = Self::load_manifest(&self.store, &self.root, latest_version).await?;
                        continue;
                    }
                    match &touched {
                        None => {
                            return Err(Error::conflict(format!(
                                "{} cannot be safely retried against concurrent commits up to version {latest_version}",
                                op.name()
                            )))
                        }
                        Some(_) => {
                            for v in (base.version + 1)..=latest_version {
                                let intervening = Self::load_manifest(&self.store, &self.root, v).await?;
                                if transaction::conflicts_with(&touched, &intervening.config) {
                                    return Err(Error::conflict(format!(
                                        "{} conflicts with the transaction committed as version {v}",
                                        op.name()
                                    )));
                                }
                            }
                            base = Self::load_manifest(&self.store, &self.root, latest_version).await?;
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::conflict(format!("{} exceeded the maximum commit retry count", op.name())))
    }
}

/// Tombstone `offsets` within `fragment`, writing a merged deletion
/// vector and returning the updated fragment (§4.3, §4.4: delete,
/// update and upsert all share this row-removal primitive).
async fn tombstone_fragment(
    store: &FrameObjectStore,
    root: &Path,
    fragment: &Fragment,
    offsets: &[u32],
    written_at_version: u64,
) -> Result<Fragment> {
    let mut dv = match &fragment.deletion_vector {
        Some(dv_ref) => {
            let bytes = store.get_all(&Path::from(dv_ref.path.clone())).await?;
            DeletionVector::deserialize(&bytes).map_err(|e| Error::corruption(format!("corrupt deletion vector: {e}")))?
        }
        None => DeletionVector::new(),
    };
    for &offset in offsets {
        dv.insert(offset);
    }
    let dv_bytes = dv.serialize().map_err(|e| Error::corruption(format!("failed to serialize deletion vector: {e}")))?;
    let dv_path = root.child(DELETIONS_DIR).child(format!("{}-{written_at_version}.bin", fragment.id));
    store.put(&dv_path, dv_bytes).await?;
    Ok(fragment.clone().with_deletion_vector(DeletionVectorRef {
        path: dv_path.to_string(),
        written_at_version,
        cardinality: dv.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordBuilder;

    async fn new_dataset(dir: &std::path::Path) -> FrameDataset {
        FrameDataset::create(dir.to_str().unwrap(), 4).await.unwrap()
    }

    #[tokio::test]
    async fn create_add_and_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let ds = new_dataset(dir.path()).await;
        let schema = ds.schema().await;
        let record = RecordBuilder::new("A").vector(vec![1.0, 0.0, 0.0, 0.0]).tag("x").build(&schema).unwrap();
        let uuid = record.uuid;
        ds.add(record).await.unwrap();

        let fetched = ds.get_by_uuid(uuid).await.unwrap().unwrap();
        assert_eq!(fetched.title, "A");
        assert_eq!(ds.version().await, 1);
        let versions = ds.versions().await.unwrap();
        assert_eq!(versions.iter().map(|v| v.version).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[tokio::test]
    async fn delete_by_predicate_masks_matching_rows() {
        let dir = tempfile::tempdir().unwrap();
        let ds = new_dataset(dir.path()).await;
        let schema = ds.schema().await;
        for (title, status) in [("a", "draft"), ("b", "published"), ("c", "draft")] {
            let record = RecordBuilder::new(title).status(status).build(&schema).unwrap();
            ds.add(record).await.unwrap();
        }

        let deleted = ds.delete(DeleteSelector::Predicate("status = 'draft'".to_string())).await.unwrap();
        assert_eq!(deleted, 2);

        let manifest = ds.current_manifest().await;
        let all_fields: HashSet<i32> = manifest.schema.field_ids().into_iter().collect();
        let mut remaining = 0;
        for fragment in &manifest.fragments {
            remaining += FragmentReader::read(&ds.store, fragment, &manifest.schema, &all_fields, false)
                .await
                .unwrap()
                .len();
        }
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn update_preserves_uuid_and_refreshes_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let ds = new_dataset(dir.path()).await;
        let schema = ds.schema().await;
        let original = RecordBuilder::new("T").build(&schema).unwrap();
        let uuid = original.uuid;
        let lower_bound = original.updated_at.clone();
        ds.add(original).await.unwrap();

        let mut replacement = ds.get_by_uuid(uuid).await.unwrap().unwrap();
        replacement.title = "T2".to_string();
        ds.update(replacement).await.unwrap();

        let fetched = ds.get_by_uuid(uuid).await.unwrap().unwrap();
        assert_eq!(fetched.title, "T2");
        assert_eq!(fetched.uuid, uuid);
        assert!(contextframe_table::record::updated_at_at_least(&fetched, &lower_bound));
    }

    #[tokio::test]
    async fn upsert_is_idempotent_ignoring_updated_at() {
        let dir = tempfile::tempdir().unwrap();
        let ds = new_dataset(dir.path()).await;
        let schema = ds.schema().await;
        let record = RecordBuilder::new("once").build(&schema).unwrap();

        ds.upsert(vec![record.clone()]).await.unwrap();
        ds.upsert(vec![record.clone()]).await.unwrap();

        let manifest = ds.current_manifest().await;
        let all_fields: HashSet<i32> = manifest.schema.field_ids().into_iter().collect();
        let mut total = 0;
        for fragment in &manifest.fragments {
            total += FragmentReader::read(&ds.store, fragment, &manifest.schema, &all_fields, false)
                .await
                .unwrap()
                .len();
        }
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn concurrent_update_of_same_uuid_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let ds = new_dataset(dir.path()).await;
        let schema = ds.schema().await;
        let record = RecordBuilder::new("shared").build(&schema).unwrap();
        let uuid = record.uuid;
        ds.add(record).await.unwrap();

        // Writer A, based on version 1, commits an update.
        let mut a = ds.get_by_uuid(uuid).await.unwrap().unwrap();
        a.title = "from-a".to_string();
        ds.update(a).await.unwrap();

        // Writer B bases its candidate off the stale version-1 manifest
        // directly (simulating a reader that hasn't refreshed) rather
        // than going through `ds`, whose in-memory snapshot has already
        // advanced.
        let stale = FrameDataset::load_manifest(&ds.store, &ds.root, 1).await.unwrap();
        *ds.manifest.write().await = stale;
        let mut b = ds.get_by_uuid(uuid).await.unwrap().unwrap();
        b.title = "from-b".to_string();
        let err = ds.update(b).await.unwrap_err();
        assert!(err.is_retryable());

        ds.refresh().await.unwrap();
        let mut c = ds.get_by_uuid(uuid).await.unwrap().unwrap();
        c.title = "from-c".to_string();
        ds.update(c).await.unwrap();
        assert_eq!(ds.get_by_uuid(uuid).await.unwrap().unwrap().title, "from-c");
    }

    #[tokio::test]
    async fn tags_round_trip_and_gate_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let ds = new_dataset(dir.path()).await;
        ds.create_tag("v1", 0).await.unwrap();
        assert_eq!(ds.get_tag("v1").await.unwrap().unwrap().version, 0);
        ds.checkout_tag("v1").await.unwrap();
        assert_eq!(ds.version().await, 0);
        let err = ds.create_tag("v1", 0).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }
}
