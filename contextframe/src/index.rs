// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Index lifecycle (C5/C6, §4.5-4.6): building, persisting and lazily
//! loading the three index families onto a [`FrameDataset`].
//!
//! Vector indices are trained artifacts (centroids, PQ codebooks or
//! HNSW graphs) that are expensive to rebuild, so they are persisted
//! under `indices/<name>/` and only invalidated -- never silently
//! rebuilt -- when a fragment they reference is removed (§4.5).
//! Scalar and full-text indices are cheap to rebuild from a column
//! scan, so this crate deliberately does not persist them at all: a
//! catalog entry just records that the index exists and what it
//! covers, and [`ensure_scalar_index_loaded`]/[`ensure_fts_index_loaded`]
//! rebuild against the current snapshot on first use after open or
//! after any mutating commit, caching the in-memory result on the
//! dataset handle until the next invalidation (§9 scoping decision,
//! recorded in `DESIGN.md`).

use std::sync::Arc;

use contextframe_core::datatype::Value;
use contextframe_core::error::{Error, Result};
use contextframe_index::fts::{InvertedIndex, TokenizerConfig};
use contextframe_index::scalar::{BTreeIndex, BitmapIndex, LabelListIndex, NgramIndex};
use contextframe_index::vector::{RowAddress, VectorIndex, VectorIndexParams};
use contextframe_table::format::{IndexCatalogEntry, IndexKind};

use crate::dataset::store::{core_field_ids, record_column_value, FragmentReader};
use crate::dataset::FrameDataset;
use crate::transaction::TransactionOp;

/// One loaded-in-memory scalar index, tagged by kind so the scanner can
/// match it against a predicate shape without re-deriving the kind from
/// the catalog entry.
pub enum ScalarIndexState {
    BTree(BTreeIndex),
    Bitmap(BitmapIndex),
    LabelList(LabelListIndex),
    Ngram(NgramIndex),
}

fn tokenizer_config_to_params(config: &TokenizerConfig) -> std::collections::HashMap<String, String> {
    [
        ("lower_case", config.lower_case.to_string()),
        ("ascii_folding", config.ascii_folding.to_string()),
        ("remove_stop_words", config.remove_stop_words.to_string()),
        ("max_token_length", config.max_token_length.to_string()),
        ("with_position", config.with_position.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn tokenizer_config_from_params(params: &std::collections::HashMap<String, String>) -> TokenizerConfig {
    let default = TokenizerConfig::default();
    let flag = |key: &str, fallback: bool| {
        params.get(key).and_then(|v| v.parse::<bool>().ok()).unwrap_or(fallback)
    };
    TokenizerConfig {
        lower_case: flag("lower_case", default.lower_case),
        ascii_folding: flag("ascii_folding", default.ascii_folding),
        remove_stop_words: flag("remove_stop_words", default.remove_stop_words),
        max_token_length: params
            .get("max_token_length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(default.max_token_length),
        with_position: flag("with_position", default.with_position),
    }
}

impl FrameDataset {
    async fn collect_live_rows(&self, column: &str) -> Result<(Vec<(RowAddress, Value)>, Vec<u64>)> {
        let manifest = self.current_manifest().await;
        let schema = &manifest.schema;
        let field = schema
            .field_by_name(column)
            .ok_or_else(|| Error::not_found(format!("no such column: {column}")))?;
        let mut field_ids = core_field_ids(schema);
        field_ids.insert(field.id);

        let mut pairs = Vec::new();
        let mut fragment_ids = Vec::with_capacity(manifest.fragments.len());
        for fragment in &manifest.fragments {
            fragment_ids.push(fragment.id);
            let rows = FragmentReader::read(&self.store, fragment, schema, &field_ids, false).await?;
            for (addr, record) in rows {
                let value = record_column_value(&record, schema, column);
                pairs.push((addr, value));
            }
        }
        Ok((pairs, fragment_ids))
    }

    /// Train and persist a vector index over the dataset's `vector`
    /// column (§4.5). The only currently-supported column is the
    /// dataset-wide embedding column, matching `embed_dim`'s single
    /// fixed-width scope (§4.2).
    pub async fn create_vector_index(&self, name: &str, column: &str, params: VectorIndexParams) -> Result<()> {
        let (pairs, fragment_ids) = self.collect_live_rows(column).await?;
        let vectors: Vec<(RowAddress, Vec<f32>)> = pairs
            .into_iter()
            .filter_map(|(addr, value)| match value {
                Value::List(items) => {
                    let v: Option<Vec<f32>> = items
                        .into_iter()
                        .map(|item| match item {
                            Value::Float32(f) => Some(f),
                            _ => None,
                        })
                        .collect();
                    v.map(|v| (addr, v))
                }
                _ => None,
            })
            .collect();
        if vectors.is_empty() {
            return Err(Error::validation(format!("no vectors found in column {column} to index"), Vec::new()));
        }
        let index = VectorIndex::train(&vectors, params.clone())?;
        let bytes = index.to_bytes()?;

        let kind = match params.variant {
            contextframe_index::vector::IndexVariant::IvfPq => IndexKind::IvfPq,
            contextframe_index::vector::IndexVariant::IvfHnsw => IndexKind::IvfHnsw,
        };
        let name = name.to_string();
        let column = column.to_string();
        let store = Arc::clone(&self.store);
        let root = self.root.clone();

        let op = TransactionOp::CreateIndex { name: name.clone() };
        self.commit_loop(&op, move |base| {
            let store = Arc::clone(&store);
            let root = root.clone();
            let name = name.clone();
            let column = column.clone();
            let bytes = bytes.clone();
            let fragment_ids = fragment_ids.clone();
            async move {
                let path = root.child("indices").child(&name).child("vector.bin");
                store.put(&path, bytes).await?;
                let entry = IndexCatalogEntry::new(name.as_str(), kind, column.as_str(), base.version + 1, fragment_ids);
                let entry = IndexCatalogEntry { files: vec![path.to_string()], ..entry };
                let mut indices: Vec<IndexCatalogEntry> = base.indices.into_iter().filter(|e| e.name != name).collect();
                indices.push(entry);
                Ok((base.fragments, indices, format!("create_index {name}")))
            }
        })
        .await?;
        self.vector_indices.insert(name_back(&op), Arc::new(index));
        Ok(())
    }

    /// Register a scalar index (b-tree/bitmap/label-list/n-gram) over
    /// `column`. No artifact is persisted; the catalog entry exists so
    /// `list_indices`/the planner can see it, and the first query after
    /// this call (or after any later commit) rebuilds it from the live
    /// snapshot (§4.6, §9 scoping decision).
    pub async fn create_scalar_index(&self, name: &str, column: &str, kind: IndexKind) -> Result<()> {
        if !kind.is_scalar() || kind == IndexKind::Fts {
            return Err(Error::validation(format!("{kind:?} is not a scalar index kind"), Vec::new()));
        }
        let (_, fragment_ids) = self.collect_live_rows(column).await?;
        let name = name.to_string();
        let column = column.to_string();
        let op = TransactionOp::CreateIndex { name: name.clone() };
        self.commit_loop(&op, move |base| {
            let name = name.clone();
            let column = column.clone();
            let fragment_ids = fragment_ids.clone();
            async move {
                let entry = IndexCatalogEntry::new(name.as_str(), kind, column.as_str(), base.version + 1, fragment_ids);
                let mut indices: Vec<IndexCatalogEntry> = base.indices.into_iter().filter(|e| e.name != name).collect();
                indices.push(entry);
                Ok((base.fragments, indices, format!("create_index {name}")))
            }
        })
        .await?;
        self.scalar_indices.remove(&op_name(&op));
        Ok(())
    }

    /// Register a BM25 full-text index over `column` (§4.6). Like
    /// scalar indices, the inverted index itself is never persisted;
    /// the tokenizer configuration is stored in the catalog entry's
    /// params so a lazy rebuild reproduces identical tokenization.
    pub async fn create_fts_index(&self, name: &str, column: &str, config: TokenizerConfig) -> Result<()> {
        let (_, fragment_ids) = self.collect_live_rows(column).await?;
        let name = name.to_string();
        let column = column.to_string();
        let params = tokenizer_config_to_params(&config);
        let op = TransactionOp::CreateIndex { name: name.clone() };
        self.commit_loop(&op, move |base| {
            let name = name.clone();
            let column = column.clone();
            let params = params.clone();
            let fragment_ids = fragment_ids.clone();
            async move {
                let mut entry = IndexCatalogEntry::new(name.as_str(), IndexKind::Fts, column.as_str(), base.version + 1, fragment_ids);
                entry.params = params;
                let mut indices: Vec<IndexCatalogEntry> = base.indices.into_iter().filter(|e| e.name != name).collect();
                indices.push(entry);
                Ok((base.fragments, indices, format!("create_index {name}")))
            }
        })
        .await?;
        self.fts_indices.remove(&op_name(&op));
        Ok(())
    }

    pub async fn drop_index(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        let op = TransactionOp::DropIndex { name: name.clone() };
        self.commit_loop(&op, move |base| {
            let name = name.clone();
            async move {
                let indices: Vec<IndexCatalogEntry> = base.indices.into_iter().filter(|e| e.name != name).collect();
                Ok((base.fragments, indices, format!("drop_index {name}")))
            }
        })
        .await?;
        self.vector_indices.remove(name_str(&op));
        self.scalar_indices.remove(name_str(&op));
        self.fts_indices.remove(name_str(&op));
        Ok(())
    }

    pub async fn list_indices(&self) -> Vec<IndexCatalogEntry> {
        self.current_manifest().await.indices
    }

    fn find_entry<'a>(indices: &'a [IndexCatalogEntry], name: &str) -> Result<&'a IndexCatalogEntry> {
        indices
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::not_found(format!("no such index: {name}")))
    }

    pub(crate) async fn ensure_vector_index_loaded(&self, name: &str) -> Result<Arc<VectorIndex>> {
        if let Some(hit) = self.vector_indices.get(name) {
            return Ok(Arc::clone(&hit));
        }
        let manifest = self.current_manifest().await;
        let entry = Self::find_entry(&manifest.indices, name)?;
        if !entry.kind.is_vector() {
            return Err(Error::validation(format!("{name} is not a vector index"), Vec::new()));
        }
        let current_ids: Vec<u64> = manifest.fragments.iter().map(|f| f.id).collect();
        if !entry.is_valid_for(&current_ids) {
            return Err(Error::index_invalid(format!(
                "vector index {name} references a fragment removed by a later commit; rebuild with create_vector_index"
            )));
        }
        let path = entry
            .files
            .first()
            .ok_or_else(|| Error::corruption(format!("vector index {name} has no backing file")))?;
        let bytes = self.store.get_all(&object_store::path::Path::from(path.clone())).await?;
        let index = Arc::new(VectorIndex::from_bytes(&bytes)?);
        self.vector_indices.insert(name.to_string(), Arc::clone(&index));
        Ok(index)
    }

    pub(crate) async fn ensure_scalar_index_loaded(&self, name: &str) -> Result<Arc<ScalarIndexState>> {
        if let Some(hit) = self.scalar_indices.get(name) {
            return Ok(Arc::clone(&hit));
        }
        let manifest = self.current_manifest().await;
        let entry = Self::find_entry(&manifest.indices, name)?;
        if !entry.kind.is_scalar() || entry.kind == IndexKind::Fts {
            return Err(Error::validation(format!("{name} is not a scalar index"), Vec::new()));
        }
        let (pairs, _) = self.collect_live_rows(&entry.column).await?;
        let state = match entry.kind {
            IndexKind::BTree => ScalarIndexState::BTree(BTreeIndex::build(pairs)),
            IndexKind::Bitmap => ScalarIndexState::Bitmap(BitmapIndex::build(pairs)),
            IndexKind::LabelList => ScalarIndexState::LabelList(LabelListIndex::build(pairs)),
            IndexKind::Ngram => {
                let strings = pairs.into_iter().filter_map(|(addr, v)| match v {
                    Value::Utf8(s) => Some((s, addr)),
                    _ => None,
                });
                ScalarIndexState::Ngram(NgramIndex::build(strings))
            }
            _ => unreachable!("scalar-only kinds filtered above"),
        };
        let state = Arc::new(state);
        self.scalar_indices.insert(name.to_string(), Arc::clone(&state));
        Ok(state)
    }

    pub(crate) async fn ensure_fts_index_loaded(&self, name: &str) -> Result<Arc<InvertedIndex>> {
        if let Some(hit) = self.fts_indices.get(name) {
            return Ok(Arc::clone(&hit));
        }
        let manifest = self.current_manifest().await;
        let entry = Self::find_entry(&manifest.indices, name)?;
        if entry.kind != IndexKind::Fts {
            return Err(Error::validation(format!("{name} is not a full-text index"), Vec::new()));
        }
        let config = tokenizer_config_from_params(&entry.params);
        let (pairs, _) = self.collect_live_rows(&entry.column).await?;
        let documents = pairs.into_iter().filter_map(|(addr, v)| match v {
            Value::Utf8(s) => Some((addr, s)),
            _ => None,
        });
        let index = Arc::new(InvertedIndex::build(documents, &config));
        self.fts_indices.insert(name.to_string(), Arc::clone(&index));
        Ok(index)
    }
}

fn op_name(op: &TransactionOp) -> String {
    match op {
        TransactionOp::CreateIndex { name } | TransactionOp::DropIndex { name } => name.clone(),
        _ => unreachable!("index.rs only builds CreateIndex/DropIndex ops"),
    }
}

fn name_str(op: &TransactionOp) -> &str {
    match op {
        TransactionOp::CreateIndex { name } | TransactionOp::DropIndex { name } => name.as_str(),
        _ => unreachable!("index.rs only builds CreateIndex/DropIndex ops"),
    }
}

fn name_back(op: &TransactionOp) -> String {
    op_name(op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordBuilder;

    async fn dataset_with_vectors(dir: &std::path::Path) -> FrameDataset {
        let ds = FrameDataset::create(dir.to_str().unwrap(), 3).await.unwrap();
        let schema = ds.schema().await;
        for i in 0..20i64 {
            let base = (i % 2) as f32 * 10.0;
            let record = RecordBuilder::new(format!("doc-{i}"))
                .vector(vec![base + i as f32 * 0.1, base, base])
                .status(if i % 2 == 0 { "even" } else { "odd" })
                .tag(if i % 3 == 0 { "fizz" } else { "plain" })
                .text_content(format!("document number {i} about rust programming"))
                .build(&schema)
                .unwrap();
            ds.add(record).await.unwrap();
        }
        ds
    }

    #[tokio::test]
    async fn vector_index_builds_and_loads() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dataset_with_vectors(dir.path()).await;
        ds.create_vector_index("vec_idx", "vector", VectorIndexParams::default()).await.unwrap();
        let loaded = ds.ensure_vector_index_loaded("vec_idx").await.unwrap();
        assert_eq!(loaded.num_partitions(), 1);
    }

    #[tokio::test]
    async fn scalar_index_is_rebuilt_lazily_after_invalidation() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dataset_with_vectors(dir.path()).await;
        ds.create_scalar_index("status_idx", "status", IndexKind::Bitmap).await.unwrap();
        let first = ds.ensure_scalar_index_loaded("status_idx").await.unwrap();
        match &*first {
            ScalarIndexState::Bitmap(b) => assert_eq!(b.distinct_value_count(), 2),
            _ => panic!("expected bitmap index"),
        }

        ds.delete(crate::dataset::DeleteSelector::Predicate("status = 'odd'".to_string())).await.unwrap();
        let rebuilt = ds.ensure_scalar_index_loaded("status_idx").await.unwrap();
        match &*rebuilt {
            ScalarIndexState::Bitmap(b) => assert_eq!(b.distinct_value_count(), 1),
            _ => panic!("expected bitmap index"),
        }
    }

    #[tokio::test]
    async fn fts_index_round_trips_tokenizer_config() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dataset_with_vectors(dir.path()).await;
        ds.create_fts_index("fts_idx", "text_content", TokenizerConfig::default()).await.unwrap();
        let index = ds.ensure_fts_index_loaded("fts_idx").await.unwrap();
        assert_eq!(index.document_count(), 20);
    }

    #[tokio::test]
    async fn drop_index_removes_catalog_entry() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dataset_with_vectors(dir.path()).await;
        ds.create_scalar_index("status_idx", "status", IndexKind::Bitmap).await.unwrap();
        assert_eq!(ds.list_indices().await.len(), 1);
        ds.drop_index("status_idx").await.unwrap();
        assert!(ds.list_indices().await.is_empty());
        let err = ds.ensure_scalar_index_loaded("status_idx").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
