// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! The hybrid query planner and lazy scanner (§4.7): predicate scans,
//! KNN search and full-text search, plus the discrete planner
//! decisions each one is built from.
//!
//! A scan is a lazy, finite, single-pass [`futures::stream::Stream`]
//! (§9 design note: no restart, no generator-style resumable
//! iterator); KNN and full-text search instead block until their full
//! ranked result list is assembled, matching §5's blocking-API
//! contract for anything that must return a total order.

use std::collections::HashSet;
use std::sync::Arc;

use contextframe_core::error::{Error, Result};
use contextframe_index::fts::TokenizerConfig;
use contextframe_index::vector::{KnnQuery, RowAddress, RowPredicate};
use contextframe_io::object_store::FrameObjectStore;
use contextframe_table::format::{Fragment, IndexCatalogEntry, IndexKind};
use contextframe_table::schema::DatasetSchema;
use contextframe_table::Record;
use futures::stream::{self, Stream, StreamExt};

use crate::dataset::store::{core_field_ids, record_column_value, FragmentReader};
use crate::dataset::FrameDataset;
use crate::filter::{self, Predicate};

const DEFAULT_BATCH_SIZE: usize = 1024;

/// Parameters for a predicate-filtered, optionally-projected scan
/// (§4.7, §6.2).
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub filter: Option<String>,
    pub columns: Option<Vec<String>>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub batch_size: Option<usize>,
}

/// One chunk of a scan's results. The physical encoding (§6.3) is a
/// row-major JSON column store rather than Arrow, so a batch here is a
/// contiguous `Vec<Record>` rather than a columnar buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    pub records: Vec<Record>,
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A KNN query against a named vector index (§4.5, §6.2).
#[derive(Debug, Clone)]
pub struct NearestQuery {
    pub vector: Vec<f32>,
    pub k: usize,
    pub nprobes: Option<usize>,
    pub refine_factor: Option<usize>,
    /// Restricts candidates to rows also matching this predicate
    /// (§4.7 decision 2: prefilter vs postfilter).
    pub filter: Option<String>,
}

/// A ranked KNN hit, carrying the distance the index computed so
/// callers can threshold or display it (§4.5).
#[derive(Debug, Clone)]
pub struct NearestResult {
    pub record: Record,
    pub distance: f32,
}

/// A full-text query against a named BM25 index (§4.6, §6.2).
#[derive(Debug, Clone)]
pub struct FullTextQuery {
    pub query: String,
    pub limit: usize,
    pub filter: Option<String>,
}

/// A ranked full-text hit.
#[derive(Debug, Clone)]
pub struct FullTextResult {
    pub record: Record,
    pub score: f32,
}

/// Planner decision 1 (§4.7): which catalog entries a predicate can use
/// to narrow candidates before a row is ever materialized. Only
/// non-FTS scalar indices are eligible here; FTS participates through
/// [`fuse_knn_fts`] instead.
pub fn select_indices(predicate: &Predicate, available: &[IndexCatalogEntry]) -> Vec<String> {
    let mut columns = Vec::new();
    predicate.referenced_columns(&mut columns);
    available
        .iter()
        .filter(|entry| entry.kind.is_scalar() && entry.kind != IndexKind::Fts && columns.contains(&entry.column))
        .map(|entry| entry.name.clone())
        .collect()
}

/// Planner decision 2 (§4.7): prefilter a KNN candidate set when the
/// predicate is estimated to reject most of the dataset (prefiltering
/// then costs index-probe time proportional to what survives);
/// otherwise probe unfiltered and postfilter the ranked output, which
/// is cheaper when the predicate keeps nearly everything.
pub fn choose_prefilter(estimated_selectivity: f64) -> bool {
    estimated_selectivity < 0.3
}

/// Planner decision 3 (§4.7): split a projection into the columns a
/// scan's phase-1 (filter/order) pass must read and the columns a
/// phase-2 pass materializes only for rows that survive phase 1.
pub fn late_materialize(schema: &DatasetSchema, predicate_columns: &[String], projection: Option<&[String]>) -> (HashSet<i32>, HashSet<i32>) {
    let mut phase1 = core_field_ids(schema);
    for col in predicate_columns {
        if let Some(field) = schema.field_by_name(col) {
            phase1.insert(field.id);
        }
    }
    let phase2 = match projection {
        None => schema.field_ids().into_iter().collect(),
        Some(cols) => {
            let mut ids = phase1.clone();
            for col in cols {
                if let Some(field) = schema.field_by_name(col) {
                    ids.insert(field.id);
                }
            }
            ids
        }
    };
    (phase1, phase2)
}

/// Planner decision 4 (§4.7): the order fragments are visited in. A
/// scan always visits them in ascending fragment-id order so results
/// are stable across repeated scans of the same snapshot; this is a
/// named decision point rather than an accident of `Vec` order so a
/// future cost-based reordering (e.g. statistics-driven pruning first)
/// has one place to change.
pub fn fragment_order(fragments: &[Fragment]) -> Vec<u64> {
    let mut ids: Vec<u64> = fragments.iter().map(|f| f.id).collect();
    ids.sort_unstable();
    ids
}

/// Planner decision 5 (§4.7): fuse a KNN ranking with a full-text
/// ranking. KNN runs first and establishes candidate order; FTS then
/// acts as a postfilter (drop candidates absent from the FTS results)
/// and a rescore (blend in the BM25 score), rather than a second
/// independent ranking round (§4.6: FTS fusion is KNN-first).
pub fn fuse_knn_fts(knn: Vec<(RowAddress, f32)>, fts: &[(RowAddress, f32)], fts_weight: f32) -> Vec<(RowAddress, f32)> {
    if fts.is_empty() {
        return knn;
    }
    let fts_scores: std::collections::HashMap<RowAddress, f32> = fts.iter().copied().collect();
    let mut fused: Vec<(RowAddress, f32)> = knn
        .into_iter()
        .filter_map(|(row, distance)| fts_scores.get(&row).map(|&score| (row, distance - fts_weight * score)))
        .collect();
    fused.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    fused
}

async fn matching_row_addresses(
    store: &FrameObjectStore,
    fragments: &[Fragment],
    schema: &DatasetSchema,
    predicate: &Predicate,
) -> Result<HashSet<RowAddress>> {
    let mut columns = Vec::new();
    predicate.referenced_columns(&mut columns);
    let mut field_ids = core_field_ids(schema);
    for col in &columns {
        if let Some(field) = schema.field_by_name(col) {
            field_ids.insert(field.id);
        }
    }

    let mut matches = HashSet::new();
    for fragment in fragments {
        let rows = FragmentReader::read(store, fragment, schema, &field_ids, false).await?;
        for (addr, record) in rows {
            if filter::eval(predicate, &|name| record_column_value(&record, schema, name))? {
                matches.insert(addr);
            }
        }
    }
    Ok(matches)
}

/// A lazy, single-pass scan over one dataset snapshot (§4.7, §9
/// design note).
pub struct Scanner {
    store: Arc<FrameObjectStore>,
    schema: DatasetSchema,
    fragments: Vec<Fragment>,
    predicate: Option<Predicate>,
    field_ids: HashSet<i32>,
    limit: Option<usize>,
    offset: usize,
    batch_size: usize,
}

impl Scanner {
    /// Consume the scanner into a lazy stream of [`RecordBatch`]es.
    /// Each fragment is read only as the stream is polled; a caller
    /// who stops consuming early never pays for fragments beyond
    /// wherever they stopped.
    pub fn into_stream(self) -> impl Stream<Item = Result<RecordBatch>> {
        let Scanner { store, schema, fragments, predicate, field_ids, limit, offset, batch_size } = self;
        let mut remaining_skip = offset;
        let mut remaining_take = limit;
        let mut exhausted = false;

        stream::unfold(
            (fragments.into_iter(), Vec::<Record>::new()),
            move |(mut frag_iter, mut pending)| {
                let store = Arc::clone(&store);
                let schema = schema.clone();
                let predicate = predicate.clone();
                let field_ids = field_ids.clone();
                async move {
                    if exhausted {
                        return None;
                    }
                    while pending.len() < batch_size {
                        let Some(fragment) = frag_iter.next() else { break };
                        let rows = match FragmentReader::read(&store, &fragment, &schema, &field_ids, false).await {
                            Ok(rows) => rows,
                            Err(e) => return Some((Err(e), (frag_iter, pending))),
                        };
                        for (_, record) in rows {
                            let keep = match &predicate {
                                None => true,
                                Some(p) => {
                                    match filter::eval(p, &|name| record_column_value(&record, &schema, name)) {
                                        Ok(b) => b,
                                        Err(e) => return Some((Err(e), (frag_iter, pending))),
                                    }
                                }
                            };
                            if !keep {
                                continue;
                            }
                            if remaining_skip > 0 {
                                remaining_skip -= 1;
                                continue;
                            }
                            if let Some(take) = remaining_take {
                                if take == 0 {
                                    exhausted = true;
                                    break;
                                }
                            }
                            pending.push(record);
                            if let Some(take) = remaining_take.as_mut() {
                                *take -= 1;
                                if *take == 0 {
                                    exhausted = true;
                                    break;
                                }
                            }
                        }
                        if exhausted {
                            break;
                        }
                    }
                    if pending.is_empty() {
                        None
                    } else {
                        let batch = RecordBatch { records: std::mem::take(&mut pending) };
                        Some((Ok(batch), (frag_iter, pending)))
                    }
                }
            },
        )
    }
}

impl FrameDataset {
    /// Build a lazy [`Scanner`] over the current snapshot (§4.7, §6.2).
    pub async fn scanner(&self, request: ScanRequest) -> Result<Scanner> {
        let manifest = self.current_manifest().await;
        let schema = manifest.schema.clone();
        let predicate = request.filter.as_deref().map(filter::parse).transpose()?;

        let predicate_columns = predicate
            .as_ref()
            .map(|p| {
                let mut cols = Vec::new();
                p.referenced_columns(&mut cols);
                cols
            })
            .unwrap_or_default();
        let (field_ids, _) = late_materialize(&schema, &predicate_columns, request.columns.as_deref());

        let ordered_ids = fragment_order(&manifest.fragments);
        let fragments: Vec<Fragment> = ordered_ids
            .into_iter()
            .filter_map(|id| manifest.fragments.iter().find(|f| f.id == id).cloned())
            .collect();

        Ok(Scanner {
            store: Arc::clone(&self.store),
            schema,
            fragments,
            predicate,
            field_ids,
            limit: request.limit,
            offset: request.offset,
            batch_size: request.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
        })
    }

    /// Eagerly drain a scan into batches. Most callers that don't need
    /// true streaming use this instead of `scanner(..).into_stream()`.
    pub async fn to_batches(&self, request: ScanRequest) -> Result<Vec<RecordBatch>> {
        let scanner = self.scanner(request).await?;
        scanner.into_stream().collect::<Vec<_>>().await.into_iter().collect()
    }

    /// Run a KNN search against a named vector index, blocking until
    /// the full ranked list is assembled (§4.5, §5).
    pub async fn knn_search(&self, index_name: &str, query: NearestQuery) -> Result<Vec<NearestResult>> {
        let index = self.ensure_vector_index_loaded(index_name).await?;
        let manifest = self.current_manifest().await;
        let schema = manifest.schema.clone();

        let predicate = query.filter.as_deref().map(filter::parse).transpose()?;
        let prefilter_set = match &predicate {
            Some(p) => Some(matching_row_addresses(&self.store, &manifest.fragments, &schema, p).await?),
            None => None,
        };
        let prefilter: Option<RowPredicate> =
            prefilter_set.map(|set| Arc::new(move |addr: RowAddress| set.contains(&addr)) as RowPredicate);

        let knn_query = KnnQuery {
            vector: query.vector.clone(),
            k: query.k,
            nprobes: query.nprobes,
            refine_factor: query.refine_factor,
            prefilter,
            postfilter: None,
            filter_nan: true,
        };
        // `VectorIndex::knn` is a CPU-bound codebook/graph search; run it
        // on the blocking pool so it doesn't monopolize the async worker
        // thread it would otherwise run on inline.
        let hits = tokio::task::spawn_blocking(move || index.knn(&knn_query))
            .await
            .map_err(|e| Error::internal(format!("KNN search task panicked: {e}")))??;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let fragment = manifest
                .fragments
                .iter()
                .find(|f| f.id == hit.row.fragment_id)
                .ok_or_else(|| Error::corruption("KNN hit referenced a fragment no longer in the manifest"))?;
            let field_ids: HashSet<i32> = schema.field_ids().into_iter().collect();
            if let Some(record) = FragmentReader::read_one(&self.store, fragment, &schema, hit.row.offset, &field_ids).await? {
                results.push(NearestResult { record, distance: hit.distance });
            }
        }
        Ok(results)
    }

    /// Run a BM25 full-text search against a named index, blocking
    /// until the full ranked list is assembled (§4.6, §5).
    pub async fn full_text_search(&self, index_name: &str, query: FullTextQuery) -> Result<Vec<FullTextResult>> {
        let index = self.ensure_fts_index_loaded(index_name).await?;
        let manifest = self.current_manifest().await;
        let schema = manifest.schema.clone();

        let predicate = query.filter.as_deref().map(filter::parse).transpose()?;
        let allowed = match &predicate {
            Some(p) => Some(matching_row_addresses(&self.store, &manifest.fragments, &schema, p).await?),
            None => None,
        };

        let hits = index.search_text(&query.query, &TokenizerConfig::default(), query.limit);
        let mut results = Vec::with_capacity(hits.len());
        for (row, score) in hits {
            if let Some(allowed) = &allowed {
                if !allowed.contains(&row) {
                    continue;
                }
            }
            let fragment = manifest
                .fragments
                .iter()
                .find(|f| f.id == row.fragment_id)
                .ok_or_else(|| Error::corruption("FTS hit referenced a fragment no longer in the manifest"))?;
            let field_ids: HashSet<i32> = schema.field_ids().into_iter().collect();
            if let Some(record) = FragmentReader::read_one(&self.store, fragment, &schema, row.offset, &field_ids).await? {
                results.push(FullTextResult { record, score });
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::OpenOptions;
    use crate::RecordBuilder;
    use contextframe_index::vector::VectorIndexParams;
    use futures::StreamExt as _;

    async fn populated_dataset(dir: &std::path::Path) -> FrameDataset {
        let ds = FrameDataset::create_with_options(dir.to_str().unwrap(), 3, OpenOptions::default()).await.unwrap();
        let schema = ds.schema().await;
        for i in 0..30i64 {
            let base = (i % 2) as f32 * 10.0;
            let record = RecordBuilder::new(format!("doc-{i}"))
                .vector(vec![base + i as f32 * 0.05, base, base])
                .status(if i % 2 == 0 { "even" } else { "odd" })
                .text_content(format!("row {i} talks about rust and databases"))
                .build(&schema)
                .unwrap();
            ds.add(record).await.unwrap();
        }
        ds
    }

    #[tokio::test]
    async fn scan_honors_filter_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let ds = populated_dataset(dir.path()).await;
        let request = ScanRequest { filter: Some("status = 'even'".to_string()), limit: Some(5), ..Default::default() };
        let batches = ds.to_batches(request).await.unwrap();
        let total: usize = batches.iter().map(RecordBatch::len).sum();
        assert_eq!(total, 5);
    }

    #[tokio::test]
    async fn scan_stream_yields_all_matching_rows_without_a_limit() {
        let dir = tempfile::tempdir().unwrap();
        let ds = populated_dataset(dir.path()).await;
        let scanner = ds.scanner(ScanRequest { filter: Some("status = 'odd'".to_string()), ..Default::default() }).await.unwrap();
        let mut stream = Box::pin(scanner.into_stream());
        let mut total = 0;
        while let Some(batch) = stream.next().await {
            total += batch.unwrap().len();
        }
        assert_eq!(total, 15);
    }

    #[tokio::test]
    async fn knn_search_respects_prefilter() {
        let dir = tempfile::tempdir().unwrap();
        let ds = populated_dataset(dir.path()).await;
        ds.create_vector_index("vec_idx", "vector", VectorIndexParams::default()).await.unwrap();

        let results = ds
            .knn_search(
                "vec_idx",
                NearestQuery { vector: vec![0.0, 0.0, 0.0], k: 5, nprobes: None, refine_factor: Some(2), filter: Some("status = 'even'".to_string()) },
            )
            .await
            .unwrap();
        assert!(!results.is_empty());
        for hit in &results {
            assert_eq!(hit.record.status.as_deref(), Some("even"));
        }
    }

    #[tokio::test]
    async fn full_text_search_ranks_relevant_rows_first() {
        let dir = tempfile::tempdir().unwrap();
        let ds = populated_dataset(dir.path()).await;
        ds.create_fts_index("fts_idx", "text_content", TokenizerConfig::default()).await.unwrap();

        let results = ds
            .full_text_search("fts_idx", FullTextQuery { query: "rust databases".to_string(), limit: 10, filter: None })
            .await
            .unwrap();
        assert!(!results.is_empty());
    }
}
