// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! The combined vector index (§4.5): an IVF partitioning layer over
//! either a flat PQ-encoded list per partition (`IVF_PQ`) or an HNSW
//! graph per partition (`IVF_HNSW`), plus the `knn()` search contract.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use contextframe_core::error::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::hnsw::{HnswGraph, HnswParams};
use super::ivf::IvfModel;
use super::metric::{has_nan, DistanceMetric};
use super::pq::PqCodebook;

/// A row address: the `(fragment_id, offset)` pair a KNN result needs
/// to rejoin back to record data, packed for the default ascending
/// tie-break (§9 Open Question: ties broken on ascending row address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowAddress {
    pub fragment_id: u64,
    pub offset: u32,
}

impl RowAddress {
    pub fn new(fragment_id: u64, offset: u32) -> Self {
        Self { fragment_id, offset }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexVariant {
    IvfPq,
    IvfHnsw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndexParams {
    pub variant: IndexVariant,
    pub metric: DistanceMetric,
    pub num_partitions: usize,
    pub pq_subvectors: usize,
    pub pq_bits: u8,
    pub hnsw: HnswParams,
    pub minimum_nprobes: usize,
    pub maximum_nprobes: usize,
    pub seed: u64,
}

impl Default for VectorIndexParams {
    fn default() -> Self {
        Self {
            variant: IndexVariant::IvfPq,
            metric: DistanceMetric::L2,
            num_partitions: 1,
            pq_subvectors: 8,
            pq_bits: 8,
            hnsw: HnswParams::default(),
            minimum_nprobes: 1,
            maximum_nprobes: 1,
            seed: 0,
        }
    }
}

#[derive(Serialize, Deserialize)]
enum PartitionStore {
    Pq {
        codebook: PqCodebook,
        /// `(row, pq code, raw vector)`. The raw vector is kept
        /// alongside the PQ code so `refine_exact` can rescore a
        /// shortlist by true distance instead of the asymmetric
        /// PQ-table approximation (§4.5 `refine_factor` contract).
        entries: Vec<(RowAddress, Vec<u16>, Vec<f32>)>,
    },
    Hnsw {
        graph: HnswGraph,
        addresses: Vec<RowAddress>,
    },
}

#[derive(Serialize, Deserialize)]
pub struct VectorIndex {
    params: VectorIndexParams,
    ivf: IvfModel,
    partitions: Vec<PartitionStore>,
}

/// A row-address predicate usable from any thread a query is evaluated
/// on, including the `rayon` pool `knn()` fans its per-partition search
/// out to.
pub type RowPredicate = Arc<dyn Fn(RowAddress) -> bool + Send + Sync>;

pub struct KnnQuery {
    pub vector: Vec<f32>,
    pub k: usize,
    /// Requested probe count, clamped into
    /// `[minimum_nprobes, maximum_nprobes]`.
    pub nprobes: Option<usize>,
    /// Fetch `k * refine_factor` raw candidates, then re-rank them
    /// exactly, before truncating to `k` (§4.5).
    pub refine_factor: Option<usize>,
    /// A prefilter restricts candidate row addresses before the index
    /// is probed; a postfilter is applied to scored results after.
    pub prefilter: Option<RowPredicate>,
    pub postfilter: Option<RowPredicate>,
    /// Excludes vectors containing NaN from the result set. Defaults
    /// to `true` at the scanner layer; exposed here for completeness.
    pub filter_nan: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnnHit {
    pub row: RowAddress,
    pub distance: f32,
}

impl VectorIndex {
    /// Train the index over a full in-memory build set. Maintenance's
    /// index-delta merge builds per-fragment deltas the same way and
    /// folds them in at a coarser granularity (§4.8).
    pub fn train(
        vectors: &[(RowAddress, Vec<f32>)],
        params: VectorIndexParams,
    ) -> Result<Self> {
        if vectors.is_empty() {
            return Err(Error::validation("cannot train a vector index on zero vectors", Vec::new()));
        }
        let dim = vectors[0].1.len();
        for (_, v) in vectors {
            if v.len() != dim {
                return Err(Error::validation(
                    "all vectors passed to vector index training must share one dimension",
                    Vec::new(),
                ));
            }
        }

        let raw: Vec<Vec<f32>> = vectors.iter().map(|(_, v)| v.clone()).collect();
        let ivf = IvfModel::train(&raw, params.num_partitions.max(1), params.metric, params.seed);

        let mut buckets: Vec<Vec<(RowAddress, Vec<f32>)>> = vec![Vec::new(); ivf.num_partitions()];
        for (addr, v) in vectors {
            let p = ivf.assign(v);
            buckets[p].push((*addr, v.clone()));
        }

        let mut partitions = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            match params.variant {
                IndexVariant::IvfPq => {
                    let vecs: Vec<Vec<f32>> = bucket.iter().map(|(_, v)| v.clone()).collect();
                    let codebook = if vecs.is_empty() {
                        PqCodebook::train(&raw[..1], params.pq_subvectors, params.pq_bits, params.seed)
                    } else {
                        PqCodebook::train(&vecs, params.pq_subvectors, params.pq_bits, params.seed)
                    };
                    let entries = bucket
                        .iter()
                        .map(|(addr, v)| (*addr, codebook.encode(v), v.clone()))
                        .collect();
                    partitions.push(PartitionStore::Pq { codebook, entries });
                }
                IndexVariant::IvfHnsw => {
                    let addresses: Vec<RowAddress> = bucket.iter().map(|(a, _)| *a).collect();
                    let vecs: Vec<Vec<f32>> = bucket.iter().map(|(_, v)| v.clone()).collect();
                    let graph = HnswGraph::build(vecs, params.hnsw.clone());
                    partitions.push(PartitionStore::Hnsw { graph, addresses });
                }
            }
        }

        Ok(Self { params, ivf, partitions })
    }

    pub fn variant(&self) -> IndexVariant {
        self.params.variant
    }

    pub fn metric(&self) -> DistanceMetric {
        self.params.metric
    }

    /// The KNN search contract: ascending distance order, `nprobes`
    /// clamped into range, optional prefilter/postfilter, and
    /// `refine_factor`-based re-ranking (§4.5). Each probed partition's
    /// codebook/graph search is CPU-bound and independent of the
    /// others, so they run on the `rayon` pool and are merged once all
    /// finish.
    pub fn knn(&self, query: &KnnQuery) -> Result<Vec<KnnHit>> {
        if query.filter_nan && has_nan(&query.vector) {
            return Err(Error::validation("query vector contains NaN", Vec::new()));
        }

        let nprobes = query
            .nprobes
            .unwrap_or(self.params.minimum_nprobes)
            .clamp(self.params.minimum_nprobes, self.params.maximum_nprobes.max(self.params.minimum_nprobes));
        let probe_order = self.ivf.probe_order(&query.vector);
        let probes: Vec<usize> = probe_order.into_iter().take(nprobes.max(1)).collect();

        let refine_k = query.k * query.refine_factor.unwrap_or(1).max(1);

        let per_partition: Vec<(Vec<KnnHit>, Vec<(RowAddress, &[f32])>)> = probes
            .par_iter()
            .map(|&p| {
                let mut hits = Vec::new();
                let mut raw = Vec::new();
                match &self.partitions[p] {
                    PartitionStore::Pq { codebook, entries } => {
                        let table = codebook.distance_table(&query.vector);
                        for (addr, code, vector) in entries {
                            if let Some(pre) = &query.prefilter {
                                if !pre(*addr) {
                                    continue;
                                }
                            }
                            let approx = PqCodebook::asymmetric_distance(&table, code);
                            hits.push(KnnHit { row: *addr, distance: approx });
                            raw.push((*addr, vector.as_slice()));
                        }
                    }
                    PartitionStore::Hnsw { graph, addresses } => {
                        let ef = refine_k.max(self.params.hnsw.ef_construction);
                        for (local_id, distance) in graph.search(&query.vector, ef) {
                            let addr = addresses[local_id as usize];
                            if let Some(pre) = &query.prefilter {
                                if !pre(addr) {
                                    continue;
                                }
                            }
                            hits.push(KnnHit { row: addr, distance });
                        }
                    }
                }
                (hits, raw)
            })
            .collect();

        let mut candidates: Vec<KnnHit> = Vec::new();
        let mut seen = HashSet::new();
        let mut raw_vectors: HashMap<RowAddress, &[f32]> = HashMap::new();
        for (hits, raw) in per_partition {
            for hit in hits {
                if seen.insert(hit.row) {
                    candidates.push(hit);
                }
            }
            for (addr, vector) in raw {
                raw_vectors.entry(addr).or_insert(vector);
            }
        }

        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.row.cmp(&b.row)));
        candidates.truncate(refine_k.max(query.k));

        if matches!(self.params.variant, IndexVariant::IvfPq) {
            // Exact re-rank of the PQ-approximate shortlist, per the
            // design's `refine_factor` contract: fetch more than `k`
            // approximately, then rescore precisely before truncating.
            self.refine_exact(&query.vector, &mut candidates, &raw_vectors);
        }

        if let Some(post) = &query.postfilter {
            candidates.retain(|hit| post(hit.row));
        }

        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.row.cmp(&b.row)));
        candidates.truncate(query.k);
        Ok(candidates)
    }

    /// Replace each candidate's PQ-approximate distance with the exact
    /// distance against its retained raw vector, so increasing
    /// `refine_factor` (which widens the shortlist this is called on)
    /// strictly improves candidate ordering rather than being a no-op.
    fn refine_exact(&self, query: &[f32], candidates: &mut [KnnHit], raw_vectors: &HashMap<RowAddress, &[f32]>) {
        for hit in candidates.iter_mut() {
            if let Some(raw) = raw_vectors.get(&hit.row) {
                hit.distance = self.params.metric.distance(query, raw);
            }
        }
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Serialize the trained index (centroids, codebooks/graphs and row
    /// addresses) for storage under `indices/<name>/` (§4.3).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::corruption(format!("failed to serialize vector index: {e}")))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::corruption(format!("failed to deserialize vector index: {e}")))
    }

    pub fn params(&self) -> &VectorIndexParams {
        &self.params
    }

    pub fn is_valid_for_row_count(&self, expected: usize) -> bool {
        let total: usize = self
            .partitions
            .iter()
            .map(|p| match p {
                PartitionStore::Pq { entries, .. } => entries.len(),
                PartitionStore::Hnsw { addresses, .. } => addresses.len(),
            })
            .sum();
        total == expected
    }
}

/// Residual computation used when training a per-partition PQ
/// codebook against centroid-subtracted vectors (an optional, more
/// accurate PQ variant the default `VectorIndex::train` does not use
/// but maintenance-driven re-training may opt into later).
pub fn residual(vector: &[f32], centroid: &[f32]) -> Vec<f32> {
    vector.iter().zip(centroid).map(|(v, c)| v - c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vectors() -> Vec<(RowAddress, Vec<f32>)> {
        let mut out = Vec::new();
        for i in 0..40u64 {
            let base = (i % 2) as f32 * 20.0;
            out.push((
                RowAddress::new(0, i as u32),
                vec![base + (i as f32) * 0.05, base, base],
            ));
        }
        out
    }

    #[test]
    fn knn_returns_k_results_in_ascending_distance_order() {
        let data = vectors();
        let params = VectorIndexParams {
            variant: IndexVariant::IvfPq,
            metric: DistanceMetric::L2,
            num_partitions: 2,
            pq_subvectors: 1,
            pq_bits: 4,
            minimum_nprobes: 2,
            maximum_nprobes: 2,
            ..Default::default()
        };
        let index = VectorIndex::train(&data, params).unwrap();
        let query = KnnQuery {
            vector: vec![0.0, 0.0, 0.0],
            k: 5,
            nprobes: Some(2),
            refine_factor: Some(2),
            prefilter: None,
            postfilter: None,
            filter_nan: true,
        };
        let hits = index.knn(&query).unwrap();
        assert_eq!(hits.len(), 5);
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn knn_rejects_nan_query_by_default() {
        let data = vectors();
        let index = VectorIndex::train(&data, VectorIndexParams::default()).unwrap();
        let query = KnnQuery {
            vector: vec![f32::NAN, 0.0, 0.0],
            k: 1,
            nprobes: None,
            refine_factor: None,
            prefilter: None,
            postfilter: None,
            filter_nan: true,
        };
        assert!(index.knn(&query).is_err());
    }

    #[test]
    fn prefilter_excludes_rows_before_scoring() {
        let data = vectors();
        let index = VectorIndex::train(&data, VectorIndexParams {
            num_partitions: 1,
            minimum_nprobes: 1,
            maximum_nprobes: 1,
            pq_subvectors: 1,
            pq_bits: 4,
            ..Default::default()
        }).unwrap();
        let exclude: RowPredicate = Arc::new(|addr: RowAddress| addr.offset != 0);
        let query = KnnQuery {
            vector: vec![0.0, 0.0, 0.0],
            k: 5,
            nprobes: None,
            refine_factor: None,
            prefilter: Some(exclude),
            postfilter: None,
            filter_nan: true,
        };
        let hits = index.knn(&query).unwrap();
        assert!(hits.iter().all(|h| h.row.offset != 0));
    }
}
