// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! IVF coarse quantization: partitions the vector space into `k`
//! clusters so a KNN search only visits `nprobes` of them (§4.5).

use serde::{Deserialize, Serialize};

use super::kmeans::{self, KMeansParams};
use super::metric::{normalized, DistanceMetric};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvfModel {
    pub centroids: Vec<Vec<f32>>,
    pub metric: DistanceMetric,
}

impl IvfModel {
    pub fn train(vectors: &[Vec<f32>], num_partitions: usize, metric: DistanceMetric, seed: u64) -> Self {
        let prepared: Vec<Vec<f32>> = if metric.normalizes() {
            vectors.iter().map(|v| normalized(v)).collect()
        } else {
            vectors.to_vec()
        };
        let result = kmeans::train(
            &prepared,
            &KMeansParams {
                k: num_partitions,
                max_iters: 25,
                metric,
                seed,
            },
        );
        Self {
            centroids: result.centroids,
            metric,
        }
    }

    pub fn num_partitions(&self) -> usize {
        self.centroids.len()
    }

    /// The partition a vector is assigned to at write time.
    pub fn assign(&self, vector: &[f32]) -> usize {
        let prepared = if self.metric.normalizes() {
            normalized(vector)
        } else {
            vector.to_vec()
        };
        kmeans::nearest_centroid(&prepared, &self.centroids, self.metric)
    }

    /// The ordered list of partitions a query should probe, nearest
    /// centroid first, for use with `nprobes` (§4.5).
    pub fn probe_order(&self, query: &[f32]) -> Vec<usize> {
        let prepared = if self.metric.normalizes() {
            normalized(query)
        } else {
            query.to_vec()
        };
        let mut ranked: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, self.metric.distance(&prepared, c)))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked.into_iter().map(|(i, _)| i).collect()
    }
}

/// Row-address-to-partition assignment, one entry per row in a
/// fragment's index delta (§4.3 `DeltaSegment`, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IvfAssignment {
    pub partition_ids: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(center: f32, n: usize) -> Vec<Vec<f32>> {
        (0..n).map(|i| vec![center + (i as f32) * 0.01, center]).collect()
    }

    #[test]
    fn probe_order_ranks_nearest_partition_first() {
        let mut vectors = blob(0.0, 20);
        vectors.extend(blob(50.0, 20));
        let model = IvfModel::train(&vectors, 2, DistanceMetric::L2, 1);
        let probes = model.probe_order(&[0.0, 0.0]);
        assert_eq!(probes.len(), 2);
        let nearest_centroid = &model.centroids[probes[0]];
        assert!(nearest_centroid[0].abs() < 25.0);
    }

    #[test]
    fn assign_is_consistent_with_probe_order_head() {
        let mut vectors = blob(0.0, 20);
        vectors.extend(blob(50.0, 20));
        let model = IvfModel::train(&vectors, 2, DistanceMetric::L2, 1);
        for v in &vectors {
            let assigned = model.assign(v);
            let probes = model.probe_order(v);
            assert_eq!(assigned, probes[0]);
        }
    }
}
