// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! A small k-means trainer shared by the IVF coarse quantizer and the PQ
//! sub-codebooks (§4.5).

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use super::metric::{l2_squared, DistanceMetric};

#[derive(Debug, Clone)]
pub struct KMeansParams {
    pub k: usize,
    pub max_iters: usize,
    pub metric: DistanceMetric,
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            k: 1,
            max_iters: 20,
            metric: DistanceMetric::L2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KMeansResult {
    pub centroids: Vec<Vec<f32>>,
    pub assignments: Vec<u32>,
}

/// The minimum sample size the design recommends before training `k`
/// centroids: `max(256*k, 50*k)`, i.e. `256*k` (§4.5).
pub fn recommended_sample_size(k: usize) -> usize {
    (256 * k).max(50 * k)
}

/// Train `k` centroids over `vectors` via Lloyd's algorithm with
/// k-means++ initialization. `vectors` is assumed already sampled down
/// to the caller's memory budget.
pub fn train(vectors: &[Vec<f32>], params: &KMeansParams) -> KMeansResult {
    assert!(!vectors.is_empty(), "cannot train k-means on an empty sample");
    let k = params.k.min(vectors.len()).max(1);
    let dim = vectors[0].len();

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut centroids = kmeans_plus_plus_init(vectors, k, params.metric, &mut rng);

    let mut assignments = vec![0u32; vectors.len()];
    for _ in 0..params.max_iters {
        let mut changed = false;
        for (i, v) in vectors.iter().enumerate() {
            let nearest = nearest_centroid(v, &centroids, params.metric);
            if assignments[i] != nearest as u32 {
                assignments[i] = nearest as u32;
                changed = true;
            }
        }

        let mut sums = vec![vec![0f32; dim]; k];
        let mut counts = vec![0u32; k];
        for (v, &a) in vectors.iter().zip(assignments.iter()) {
            let a = a as usize;
            counts[a] += 1;
            for (s, x) in sums[a].iter_mut().zip(v.iter()) {
                *s += x;
            }
        }
        for c in 0..k {
            if counts[c] == 0 {
                // Re-seed a dead centroid from a random point, avoiding an
                // empty partition.
                centroids[c] = vectors.choose(&mut rng).unwrap().clone();
                continue;
            }
            for (s, x) in sums[c].iter().zip(centroids[c].iter_mut()) {
                *x = s / counts[c] as f32;
            }
        }

        if !changed {
            break;
        }
    }

    KMeansResult {
        centroids,
        assignments,
    }
}

pub fn nearest_centroid(v: &[f32], centroids: &[Vec<f32>], metric: DistanceMetric) -> usize {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, metric.distance(v, c)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn kmeans_plus_plus_init(
    vectors: &[Vec<f32>],
    k: usize,
    metric: DistanceMetric,
    rng: &mut impl Rng,
) -> Vec<Vec<f32>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(vectors.choose(rng).unwrap().clone());

    while centroids.len() < k {
        let weights: Vec<f32> = vectors
            .iter()
            .map(|v| {
                centroids
                    .iter()
                    .map(|c| metric.distance(v, c))
                    .fold(f32::INFINITY, f32::min)
                    .max(0.0)
            })
            .collect();
        let total: f32 = weights.iter().sum();
        if total <= 0.0 {
            centroids.push(vectors.choose(rng).unwrap().clone());
            continue;
        }
        let mut target = rng.random::<f32>() * total;
        let mut chosen = vectors.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            if target <= *w {
                chosen = i;
                break;
            }
            target -= w;
        }
        centroids.push(vectors[chosen].clone());
    }
    centroids
}

/// Squared-L2-only convenience used by PQ sub-codebook training, where
/// the metric is always L2 over the sub-vector regardless of the
/// top-level index metric.
pub fn train_l2(vectors: &[Vec<f32>], k: usize, seed: u64) -> KMeansResult {
    train(
        vectors,
        &KMeansParams {
            k,
            max_iters: 20,
            metric: DistanceMetric::L2,
            seed,
        },
    )
}

pub fn inertia(vectors: &[Vec<f32>], result: &KMeansResult) -> f32 {
    vectors
        .iter()
        .zip(result.assignments.iter())
        .map(|(v, &a)| l2_squared(v, &result.centroids[a as usize]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clusters_two_well_separated_blobs() {
        let mut vectors = Vec::new();
        for _ in 0..20 {
            vectors.push(vec![0.0, 0.0]);
            vectors.push(vec![10.0, 10.0]);
        }
        let result = train_l2(&vectors, 2, 7);
        assert_eq!(result.centroids.len(), 2);
        // Every point assigned to cluster matching its blob.
        for (v, &a) in vectors.iter().zip(result.assignments.iter()) {
            let centroid = &result.centroids[a as usize];
            let dist_to_own = l2_squared(v, centroid);
            assert!(dist_to_own < 5.0, "point {v:?} too far from its centroid {centroid:?}");
        }
    }

    #[test]
    fn recommended_sample_size_matches_design_formula() {
        assert_eq!(recommended_sample_size(10), 2560);
        assert_eq!(recommended_sample_size(1), 256);
    }
}
