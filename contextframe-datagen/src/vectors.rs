// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Synthetic embedding vectors, optionally clustered around a handful
//! of centers so vector-index tests have meaningful nearest-neighbor
//! structure to assert against instead of pure noise.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

#[derive(Debug, Clone)]
pub struct VectorParams {
    pub dim: usize,
    /// When non-empty, every generated vector is a Gaussian sample
    /// around a randomly chosen center from this list; otherwise
    /// vectors are pure standard-normal noise.
    pub num_clusters: usize,
    pub cluster_spread: f32,
    pub noise_std: f32,
    pub seed: u64,
}

impl Default for VectorParams {
    fn default() -> Self {
        Self {
            dim: 128,
            num_clusters: 1,
            cluster_spread: 10.0,
            noise_std: 1.0,
            seed: 0,
        }
    }
}

pub struct VectorGenerator {
    rng: StdRng,
    centers: Vec<Vec<f32>>,
    params: VectorParams,
}

impl VectorGenerator {
    pub fn new(params: VectorParams) -> Self {
        let mut rng = StdRng::seed_from_u64(params.seed);
        let spread = Normal::new(0.0, params.cluster_spread as f64).unwrap();
        let centers = (0..params.num_clusters.max(1))
            .map(|_| {
                (0..params.dim)
                    .map(|_| spread.sample(&mut rng) as f32)
                    .collect()
            })
            .collect();
        Self { rng, centers, params }
    }

    pub fn next_vector(&mut self) -> Vec<f32> {
        let center = &self.centers[self.rng.random_range(0..self.centers.len())];
        let noise = Normal::new(0.0, self.params.noise_std as f64).unwrap();
        center.iter().map(|c| c + noise.sample(&mut self.rng) as f32).collect()
    }

    pub fn generate(&mut self, n: usize) -> Vec<Vec<f32>> {
        (0..n).map(|_| self.next_vector()).collect()
    }

    pub fn cluster_centers(&self) -> &[Vec<f32>] {
        &self.centers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_have_the_requested_dimension() {
        let mut gen = VectorGenerator::new(VectorParams { dim: 16, ..Default::default() });
        let v = gen.next_vector();
        assert_eq!(v.len(), 16);
    }

    #[test]
    fn clustered_vectors_stay_near_their_center() {
        let mut gen = VectorGenerator::new(VectorParams {
            dim: 4,
            num_clusters: 1,
            cluster_spread: 0.0,
            noise_std: 0.01,
            seed: 1,
        });
        let vectors = gen.generate(20);
        let center = gen.cluster_centers()[0].clone();
        for v in vectors {
            for (a, b) in v.iter().zip(center.iter()) {
                assert!((a - b).abs() < 1.0);
            }
        }
    }
}
