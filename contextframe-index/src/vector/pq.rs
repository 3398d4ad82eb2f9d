// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Product quantization: splits each vector into `m` sub-vectors and
//! encodes each with its own `2^bits`-centroid codebook, trading recall
//! for an `m`-byte (at `bits=8`) per-vector residency (§4.5).

use serde::{Deserialize, Serialize};

use super::kmeans;
use super::metric::l2_squared;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PqCodebook {
    /// `m` sub-vector codebooks, each with `2^bits` centroids of
    /// dimension `dim / m`.
    pub sub_codebooks: Vec<Vec<Vec<f32>>>,
    pub num_subvectors: usize,
    pub bits: u8,
    pub dim: usize,
}

impl PqCodebook {
    fn sub_dim(&self) -> usize {
        self.dim / self.num_subvectors
    }

    fn num_centroids(&self) -> usize {
        1usize << self.bits
    }

    /// Train `m` independent sub-codebooks of `2^bits` centroids each,
    /// over the given residual (or raw) vectors. `dim` must be evenly
    /// divisible by `num_subvectors`.
    pub fn train(vectors: &[Vec<f32>], num_subvectors: usize, bits: u8, seed: u64) -> Self {
        assert!(!vectors.is_empty());
        let dim = vectors[0].len();
        assert_eq!(
            dim % num_subvectors,
            0,
            "vector dimension must be divisible by the number of PQ sub-vectors"
        );
        let sub_dim = dim / num_subvectors;
        let k = 1usize << bits;

        let mut sub_codebooks = Vec::with_capacity(num_subvectors);
        for s in 0..num_subvectors {
            let sub_vectors: Vec<Vec<f32>> = vectors
                .iter()
                .map(|v| v[s * sub_dim..(s + 1) * sub_dim].to_vec())
                .collect();
            let result = kmeans::train_l2(&sub_vectors, k, seed.wrapping_add(s as u64));
            sub_codebooks.push(result.centroids);
        }

        Self {
            sub_codebooks,
            num_subvectors,
            bits,
            dim,
        }
    }

    /// Encode a full-precision vector into `num_subvectors` centroid
    /// indices (the persisted PQ code).
    pub fn encode(&self, vector: &[f32]) -> Vec<u16> {
        let sub_dim = self.sub_dim();
        (0..self.num_subvectors)
            .map(|s| {
                let sub = &vector[s * sub_dim..(s + 1) * sub_dim];
                kmeans::nearest_centroid(sub, &self.sub_codebooks[s], super::metric::DistanceMetric::L2) as u16
            })
            .collect()
    }

    /// Reconstruct an approximate vector from a PQ code.
    pub fn decode(&self, code: &[u16]) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dim);
        for (s, &c) in code.iter().enumerate() {
            out.extend_from_slice(&self.sub_codebooks[s][c as usize]);
        }
        out
    }

    /// Build an asymmetric distance table: for each sub-vector, the
    /// squared L2 distance from the query's sub-vector to every
    /// centroid in that sub-codebook. Used to score codes without
    /// reconstructing them (the standard PQ ADC search path).
    pub fn distance_table(&self, query: &[f32]) -> Vec<Vec<f32>> {
        let sub_dim = self.sub_dim();
        (0..self.num_subvectors)
            .map(|s| {
                let q_sub = &query[s * sub_dim..(s + 1) * sub_dim];
                self.sub_codebooks[s]
                    .iter()
                    .map(|centroid| l2_squared(q_sub, centroid))
                    .collect()
            })
            .collect()
    }

    /// Approximate distance from a precomputed table to an encoded
    /// vector, summing the per-sub-vector lookups.
    pub fn asymmetric_distance(table: &[Vec<f32>], code: &[u16]) -> f32 {
        table
            .iter()
            .zip(code)
            .map(|(sub_table, &c)| sub_table[c as usize])
            .sum()
    }

    pub fn code_len_bytes(&self) -> usize {
        // bits<=8 in the default configuration packs one centroid index
        // per byte; larger `bits` would need bit-packing, which this
        // minimal codebook does not implement.
        assert!(self.bits <= 8, "bits > 8 requires bit-packed codes, not yet supported");
        self.num_subvectors
    }

    pub fn num_centroids_per_subvector(&self) -> usize {
        self.num_centroids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vectors() -> Vec<Vec<f32>> {
        let mut out = Vec::new();
        for i in 0..64 {
            let base = (i % 4) as f32 * 10.0;
            out.push(vec![base, base + 1.0, base + 2.0, base + 3.0]);
        }
        out
    }

    #[test]
    fn encode_decode_round_trip_is_approximately_faithful() {
        let vectors = sample_vectors();
        let codebook = PqCodebook::train(&vectors, 2, 4, 3);
        for v in &vectors {
            let code = codebook.encode(v);
            let reconstructed = codebook.decode(&code);
            let err = l2_squared(v, &reconstructed);
            assert!(err < 4.0, "reconstruction error too high: {err}");
        }
    }

    #[test]
    fn asymmetric_distance_matches_direct_reconstruction_distance() {
        let vectors = sample_vectors();
        let codebook = PqCodebook::train(&vectors, 2, 4, 3);
        let query = &vectors[0];
        let table = codebook.distance_table(query);
        for v in &vectors {
            let code = codebook.encode(v);
            let adc = PqCodebook::asymmetric_distance(&table, &code);
            let direct = l2_squared(query, &codebook.decode(&code));
            assert!((adc - direct).abs() < 1e-4);
        }
    }
}
