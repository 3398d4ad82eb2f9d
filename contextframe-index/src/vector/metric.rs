// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Distance metrics for the vector index (§4.5).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    L2,
    Cosine,
    Dot,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        Self::L2
    }
}

impl DistanceMetric {
    /// Cosine normalizes vectors before distance is computed; L2/Dot do
    /// not (§4.5).
    pub fn normalizes(&self) -> bool {
        matches!(self, Self::Cosine)
    }

    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        match self {
            Self::L2 => l2_squared(a, b),
            Self::Cosine => cosine_distance(a, b),
            Self::Dot => -dot(a, b),
        }
    }
}

pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

pub fn normalize(v: &mut [f32]) {
    let n = norm(v);
    if n > 0.0 {
        for x in v.iter_mut() {
            *x /= n;
        }
    }
}

pub fn normalized(v: &[f32]) -> Vec<f32> {
    let mut out = v.to_vec();
    normalize(&mut out);
    out
}

/// `1 - cosine_similarity`, so smaller is still "closer" like the other
/// metrics.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        return 1.0;
    }
    1.0 - dot(a, b) / denom
}

/// A vector is excluded from search results by default when it contains
/// NaN (§4.5 `filter_nan=true`).
pub fn has_nan(v: &[f32]) -> bool {
    v.iter().any(|x| x.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn l2_of_identical_vectors_is_zero() {
        let a = [1.0, 2.0, 3.0];
        assert_eq!(DistanceMetric::L2.distance(&a, &a), 0.0);
    }

    #[test]
    fn cosine_distance_of_parallel_vectors_is_zero() {
        let a = [1.0, 2.0, 3.0];
        let b = [2.0, 4.0, 6.0];
        assert_relative_eq!(DistanceMetric::Cosine.distance(&a, &b), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn dot_distance_is_negative_inner_product() {
        let a = [1.0, 0.0];
        let b = [1.0, 0.0];
        assert_eq!(DistanceMetric::Dot.distance(&a, &b), -1.0);
    }

    #[test]
    fn nan_detection() {
        assert!(has_nan(&[1.0, f32::NAN]));
        assert!(!has_nan(&[1.0, 2.0]));
    }
}
