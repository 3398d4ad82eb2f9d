// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Vector, scalar and full-text indices over a dataset (C5/C6).
//!
//! The vector index (`vector`) provides approximate nearest-neighbor
//! search via IVF partitioning combined with PQ or HNSW. The scalar
//! index family (`scalar`) accelerates equality, range, label-set and
//! substring predicates. The full-text module (`fts`) tokenizes and
//! BM25-scores free-text fields.

pub mod fts;
pub mod scalar;
pub mod vector;

pub use vector::{IndexVariant, KnnHit, KnnQuery, RowAddress, RowPredicate, VectorIndex, VectorIndexParams};
