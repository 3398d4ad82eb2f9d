// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! The vector index (C5, §4.5): IVF coarse partitioning combined with
//! either PQ (`IVF_PQ`) or HNSW (`IVF_HNSW`) for the fine-grained
//! search within a partition.

pub mod hnsw;
pub mod index;
pub mod ivf;
pub mod kmeans;
pub mod metric;
pub mod pq;

pub use hnsw::{HnswGraph, HnswParams};
pub use index::{IndexVariant, KnnHit, KnnQuery, RowAddress, RowPredicate, VectorIndex, VectorIndexParams};
pub use ivf::IvfModel;
pub use metric::DistanceMetric;
pub use pq::PqCodebook;
