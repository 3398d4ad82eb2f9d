// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! ContextFrame: a columnar, versioned document-management substrate for
//! AI/RAG workloads (§1-2).
//!
//! This crate is the dataset engine's public surface: [`dataset::FrameDataset`]
//! ties together the columnar store (`contextframe-table`/`dataset::store`),
//! the transaction/commit protocol (`transaction`), the hybrid query
//! planner (`scanner`), the relationship subsystem (`relationships`) and
//! maintenance operations (`maintenance`) under one consistency model.

pub mod blob;
pub mod dataset;
pub mod filter;
pub mod index;
pub mod maintenance;
pub mod relationships;
pub mod scanner;
pub mod transaction;

pub use blob::BlobHandle;
pub use contextframe_core::error::{Error, Result};
pub use contextframe_index::vector::{DistanceMetric, IndexVariant, VectorIndexParams};
pub use contextframe_table::format::IndexKind;
pub use contextframe_table::schema::DatasetSchema;
pub use contextframe_table::{
    new_record, Record, RecordBuilder, RecordType, Relationship, RelationshipTarget, RelationshipType,
    ValidationError,
};
pub use dataset::{FrameDataset, OpenOptions, Tag, VersionInfo, WriteParams};
pub use scanner::{FullTextQuery, NearestQuery, RecordBatch, ScanRequest, Scanner};
