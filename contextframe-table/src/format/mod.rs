// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! The on-disk format types (§4.3, §6.3): fragments, deletion vectors,
//! the index catalog, and the manifest that ties them together into one
//! committed snapshot.

pub mod deletion;
pub mod fragment;
pub mod index_catalog;
pub mod manifest;

pub use deletion::{DeletionVector, DeletionVectorRef};
pub use fragment::{BlobRef, ColumnStatistics, DataFile, Fragment};
pub use index_catalog::{DeltaSegment, IndexCatalogEntry, IndexKind};
pub use manifest::{Manifest, ManifestSummary, WriterVersion};
