// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Blob handles (§9 design note): `raw_data` is stored in a per-fragment
//! side file rather than inline in the row, so large payloads never pass
//! through the columnar path unless a caller actually asks for them.

use std::sync::Arc;

use contextframe_core::error::Result;
use contextframe_io::FrameObjectStore;
use object_store::path::Path;

/// A reference to a byte range within a fragment's blob side-store.
/// Bytes are only fetched from the backing [`FrameObjectStore`] when
/// [`BlobHandle::read`] or [`BlobHandle::read_range`] is called.
#[derive(Debug, Clone)]
pub struct BlobHandle {
    store: Arc<FrameObjectStore>,
    path: Path,
    offset: u64,
    len: u64,
}

impl BlobHandle {
    pub fn new(store: Arc<FrameObjectStore>, path: Path, offset: u64, len: u64) -> Self {
        Self { store, path, offset, len }
    }

    /// Total length of the blob, in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the entire blob.
    pub async fn read(&self) -> Result<Vec<u8>> {
        self.read_range(0, self.len).await
    }

    /// Read `length` bytes starting at `start`, clamped to the blob's
    /// extent.
    pub async fn read_range(&self, start: u64, length: u64) -> Result<Vec<u8>> {
        let start = start.min(self.len);
        let end = (start + length).min(self.len);
        let absolute_start = self.offset + start;
        let absolute_end = self.offset + end;
        let bytes = self
            .store
            .get_range(&self.path, absolute_start..absolute_end)
            .await?;
        Ok(bytes.to_vec())
    }
}
