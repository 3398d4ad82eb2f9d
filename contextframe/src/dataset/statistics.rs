// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Dataset storage statistics (§4.9 supplement, grounded on the
//! teacher's `dataset/statistics.rs`): bytes-on-disk per field, computed
//! by streaming the current manifest's fragments rather than keeping a
//! running total that could drift from reality.

use std::collections::HashMap;
use std::sync::Arc;

use contextframe_core::error::Result;
use contextframe_io::FrameObjectStore;
use contextframe_table::format::Manifest;
use futures::stream::{self, StreamExt, TryStreamExt};
use object_store::path::Path;
use serde::{Deserialize, Serialize};

/// Bytes on disk for one field, summed across every data file that
/// stores it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldStatistics {
    pub id: i32,
    pub bytes_on_disk: u64,
}

/// Per-field storage statistics for a dataset snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataStatistics {
    pub fields: Vec<FieldStatistics>,
}

/// Compute [`DataStatistics`] for `manifest` by `HEAD`ing every data file
/// it references, fanned out with the store's configured I/O
/// parallelism.
pub async fn calculate_data_stats(store: &Arc<FrameObjectStore>, manifest: &Manifest) -> Result<DataStatistics> {
    let mut file_refs: Vec<(i32, String)> = Vec::new();
    for fragment in &manifest.fragments {
        for file in &fragment.files {
            for &field_id in &file.field_ids {
                file_refs.push((field_id, file.path.clone()));
            }
        }
    }

    let io_parallelism = store.io_parallelism();
    let sized: Vec<(i32, u64)> = stream::iter(file_refs)
        .map(|(field_id, path)| {
            let store = Arc::clone(store);
            async move {
                let bytes = store.get_all(&Path::from(path)).await?;
                Ok::<_, contextframe_core::Error>((field_id, bytes.len() as u64))
            }
        })
        .buffer_unordered(io_parallelism.max(1))
        .try_collect()
        .await?;

    let mut totals: HashMap<i32, u64> = HashMap::new();
    for (field_id, size) in sized {
        *totals.entry(field_id).or_default() += size;
    }

    let mut fields: Vec<FieldStatistics> = totals
        .into_iter()
        .map(|(id, bytes_on_disk)| FieldStatistics { id, bytes_on_disk })
        .collect();
    fields.sort_by_key(|f| f.id);

    Ok(DataStatistics { fields })
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextframe_table::schema::DatasetSchema;

    #[tokio::test]
    async fn sums_bytes_across_fragments() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FrameObjectStore::local(dir.path()).unwrap());
        let schema = DatasetSchema::new(4);
        let mut manifest = Manifest::new(schema.clone());

        let records = vec![contextframe_table::RecordBuilder::new("one").build(&schema).unwrap()];
        let root = Path::from("ds");
        let fragment = crate::dataset::store::FragmentWriter::write(&store, &root, 0, &records, &schema)
            .await
            .unwrap();
        manifest = contextframe_table::format::Manifest::new_from_previous(&manifest, vec![fragment], "append");

        let stats = calculate_data_stats(&store, &manifest).await.unwrap();
        assert!(!stats.fields.is_empty());
        assert_eq!(stats.fields.len(), schema.fields.len());
    }
}
