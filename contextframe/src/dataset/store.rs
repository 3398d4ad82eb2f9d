// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! The columnar fragment writer/reader (§4.3): one JSON-array file per
//! logical field, a shared blob side-store for `raw_data`, and a
//! deletion-vector-masked read path.
//!
//! Physical encoding is deliberately simple: each column file is a JSON
//! array of [`Value`], one entry per row, in row order. This keeps the
//! columnar *shape* (one file per field, projection skips files it
//! doesn't need, blobs live outside the row path) without pulling in a
//! binary encoding layer the design scopes out.

use std::collections::{HashMap, HashSet};

use contextframe_core::datatype::Value;
use contextframe_core::error::{Error, Result};
use contextframe_io::FrameObjectStore;
use contextframe_index::RowAddress;
use contextframe_table::format::deletion::DeletionVector;
use contextframe_table::format::fragment::{BlobRef, DataFile, Fragment};
use contextframe_table::format::ColumnStatistics;
use contextframe_table::schema::{self, DatasetSchema, FieldSpec};
use contextframe_table::{Record, RecordType, Relationship};
use object_store::path::Path;
use uuid::Uuid;

fn content_hash(bytes: &[u8]) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn value_sort_key(value: &Value) -> String {
    match value {
        Value::Utf8(s) => s.clone(),
        Value::Int64(i) => i.to_string(),
        Value::Float32(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Date(d) | Value::Timestamp(d) | Value::Decimal(d) => d.clone(),
        Value::List(_) | Value::Null => String::new(),
    }
}

fn compute_statistics(values: &[Value]) -> ColumnStatistics {
    let mut null_count = 0u64;
    let mut min: Option<String> = None;
    let mut max: Option<String> = None;
    for value in values {
        if matches!(value, Value::Null) {
            null_count += 1;
            continue;
        }
        let key = value_sort_key(value);
        if min.as_deref().map_or(true, |m| key.as_str() < m) {
            min = Some(key.clone());
        }
        if max.as_deref().map_or(true, |m| key.as_str() > m) {
            max = Some(key);
        }
    }
    ColumnStatistics { min, max, null_count, bloom_filter: None }
}

/// Convert one record field to its physical column [`Value`]. `raw_data`
/// is always written as a placeholder; the writer overwrites it with the
/// blob offset/length pair once the blob side-store has been laid out.
fn field_value(record: &Record, field: &FieldSpec) -> Result<Value> {
    Ok(match field.name.as_str() {
        "uuid" => Value::Utf8(record.uuid.to_string()),
        "title" => Value::Utf8(record.title.clone()),
        "text_content" => record.text_content.clone().map(Value::Utf8).unwrap_or(Value::Null),
        "vector" => record
            .vector
            .clone()
            .map(|v| Value::List(v.into_iter().map(Value::Float32).collect()))
            .unwrap_or(Value::Null),
        "created_at" => Value::Utf8(record.created_at.clone()),
        "updated_at" => Value::Utf8(record.updated_at.clone()),
        "version" => record.version.clone().map(Value::Utf8).unwrap_or(Value::Null),
        "author" => record.author.clone().map(Value::Utf8).unwrap_or(Value::Null),
        "status" => record.status.clone().map(Value::Utf8).unwrap_or(Value::Null),
        "tags" => Value::List(record.tags.iter().cloned().map(Value::Utf8).collect()),
        "contributors" => Value::List(record.contributors.iter().cloned().map(Value::Utf8).collect()),
        "record_type" => Value::Utf8(record.record_type.as_str().to_string()),
        "collection" => record.collection.clone().map(Value::Utf8).unwrap_or(Value::Null),
        "collection_id" => record.collection_id.map(|u| Value::Utf8(u.to_string())).unwrap_or(Value::Null),
        "collection_position" => record.collection_position.map(Value::Int64).unwrap_or(Value::Null),
        "custom_metadata" => {
            Value::Utf8(serde_json::to_string(&schema::map_to_struct_list(&record.custom_metadata))?)
        }
        "relationships" => Value::Utf8(serde_json::to_string(&record.relationships)?),
        "raw_data" => Value::Null,
        "raw_data_type" => record.raw_data_type.clone().map(Value::Utf8).unwrap_or(Value::Null),
        "context" => Value::Utf8(serde_json::to_string(&record.context)?),
        _ => Value::Null,
    })
}

/// Reconstruct a [`Record`] from a sparse row of field id -> value
/// (sparse because projection may have skipped columns this read didn't
/// need). Missing columns fall back to their empty/default form rather
/// than erroring, mirroring schema-evolution's "older fragments read the
/// missing column as null" rule (§4.2).
fn row_to_record(row: &HashMap<i32, Value>, schema: &DatasetSchema, blob: Option<&[u8]>) -> Result<Record> {
    let get_utf8 = |name: &str| -> Option<String> {
        let field = schema.field_by_name(name)?;
        match row.get(&field.id)? {
            Value::Utf8(s) => Some(s.clone()),
            _ => None,
        }
    };
    let get_i64 = |name: &str| -> Option<i64> {
        let field = schema.field_by_name(name)?;
        match row.get(&field.id)? {
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    };
    let get_list = |name: &str| -> Vec<Value> {
        let Some(field) = schema.field_by_name(name) else { return Vec::new() };
        match row.get(&field.id) {
            Some(Value::List(items)) => items.clone(),
            _ => Vec::new(),
        }
    };

    let uuid_str = get_utf8("uuid").ok_or_else(|| Error::corruption("row is missing its uuid column"))?;
    let uuid = Uuid::parse_str(&uuid_str).map_err(|e| Error::corruption(format!("invalid uuid {uuid_str:?}: {e}")))?;

    let vector = schema.field_by_name("vector").and_then(|f| row.get(&f.id)).and_then(|v| match v {
        Value::List(items) => Some(
            items
                .iter()
                .map(|item| match item {
                    Value::Float32(f) => *f,
                    _ => 0.0,
                })
                .collect(),
        ),
        _ => None,
    });

    let record_type = get_utf8("record_type")
        .as_deref()
        .and_then(|s| match s {
            "document" => Some(RecordType::Document),
            "collection_header" => Some(RecordType::CollectionHeader),
            "dataset_header" => Some(RecordType::DatasetHeader),
            "frameset" => Some(RecordType::Frameset),
            _ => None,
        })
        .unwrap_or_default();

    let tags = get_list("tags")
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    let contributors = get_list("contributors")
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();

    let custom_metadata = get_utf8("custom_metadata")
        .map(|s| serde_json::from_str::<Vec<schema::KeyValueStruct>>(&s))
        .transpose()?
        .map(|list| schema::struct_list_to_map(&list))
        .unwrap_or_default();

    let relationships = get_utf8("relationships")
        .map(|s| serde_json::from_str::<Vec<Relationship>>(&s))
        .transpose()?
        .unwrap_or_default();

    let context = get_utf8("context")
        .map(|s| serde_json::from_str::<HashMap<String, String>>(&s))
        .transpose()?
        .unwrap_or_default();

    let collection_id = get_utf8("collection_id")
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| Error::corruption(format!("invalid collection_id: {e}")))?;

    let raw_data = blob.and_then(|bytes| {
        let field = schema.field_by_name("raw_data")?;
        match row.get(&field.id) {
            Some(Value::List(parts)) if parts.len() == 2 => {
                let offset = match &parts[0] {
                    Value::Int64(i) => *i as usize,
                    _ => return None,
                };
                let len = match &parts[1] {
                    Value::Int64(i) => *i as usize,
                    _ => return None,
                };
                bytes.get(offset..offset + len).map(<[u8]>::to_vec)
            }
            _ => None,
        }
    });

    Ok(Record {
        uuid,
        title: get_utf8("title").unwrap_or_default(),
        text_content: get_utf8("text_content"),
        vector,
        created_at: get_utf8("created_at").unwrap_or_default(),
        updated_at: get_utf8("updated_at").unwrap_or_default(),
        version: get_utf8("version"),
        author: get_utf8("author"),
        status: get_utf8("status"),
        tags,
        contributors,
        record_type,
        collection: get_utf8("collection"),
        collection_id,
        collection_position: get_i64("collection_position"),
        custom_metadata,
        relationships,
        raw_data,
        raw_data_type: get_utf8("raw_data_type"),
        context,
    })
}

/// Resolve one column's value directly off a decoded [`Record`], used by
/// the filter evaluator (§6.1) against in-memory rows rather than raw
/// column files. Aliases are resolved through `schema`; an unknown
/// column reads as [`Value::Null`], matching predicate evaluation's
/// treatment of a missing column.
pub fn record_column_value(record: &Record, schema: &DatasetSchema, name: &str) -> Value {
    let canonical = schema.resolve_alias(name);
    match schema.field_by_name(canonical) {
        Some(field) => field_value(record, field).unwrap_or(Value::Null),
        None => Value::Null,
    }
}

/// Field ids every scan must resolve regardless of the caller's
/// projection, so row identity (`uuid`) and the cheap housekeeping
/// columns are always available to reconstruct a well-formed `Record`.
pub fn core_field_ids(schema: &DatasetSchema) -> HashSet<i32> {
    ["uuid", "title", "created_at", "updated_at", "record_type"]
        .iter()
        .filter_map(|name| schema.field_by_name(name).map(|f| f.id))
        .collect()
}

pub struct FragmentWriter;

impl FragmentWriter {
    /// Write one fragment's worth of records under `root`, returning its
    /// [`Fragment`] metadata. `fragment_id` must not already be in use.
    pub async fn write(
        store: &FrameObjectStore,
        root: &Path,
        fragment_id: u64,
        records: &[Record],
        schema: &DatasetSchema,
    ) -> Result<Fragment> {
        let mut blob_bytes: Vec<u8> = Vec::new();
        let mut blob_slices: Vec<Option<(u64, u64)>> = Vec::with_capacity(records.len());
        for record in records {
            match &record.raw_data {
                Some(bytes) => {
                    let offset = blob_bytes.len() as u64;
                    blob_bytes.extend_from_slice(bytes);
                    blob_slices.push(Some((offset, bytes.len() as u64)));
                }
                None => blob_slices.push(None),
            }
        }

        let blob_ref = if blob_bytes.is_empty() {
            None
        } else {
            let hash = content_hash(&blob_bytes);
            let path = root.child("blobs").child(format!("{fragment_id}-{hash}.blob"));
            store.put_if_absent(&path, blob_bytes).await?;
            Some(BlobRef { path: path.to_string(), total_bytes: blob_slices.iter().filter_map(|s| *s).map(|(_, l)| l).sum() })
        };

        let mut files = Vec::with_capacity(schema.fields.len());
        for field in &schema.fields {
            let mut values = Vec::with_capacity(records.len());
            for (i, record) in records.iter().enumerate() {
                let value = if field.name == "raw_data" {
                    match blob_slices[i] {
                        Some((offset, len)) => Value::List(vec![Value::Int64(offset as i64), Value::Int64(len as i64)]),
                        None => Value::Null,
                    }
                } else {
                    field_value(record, field)?
                };
                values.push(value);
            }
            let statistics = compute_statistics(&values);
            let bytes = serde_json::to_vec(&values)?;
            let hash = content_hash(&bytes);
            let path = root.child("fragments").child(format!("{fragment_id}-{}-{hash}.col", field.id));
            store.put_if_absent(&path, bytes).await?;
            let mut data_file = DataFile::new(path.to_string(), vec![field.id]);
            data_file.statistics.insert(field.id, statistics);
            files.push(data_file);
        }

        let mut fragment = Fragment::new(fragment_id, records.len() as u64, files);
        if let Some(blob_ref) = blob_ref {
            fragment = fragment.with_blob(blob_ref);
        }
        Ok(fragment)
    }
}

pub struct FragmentReader;

impl FragmentReader {
    /// Read `fragment`, resolving only the column files covering
    /// `field_ids` (late materialization, §4.7 decision 3) and applying
    /// the deletion mask unless `include_deleted` is set.
    pub async fn read(
        store: &FrameObjectStore,
        fragment: &Fragment,
        schema: &DatasetSchema,
        field_ids: &HashSet<i32>,
        include_deleted: bool,
    ) -> Result<Vec<(RowAddress, Record)>> {
        let mut columns: HashMap<i32, Vec<Value>> = HashMap::new();
        for file in &fragment.files {
            if !file.field_ids.iter().any(|id| field_ids.contains(id)) {
                continue;
            }
            let bytes = store.get_all(&Path::from(file.path.clone())).await?;
            let values: Vec<Value> = serde_json::from_slice(&bytes)?;
            for &id in &file.field_ids {
                columns.insert(id, values.clone());
            }
        }

        let raw_data_field = schema.field_by_name("raw_data").map(|f| f.id);
        let blob_bytes = if raw_data_field.is_some_and(|id| field_ids.contains(&id)) {
            match &fragment.blob_ref {
                Some(blob_ref) => Some(store.get_all(&Path::from(blob_ref.path.clone())).await?.to_vec()),
                None => None,
            }
        } else {
            None
        };

        let deletion_mask = if include_deleted {
            None
        } else {
            match &fragment.deletion_vector {
                Some(dv_ref) => {
                    let bytes = store.get_all(&Path::from(dv_ref.path.clone())).await?;
                    Some(DeletionVector::deserialize(&bytes)?)
                }
                None => None,
            }
        };

        let mut out = Vec::with_capacity(fragment.num_rows as usize);
        for offset in 0..fragment.num_rows {
            if let Some(mask) = &deletion_mask {
                if mask.contains(offset as u32) {
                    continue;
                }
            }
            let mut row = HashMap::with_capacity(columns.len());
            for (&field_id, values) in &columns {
                if let Some(value) = values.get(offset as usize) {
                    row.insert(field_id, value.clone());
                }
            }
            let record = row_to_record(&row, schema, blob_bytes.as_deref())?;
            out.push((RowAddress::new(fragment.id, offset as u32), record));
        }
        Ok(out)
    }

    /// Read a single row by its logical offset within the fragment,
    /// without scanning the rest (`take`, §4.7).
    pub async fn read_one(
        store: &FrameObjectStore,
        fragment: &Fragment,
        schema: &DatasetSchema,
        offset: u32,
        field_ids: &HashSet<i32>,
    ) -> Result<Option<Record>> {
        let rows = Self::read(store, fragment, schema, field_ids, true).await?;
        Ok(rows.into_iter().find(|(addr, _)| addr.offset == offset).map(|(_, r)| r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextframe_table::schema::DatasetSchema;
    use contextframe_table::RecordBuilder;

    fn schema() -> DatasetSchema {
        DatasetSchema::new(4)
    }

    #[tokio::test]
    async fn round_trips_a_fragment_with_vector_and_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameObjectStore::local(dir.path()).unwrap();
        let schema = schema();
        let root = Path::from("ds");

        let records = vec![
            RecordBuilder::new("one")
                .text_content("hello world")
                .vector(vec![1.0, 2.0, 3.0, 4.0])
                .tag("a")
                .tag("b")
                .raw_data(b"blob-bytes".to_vec(), "application/octet-stream")
                .build(&schema)
                .unwrap(),
            RecordBuilder::new("two").build(&schema).unwrap(),
        ];

        let fragment = FragmentWriter::write(&store, &root, 0, &records, &schema).await.unwrap();
        assert_eq!(fragment.num_rows, 2);
        assert!(fragment.blob_ref.is_some());

        let all_fields: HashSet<i32> = schema.field_ids().into_iter().collect();
        let rows = FragmentReader::read(&store, &fragment, &schema, &all_fields, false).await.unwrap();
        assert_eq!(rows.len(), 2);
        let (_, first) = rows.iter().find(|(_, r)| r.title == "one").unwrap();
        assert_eq!(first.vector, Some(vec![1.0, 2.0, 3.0, 4.0]));
        assert_eq!(first.tags, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(first.raw_data.as_deref(), Some(b"blob-bytes".as_slice()));
    }

    #[tokio::test]
    async fn projection_skips_unread_columns() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameObjectStore::local(dir.path()).unwrap();
        let schema = schema();
        let root = Path::from("ds");
        let records = vec![RecordBuilder::new("one").text_content("body").build(&schema).unwrap()];
        let fragment = FragmentWriter::write(&store, &root, 0, &records, &schema).await.unwrap();

        let mut projection = core_field_ids(&schema);
        let rows = FragmentReader::read(&store, &fragment, &schema, &projection, false).await.unwrap();
        assert_eq!(rows[0].1.text_content, None);

        projection.insert(schema.field_by_name("text_content").unwrap().id);
        let rows = FragmentReader::read(&store, &fragment, &schema, &projection, false).await.unwrap();
        assert_eq!(rows[0].1.text_content.as_deref(), Some("body"));
    }

    #[tokio::test]
    async fn deletion_vector_masks_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameObjectStore::local(dir.path()).unwrap();
        let schema = schema();
        let root = Path::from("ds");
        let records = vec![
            RecordBuilder::new("one").build(&schema).unwrap(),
            RecordBuilder::new("two").build(&schema).unwrap(),
        ];
        let mut fragment = FragmentWriter::write(&store, &root, 0, &records, &schema).await.unwrap();

        let mut dv = DeletionVector::new();
        dv.insert(0);
        let dv_bytes = dv.serialize().unwrap();
        let dv_path = root.child("deletions").child("0.bin");
        store.put(&dv_path, dv_bytes).await.unwrap();
        fragment = fragment.with_deletion_vector(contextframe_table::format::deletion::DeletionVectorRef {
            path: dv_path.to_string(),
            written_at_version: 1,
            cardinality: 1,
        });

        let all_fields: HashSet<i32> = schema.field_ids().into_iter().collect();
        let rows = FragmentReader::read(&store, &fragment, &schema, &all_fields, false).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.title, "two");

        let rows_including_deleted = FragmentReader::read(&store, &fragment, &schema, &all_fields, true).await.unwrap();
        assert_eq!(rows_including_deleted.len(), 2);
    }
}
