// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Schema Registry (C2, §4.2): the mapping from logical field to storage
//! type, plus the schema-evolution contract (add nullable column,
//! metadata-only drop, rename-as-alias, forbidden `embed_dim` change).

use std::collections::HashMap;

use contextframe_core::datatype::DataType;
use contextframe_core::error::Error;
use serde::{Deserialize, Serialize};

/// One logical column in the dataset schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub id: i32,
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl FieldSpec {
    pub fn new(id: i32, name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            id,
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

/// The field names every dataset carries by construction (§3.1), in the
/// order their field ids are assigned when a dataset is created.
pub const STANDARD_FIELDS: &[(&str, bool)] = &[
    ("uuid", false),
    ("title", false),
    ("text_content", true),
    ("vector", true),
    ("created_at", false),
    ("updated_at", false),
    ("version", true),
    ("author", true),
    ("status", true),
    ("tags", true),
    ("contributors", true),
    ("record_type", true),
    ("collection", true),
    ("collection_id", true),
    ("collection_position", true),
    ("custom_metadata", true),
    ("relationships", true),
    ("raw_data", true),
    ("raw_data_type", true),
    ("context", true),
];

/// The dataset-wide schema, derivable from the record model plus the
/// dataset's fixed `embed_dim` (§3.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSchema {
    pub embed_dim: u32,
    pub fields: Vec<FieldSpec>,
    /// alias name -> canonical name, both directions resolve (§4.2).
    pub aliases: HashMap<String, String>,
    /// Dropped columns are metadata-only until a compaction physically
    /// removes them; kept here so readers of older fragments still know
    /// the field existed.
    pub dropped_fields: Vec<FieldSpec>,
    next_field_id: i32,
}

impl DatasetSchema {
    /// Build the schema for a freshly created dataset with the given
    /// `embed_dim` (§3.3).
    pub fn new(embed_dim: u32) -> Self {
        let mut fields = Vec::with_capacity(STANDARD_FIELDS.len());
        let mut next_field_id = 0;
        for (name, nullable) in STANDARD_FIELDS {
            let data_type = match *name {
                "vector" => DataType::FixedSizeList { width: embed_dim },
                "relationships" | "custom_metadata" | "context" => DataType::StructList,
                "raw_data" => DataType::Blob,
                "collection_position" => DataType::Int64,
                _ => DataType::Utf8,
            };
            fields.push(FieldSpec::new(next_field_id, *name, data_type, *nullable));
            next_field_id += 1;
        }
        Self {
            embed_dim,
            fields,
            aliases: HashMap::new(),
            dropped_fields: Vec::new(),
            next_field_id,
        }
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldSpec> {
        let canonical = self.resolve_alias(name);
        self.fields.iter().find(|f| f.name == canonical)
    }

    /// Resolve an alias to its canonical field name; both the alias and
    /// the canonical name resolve to the same field (§4.2).
    pub fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(|s| s.as_str()).unwrap_or(name)
    }

    pub fn max_field_id(&self) -> i32 {
        self.fields
            .iter()
            .chain(self.dropped_fields.iter())
            .map(|f| f.id)
            .max()
            .unwrap_or(-1)
    }

    /// Add a nullable column. Older fragments read the missing column as
    /// null (§4.2: "allowed").
    pub fn add_nullable_column(&mut self, name: impl Into<String>, data_type: DataType) -> i32 {
        let id = self.next_field_id;
        self.next_field_id += 1;
        self.fields.push(FieldSpec::new(id, name, data_type, true));
        id
    }

    /// Drop a column. Metadata-only: the field moves to `dropped_fields`
    /// and physical removal happens on compaction (§4.2).
    pub fn drop_column(&mut self, name: &str) -> contextframe_core::Result<()> {
        let canonical = self.resolve_alias(name).to_string();
        let idx = self
            .fields
            .iter()
            .position(|f| f.name == canonical)
            .ok_or_else(|| Error::not_found(format!("no such column: {name}")))?;
        let field = self.fields.remove(idx);
        self.dropped_fields.push(field);
        Ok(())
    }

    /// Record a rename as an alias; both the old and new name resolve
    /// (§4.2).
    pub fn rename_column(&mut self, old_name: &str, new_name: &str) -> contextframe_core::Result<()> {
        let canonical = self.resolve_alias(old_name).to_string();
        let field = self
            .fields
            .iter_mut()
            .find(|f| f.name == canonical)
            .ok_or_else(|| Error::not_found(format!("no such column: {old_name}")))?;
        let previous_name = field.name.clone();
        field.name = new_name.to_string();
        self.aliases.insert(previous_name, new_name.to_string());
        self.aliases.insert(old_name.to_string(), new_name.to_string());
        Ok(())
    }

    /// Changing `embed_dim` is forbidden once any vector has been written
    /// (§4.2). Callers should check `vectors_written` before calling this;
    /// the check itself lives at the dataset layer, which knows whether
    /// any fragment actually contains vector data.
    pub fn try_change_embed_dim(
        &mut self,
        new_dim: u32,
        any_vector_written: bool,
    ) -> contextframe_core::Result<()> {
        if any_vector_written {
            return Err(Error::schema_evolution(
                "embed_dim cannot change after any vector has been written",
            ));
        }
        self.embed_dim = new_dim;
        for field in &mut self.fields {
            if field.name == "vector" {
                field.data_type = DataType::FixedSizeList { width: new_dim };
            }
        }
        Ok(())
    }

    pub fn field_ids(&self) -> Vec<i32> {
        self.fields.iter().map(|f| f.id).collect()
    }
}

/// Convert a `custom_metadata` map into the canonical key/value struct
/// list form used by the columnar store (§4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValueStruct {
    pub key: String,
    pub value: String,
}

pub fn map_to_struct_list(map: &HashMap<String, String>) -> Vec<KeyValueStruct> {
    let mut entries: Vec<_> = map
        .iter()
        .map(|(k, v)| KeyValueStruct {
            key: k.clone(),
            value: v.clone(),
        })
        .collect();
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    entries
}

pub fn struct_list_to_map(list: &[KeyValueStruct]) -> HashMap<String, String> {
    list.iter()
        .map(|kv| (kv.key.clone(), kv.value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_schema_has_vector_width_matching_embed_dim() {
        let schema = DatasetSchema::new(8);
        let vector_field = schema.field_by_name("vector").unwrap();
        assert_eq!(vector_field.data_type.vector_width(), Some(8));
    }

    #[test]
    fn add_nullable_column_is_queryable_by_name() {
        let mut schema = DatasetSchema::new(4);
        let id = schema.add_nullable_column("summary", DataType::Utf8);
        let field = schema.field_by_name("summary").unwrap();
        assert_eq!(field.id, id);
        assert!(field.nullable);
    }

    #[test]
    fn drop_column_is_metadata_only() {
        let mut schema = DatasetSchema::new(4);
        schema.drop_column("author").unwrap();
        assert!(schema.field_by_name("author").is_none());
        assert!(schema.dropped_fields.iter().any(|f| f.name == "author"));
    }

    #[test]
    fn rename_resolves_both_names() {
        let mut schema = DatasetSchema::new(4);
        schema.rename_column("author", "created_by").unwrap();
        assert!(schema.field_by_name("author").is_some());
        assert!(schema.field_by_name("created_by").is_some());
        assert_eq!(
            schema.field_by_name("author").unwrap().id,
            schema.field_by_name("created_by").unwrap().id
        );
    }

    #[test]
    fn embed_dim_change_forbidden_once_vectors_written() {
        let mut schema = DatasetSchema::new(4);
        let err = schema.try_change_embed_dim(8, true).unwrap_err();
        assert!(matches!(err, Error::SchemaEvolution { .. }));
        assert_eq!(schema.embed_dim, 4);
    }

    #[test]
    fn embed_dim_change_allowed_before_any_vector() {
        let mut schema = DatasetSchema::new(4);
        schema.try_change_embed_dim(8, false).unwrap();
        assert_eq!(schema.embed_dim, 8);
        assert_eq!(
            schema.field_by_name("vector").unwrap().data_type.vector_width(),
            Some(8)
        );
    }

    #[test]
    fn map_struct_list_roundtrip() {
        let mut map = HashMap::new();
        map.insert("a".to_string(), "1".to_string());
        map.insert("b".to_string(), "2".to_string());
        let list = map_to_struct_list(&map);
        assert_eq!(list.len(), 2);
        let back = struct_list_to_map(&list);
        assert_eq!(back, map);
    }
}
