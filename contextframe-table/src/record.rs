// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! The record model (C1, §3.1-3.2, §4.1).
//!
//! `Record` is the atomic document unit. It is constructed through
//! [`RecordBuilder`], which performs full validation on `build()` and
//! returns every violation found rather than the first one.

use std::collections::HashMap;

use chrono::Utc;
use contextframe_core::ids::new_record_uuid;
use contextframe_core::time::now_iso8601;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::DatasetSchema;

/// The closed set of record "kinds" a dataset can hold alongside plain
/// documents (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Document,
    CollectionHeader,
    DatasetHeader,
    Frameset,
}

impl Default for RecordType {
    fn default() -> Self {
        Self::Document
    }
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::CollectionHeader => "collection_header",
            Self::DatasetHeader => "dataset_header",
            Self::Frameset => "frameset",
        }
    }
}

/// The closed set of relationship kinds (§3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Parent,
    Child,
    Related,
    Reference,
    Contains,
    MemberOf,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Child => "child",
            Self::Related => "related",
            Self::Reference => "reference",
            Self::Contains => "contains",
            Self::MemberOf => "member_of",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "parent" => Some(Self::Parent),
            "child" => Some(Self::Child),
            "related" => Some(Self::Related),
            "reference" => Some(Self::Reference),
            "contains" => Some(Self::Contains),
            "member_of" => Some(Self::MemberOf),
            _ => None,
        }
    }
}

/// Exactly one of these forms identifies a relationship target (§3.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelationshipTarget {
    Uuid(Uuid),
    Uri(String),
    Path(String),
    Cid(String),
}

/// A typed, record-local link to another entity. Referential integrity to
/// `Uuid` targets is not enforced at write time (§9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    pub target: RelationshipTarget,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl Relationship {
    pub fn new(kind: RelationshipType, target: RelationshipTarget) -> Self {
        Self {
            kind,
            target,
            title: None,
            description: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// The atomic document unit (§3.1). Fields mirror the storage model
/// exactly; `custom_metadata` is kept as a `HashMap` at this API boundary
/// and converted to/from the canonical key/value struct-list form when it
/// crosses into the columnar store (`crate::schema`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub uuid: Uuid,
    pub title: String,
    pub text_content: Option<String>,
    pub vector: Option<Vec<f32>>,
    pub created_at: String,
    pub updated_at: String,
    pub version: Option<String>,
    pub author: Option<String>,
    pub status: Option<String>,
    pub tags: Vec<String>,
    pub contributors: Vec<String>,
    pub record_type: RecordType,
    pub collection: Option<String>,
    pub collection_id: Option<Uuid>,
    pub collection_position: Option<i64>,
    pub custom_metadata: HashMap<String, String>,
    pub relationships: Vec<Relationship>,
    pub raw_data: Option<Vec<u8>>,
    pub raw_data_type: Option<String>,
    pub context: HashMap<String, String>,
}

/// All violations of the record invariants found while validating one
/// record (§4.1: "validation is total and deterministic").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Record {
    /// Refresh `updated_at` to the current wall-clock time.
    pub fn touch(&mut self) {
        self.updated_at = now_iso8601();
    }

    /// Append a relationship, enforcing the enum and single-identifier
    /// invariants inline (§4.1: `add_relationship` fails if the type is
    /// not in the enum or the target carries more than one identifier
    /// kind -- the latter is structurally impossible with
    /// `RelationshipTarget` being a sum type, so this only needs to
    /// validate against the open string form used by callers crossing an
    /// FFI/text boundary).
    pub fn add_relationship(&mut self, relationship: Relationship) {
        self.relationships.push(relationship);
    }

    /// Validate this record against the dataset schema, returning every
    /// violation found (§3.1 invariants, §4.1 validation rule). An empty
    /// vec means the record is valid.
    pub fn validate(&self, schema: &DatasetSchema) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.title.trim().is_empty() {
            errors.push(ValidationError {
                field: "title".to_string(),
                message: "title must not be empty".to_string(),
            });
        }

        if contextframe_core::time::parse_iso8601(&self.created_at).is_err() {
            errors.push(ValidationError {
                field: "created_at".to_string(),
                message: format!("not a valid ISO-8601 timestamp: {}", self.created_at),
            });
        }
        if contextframe_core::time::parse_iso8601(&self.updated_at).is_err() {
            errors.push(ValidationError {
                field: "updated_at".to_string(),
                message: format!("not a valid ISO-8601 timestamp: {}", self.updated_at),
            });
        }

        if let Some(vector) = &self.vector {
            if vector.len() as u32 != schema.embed_dim {
                errors.push(ValidationError {
                    field: "vector".to_string(),
                    message: format!(
                        "vector length {} does not match dataset embed_dim {}",
                        vector.len(),
                        schema.embed_dim
                    ),
                });
            }
        }

        if let Some(v) = &self.version {
            if semver::Version::parse(v).is_err() {
                errors.push(ValidationError {
                    field: "version".to_string(),
                    message: format!("{v:?} is not a valid MAJOR.MINOR.PATCH semver string"),
                });
            }
        }

        match (&self.raw_data, &self.raw_data_type) {
            (Some(_), None) => errors.push(ValidationError {
                field: "raw_data_type".to_string(),
                message: "raw_data_type is required when raw_data is present".to_string(),
            }),
            (None, Some(_)) => errors.push(ValidationError {
                field: "raw_data".to_string(),
                message: "raw_data_type is set but raw_data is absent".to_string(),
            }),
            _ => {}
        }

        for (key, value) in &self.custom_metadata {
            if std::str::from_utf8(value.as_bytes()).is_err() {
                errors.push(ValidationError {
                    field: format!("custom_metadata.{key}"),
                    message: "value is not valid UTF-8".to_string(),
                });
            }
        }

        errors
    }

    pub fn is_valid(&self, schema: &DatasetSchema) -> bool {
        self.validate(schema).is_empty()
    }
}

/// A chainable builder for [`Record`] (§4.1, §9: "factory constructors ...
/// a builder with chainable setters and a single `build()`").
#[derive(Debug, Clone, Default)]
pub struct RecordBuilder {
    title: Option<String>,
    text_content: Option<String>,
    vector: Option<Vec<f32>>,
    version: Option<String>,
    author: Option<String>,
    status: Option<String>,
    tags: Vec<String>,
    contributors: Vec<String>,
    record_type: RecordType,
    collection: Option<String>,
    collection_id: Option<Uuid>,
    collection_position: Option<i64>,
    custom_metadata: HashMap<String, String>,
    relationships: Vec<Relationship>,
    raw_data: Option<Vec<u8>>,
    raw_data_type: Option<String>,
    context: HashMap<String, String>,
}

impl RecordBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn text_content(mut self, text: impl Into<String>) -> Self {
        self.text_content = Some(text.into());
        self
    }

    pub fn vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn contributor(mut self, contributor: impl Into<String>) -> Self {
        self.contributors.push(contributor.into());
        self
    }

    pub fn record_type(mut self, record_type: RecordType) -> Self {
        self.record_type = record_type;
        self
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn collection_id(mut self, id: Uuid) -> Self {
        self.collection_id = Some(id);
        self
    }

    pub fn collection_position(mut self, position: i64) -> Self {
        self.collection_position = Some(position);
        self
    }

    pub fn custom_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_metadata.insert(key.into(), value.into());
        self
    }

    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn raw_data(mut self, data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        self.raw_data = Some(data);
        self.raw_data_type = Some(mime_type.into());
        self
    }

    pub fn context(mut self, key: impl Into<String>, json_value: impl Into<String>) -> Self {
        self.context.insert(key.into(), json_value.into());
        self
    }

    /// Build the record, running full validation against `schema`.
    /// Returns every violation found, not just the first (§4.1).
    pub fn build(self, schema: &DatasetSchema) -> Result<Record, Vec<ValidationError>> {
        let now = now_iso8601();
        let title = self.title.unwrap_or_default();

        let mut errors = Vec::new();
        if title.trim().is_empty() {
            errors.push(ValidationError {
                field: "title".to_string(),
                message: "title must not be empty".to_string(),
            });
        }

        let record = Record {
            uuid: new_record_uuid(),
            title,
            text_content: self.text_content,
            vector: self.vector,
            created_at: now.clone(),
            updated_at: now,
            version: self.version,
            author: self.author,
            status: self.status,
            tags: self.tags,
            contributors: self.contributors,
            record_type: self.record_type,
            collection: self.collection,
            collection_id: self.collection_id,
            collection_position: self.collection_position,
            custom_metadata: self.custom_metadata,
            relationships: self.relationships,
            raw_data: self.raw_data,
            raw_data_type: self.raw_data_type,
            context: self.context,
        };

        errors.extend(record.validate(schema));
        if errors.is_empty() {
            Ok(record)
        } else {
            Err(errors)
        }
    }
}

/// Construct a record with sane defaults and a freshly generated uuid,
/// matching the `new_record(title, ...)` operation in §4.1. Prefer
/// [`RecordBuilder`] for anything beyond the bare minimum.
pub fn new_record(title: impl Into<String>, schema: &DatasetSchema) -> Result<Record, Vec<ValidationError>> {
    RecordBuilder::new(title).build(schema)
}

/// True if `updated_at >= lower_bound`, used by the round-trip property
/// test in §8.
pub fn updated_at_at_least(record: &Record, lower_bound: &str) -> bool {
    let updated = contextframe_core::time::parse_iso8601(&record.updated_at);
    let bound = contextframe_core::time::parse_iso8601(lower_bound);
    match (updated, bound) {
        (Ok(u), Ok(b)) => u >= b,
        _ => false,
    }
}

pub fn record_age(record: &Record) -> Option<chrono::Duration> {
    let created = contextframe_core::time::parse_iso8601(&record.created_at).ok()?;
    Some(Utc::now() - created)
}
