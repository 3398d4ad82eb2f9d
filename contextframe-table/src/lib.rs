// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! The record model (C1), schema registry (C2) and on-disk format types
//! (C3's pure data shapes: fragment, manifest, deletion vector, index
//! catalog) for the ContextFrame dataset engine.

pub mod format;
pub mod record;
pub mod schema;

pub use record::{
    new_record, Record, RecordBuilder, RecordType, Relationship, RelationshipTarget,
    RelationshipType, ValidationError,
};
pub use schema::{DatasetSchema, FieldSpec};
