// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! The columnar storage type system (§4.2 of the design).
//!
//! This is deliberately small and closed: the storage model only needs to
//! express the handful of physical shapes the record model requires, not
//! a general-purpose type system.

use serde::{Deserialize, Serialize};

/// A physical column type in the columnar store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataType {
    Utf8,
    Int64,
    Float32,
    Bool,
    /// Fixed-width list of float32, used for the `vector` column. The
    /// width is the dataset-wide `embed_dim`.
    FixedSizeList { width: u32 },
    /// Variable-length list of key/value utf8 structs, used for
    /// `custom_metadata` and as the element type of `relationships`.
    StructList,
    /// Opaque binary with a blob hint: the column file stores
    /// `(blob_id, length, offset)` triples, bytes live in the blob
    /// side-store.
    Blob,
}

impl DataType {
    pub fn is_blob(&self) -> bool {
        matches!(self, Self::Blob)
    }

    pub fn vector_width(&self) -> Option<u32> {
        match self {
            Self::FixedSizeList { width } => Some(*width),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Utf8 => write!(f, "utf8"),
            Self::Int64 => write!(f, "int64"),
            Self::Float32 => write!(f, "float32"),
            Self::Bool => write!(f, "bool"),
            Self::FixedSizeList { width } => write!(f, "fixed_size_list<float32, {width}>"),
            Self::StructList => write!(f, "list<struct>"),
            Self::Blob => write!(f, "blob"),
        }
    }
}

/// A scalar literal value, used both as a record field value at the
/// storage boundary and as a literal in the filter grammar (§6.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Utf8(String),
    Int64(i64),
    Float32(f32),
    Bool(bool),
    /// `date 'YYYY-MM-DD'`
    Date(String),
    /// `timestamp(p) 'YYYY-MM-DD HH:MM:SS'`
    Timestamp(String),
    /// `decimal(P,S) '...'`, kept as its textual form; arithmetic on
    /// decimals is out of scope, only equality/ordering comparisons of
    /// the canonical string are supported.
    Decimal(String),
    List(Vec<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Utf8(_) => "utf8",
            Self::Int64(_) => "int64",
            Self::Float32(_) => "float32",
            Self::Bool(_) => "bool",
            Self::Date(_) => "date",
            Self::Timestamp(_) => "timestamp",
            Self::Decimal(_) => "decimal",
            Self::List(_) => "list",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Utf8(s) => write!(f, "{s:?}"),
            Self::Int64(i) => write!(f, "{i}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Date(d) => write!(f, "date '{d}'"),
            Self::Timestamp(t) => write!(f, "timestamp '{t}'"),
            Self::Decimal(d) => write!(f, "decimal '{d}'"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_size_list_reports_width() {
        let dt = DataType::FixedSizeList { width: 768 };
        assert_eq!(dt.vector_width(), Some(768));
        assert!(!dt.is_blob());
    }

    #[test]
    fn blob_is_reported() {
        assert!(DataType::Blob.is_blob());
    }

    #[test]
    fn display_formats_are_stable() {
        assert_eq!(DataType::Int64.to_string(), "int64");
        assert_eq!(
            DataType::FixedSizeList { width: 4 }.to_string(),
            "fixed_size_list<float32, 4>"
        );
    }
}
