// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

use snafu::{Location, Snafu};

/// The error taxonomy for the dataset engine.
///
/// Each variant corresponds to one of the error kinds in the design's
/// error-handling section. Variants carry a [`Location`] so that errors
/// surfaced from deep in the store or planner can still be traced back to
/// the call site that raised them.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A record failed schema/invariant validation. No state was changed.
    #[snafu(display("validation error: {message}"))]
    Validation {
        message: String,
        /// All violations found, not just the first.
        violations: Vec<String>,
        location: Location,
    },

    /// A uuid, tag, version or index name could not be resolved.
    #[snafu(display("not found: {message}"))]
    NotFound { message: String, location: Location },

    /// A concurrent commit invalidated the transaction's base version.
    #[snafu(display("conflict: {message}"))]
    Conflict { message: String, location: Location },

    /// An illegal schema change was attempted (e.g. changing `embed_dim`).
    #[snafu(display("schema evolution error: {message}"))]
    SchemaEvolution { message: String, location: Location },

    /// An index referenced fragments that have since been compacted away.
    #[snafu(display("index invalid: {message}"))]
    IndexInvalid { message: String, location: Location },

    /// A storage operation failed.
    #[snafu(display("io error: {message}"))]
    Io { message: String, location: Location },

    /// A checksum mismatch or otherwise corrupt on-disk structure was read.
    #[snafu(display("corruption error: {message}"))]
    Corruption { message: String, location: Location },

    /// A cooperatively cancelled operation terminated early.
    #[snafu(display("cancelled: {message}"))]
    Cancelled { message: String, location: Location },

    /// The requested feature or code path is not implemented for this backend.
    #[snafu(display("unsupported: {message}"))]
    Unsupported { message: String, location: Location },

    /// A predicate string failed to parse under the filter grammar.
    #[snafu(display("invalid filter expression: {message}"))]
    InvalidFilter { message: String, location: Location },

    /// Catch-all for invariant violations that should be unreachable in
    /// correct code; never raised for external input.
    #[snafu(display("internal error: {message}"))]
    Internal { message: String, location: Location },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn validation(message: impl Into<String>, violations: Vec<String>) -> Self {
        Self::Validation {
            message: message.into(),
            violations,
            location: snafu::Location::new(file!(), line!(), column!()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            location: snafu::Location::new(file!(), line!(), column!()),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            location: snafu::Location::new(file!(), line!(), column!()),
        }
    }

    pub fn schema_evolution(message: impl Into<String>) -> Self {
        Self::SchemaEvolution {
            message: message.into(),
            location: snafu::Location::new(file!(), line!(), column!()),
        }
    }

    pub fn index_invalid(message: impl Into<String>) -> Self {
        Self::IndexInvalid {
            message: message.into(),
            location: snafu::Location::new(file!(), line!(), column!()),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            location: snafu::Location::new(file!(), line!(), column!()),
        }
    }

    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
            location: snafu::Location::new(file!(), line!(), column!()),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
            location: snafu::Location::new(file!(), line!(), column!()),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
            location: snafu::Location::new(file!(), line!(), column!()),
        }
    }

    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
            location: snafu::Location::new(file!(), line!(), column!()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            location: snafu::Location::new(file!(), line!(), column!()),
        }
    }

    /// True if a caller should retry the operation against a refreshed
    /// snapshot rather than treat this as fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::corruption(format!("failed to (de)serialize JSON: {e}"))
    }
}
