// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Core primitives shared across the ContextFrame dataset engine:
//! the error taxonomy, a generic LRU+TTL cache, id/time helpers, and the
//! closed columnar type system.

pub mod cache;
pub mod datatype;
pub mod error;
pub mod ids;
pub mod time;

pub use datatype::{DataType, Value};
pub use error::{Error, Result};
