// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Scalar indices over non-vector fields (C6, §4.6): a b-tree for
//! ordered/range predicates, a bitmap index for low-cardinality
//! equality predicates, a label-list index for tag-style list fields,
//! and an n-gram index for substring search.

pub mod bitmap;
pub mod btree;
pub mod label_list;
pub mod ngram;

pub use bitmap::BitmapIndex;
pub use btree::BTreeIndex;
pub use label_list::LabelListIndex;
pub use ngram::NgramIndex;
