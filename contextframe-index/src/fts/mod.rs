// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Full-text search (C6, §4.6): tokenization built on tantivy's
//! tokenizer primitives feeding a native BM25-scored inverted index.

pub mod bm25;
pub mod tokenizer;

pub use bm25::InvertedIndex;
pub use tokenizer::{FrameTokenizer, TokenizerConfig};
