// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Tokenization for the full-text index (§4.6), built from tantivy's
//! tokenizer primitives: `SimpleTokenizer` splits on non-alphanumeric
//! boundaries, then `LowerCaser`, `AsciiFoldingFilter` and
//! `StopWordFilter` run as configured.

use tantivy::tokenizer::{
    AsciiFoldingFilter, Language, LowerCaser, RemoveLongFilter, SimpleTokenizer,
    StopWordFilter, TextAnalyzer, Token, TokenStream, Tokenizer,
};

#[derive(Debug, Clone)]
pub struct TokenizerConfig {
    pub lower_case: bool,
    pub ascii_folding: bool,
    pub remove_stop_words: bool,
    pub max_token_length: usize,
    /// Record each token's ordinal position, needed for phrase queries
    /// and proximity scoring; BM25-only search does not require it.
    pub with_position: bool,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            lower_case: true,
            ascii_folding: true,
            remove_stop_words: true,
            max_token_length: 64,
            with_position: true,
        }
    }
}

pub struct FrameTokenizer {
    analyzer: TextAnalyzer,
    with_position: bool,
}

impl FrameTokenizer {
    pub fn new(config: &TokenizerConfig) -> Self {
        let mut builder = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(config.max_token_length))
            .dynamic();

        if config.lower_case {
            builder = builder.filter(LowerCaser).dynamic();
        }
        if config.ascii_folding {
            builder = builder.filter(AsciiFoldingFilter).dynamic();
        }
        if config.remove_stop_words {
            builder = builder.filter(StopWordFilter::new(Language::English).unwrap()).dynamic();
        }

        Self {
            analyzer: builder.build(),
            with_position: config.with_position,
        }
    }

    /// Tokenize `text`, returning `(term, position)` pairs. `position`
    /// is `0` for every token when `with_position` is disabled.
    pub fn tokenize(&mut self, text: &str) -> Vec<(String, u32)> {
        let mut stream = self.analyzer.token_stream(text);
        let mut out = Vec::new();
        stream.process(&mut |token: &Token| {
            let position = if self.with_position { token.position as u32 } else { 0 };
            out.push((token.text.clone(), position));
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_lower_cases_and_drops_stop_words() {
        let mut tokenizer = FrameTokenizer::new(&TokenizerConfig::default());
        let tokens = tokenizer.tokenize("The Quick Brown Fox");
        let words: Vec<&str> = tokens.iter().map(|(t, _)| t.as_str()).collect();
        assert!(words.contains(&"quick"));
        assert!(words.contains(&"brown"));
        assert!(words.contains(&"fox"));
        assert!(!words.contains(&"the"));
    }

    #[test]
    fn positions_increase_monotonically() {
        let mut tokenizer = FrameTokenizer::new(&TokenizerConfig {
            remove_stop_words: false,
            ..TokenizerConfig::default()
        });
        let tokens = tokenizer.tokenize("alpha beta gamma");
        let positions: Vec<u32> = tokens.iter().map(|(_, p)| *p).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }
}
