// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! A tiny deterministic lorem-ipsum-style text generator, enough to
//! give scalar and full-text indices realistic-looking input without
//! pulling in a word-list dependency for a handful of fixture words.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua", "enim",
    "ad", "minim", "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris", "nisi",
    "aliquip", "ex", "ea", "commodo", "consequat", "duis", "aute", "irure", "reprehenderit",
    "voluptate", "velit", "esse", "cillum", "fugiat", "nulla", "pariatur", "excepteur", "sint",
    "occaecat", "cupidatat", "non", "proident", "sunt", "culpa", "qui", "officia", "deserunt",
    "mollit", "anim", "id", "est", "laborum",
];

#[derive(Debug, Clone)]
pub struct LoremParams {
    pub seed: u64,
}

impl Default for LoremParams {
    fn default() -> Self {
        Self { seed: 0 }
    }
}

pub struct LoremGenerator {
    rng: StdRng,
}

impl LoremGenerator {
    pub fn new(params: LoremParams) -> Self {
        Self {
            rng: StdRng::seed_from_u64(params.seed),
        }
    }

    pub fn word(&mut self) -> String {
        WORDS[self.rng.random_range(0..WORDS.len())].to_string()
    }

    pub fn sentence(&mut self, min_words: usize, max_words: usize) -> String {
        let n = self.rng.random_range(min_words..=max_words.max(min_words));
        let mut words: Vec<String> = (0..n).map(|_| self.word()).collect();
        if let Some(first) = words.first_mut() {
            let mut chars: Vec<char> = first.chars().collect();
            if let Some(c) = chars.first_mut() {
                *c = c.to_ascii_uppercase();
            }
            *first = chars.into_iter().collect();
        }
        let mut sentence = words.join(" ");
        sentence.push('.');
        sentence
    }

    pub fn paragraph(&mut self, min_words: usize, max_words: usize) -> String {
        let total = self.rng.random_range(min_words..=max_words.max(min_words));
        let mut words_remaining = total;
        let mut sentences = Vec::new();
        while words_remaining > 0 {
            let take = (5.min(words_remaining)).max(1);
            sentences.push(self.sentence(take, take));
            words_remaining = words_remaining.saturating_sub(take);
        }
        sentences.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentence_starts_with_uppercase_and_ends_with_period() {
        let mut gen = LoremGenerator::new(LoremParams { seed: 3 });
        let s = gen.sentence(3, 3);
        assert!(s.ends_with('.'));
        assert!(s.chars().next().unwrap().is_uppercase());
    }

    #[test]
    fn same_seed_is_deterministic() {
        let mut a = LoremGenerator::new(LoremParams { seed: 9 });
        let mut b = LoremGenerator::new(LoremParams { seed: 9 });
        assert_eq!(a.paragraph(20, 20), b.paragraph(20, 20));
    }
}
