// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Synthetic record and vector generators, used by the rest of the
//! workspace's tests and benchmarks in place of hand-written fixtures.

mod text;
mod vectors;

pub use text::{LoremGenerator, LoremParams};
pub use vectors::{VectorGenerator, VectorParams};

use contextframe_table::schema::DatasetSchema;
use contextframe_table::{Record, RecordBuilder, RecordType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Knobs for [`RecordGenerator`], mirroring the common fields a test
/// fixture wants to vary: how much text, whether vectors are attached,
/// and how many tags/relationships to scatter across records.
#[derive(Debug, Clone)]
pub struct RecordGenParams {
    pub lorem: LoremParams,
    pub vector: Option<VectorParams>,
    pub max_tags: usize,
    pub record_type: RecordType,
    pub seed: u64,
}

impl Default for RecordGenParams {
    fn default() -> Self {
        Self {
            lorem: LoremParams::default(),
            vector: None,
            max_tags: 3,
            record_type: RecordType::Document,
            seed: 0,
        }
    }
}

/// Generates a deterministic stream of synthetic [`Record`]s for a
/// given [`DatasetSchema`].
pub struct RecordGenerator {
    rng: StdRng,
    lorem: LoremGenerator,
    vectors: Option<VectorGenerator>,
    params: RecordGenParams,
    index: u64,
}

impl RecordGenerator {
    pub fn new(params: RecordGenParams) -> Self {
        let vectors = params.vector.clone().map(VectorGenerator::new);
        Self {
            rng: StdRng::seed_from_u64(params.seed),
            lorem: LoremGenerator::new(params.lorem.clone()),
            vectors,
            params,
            index: 0,
        }
    }

    /// Generate `n` records, validating each against `schema`. Panics
    /// if a generated record fails validation, since that would
    /// indicate a mismatch between the generator's configuration and
    /// the schema's `embed_dim` rather than a legitimate test input.
    pub fn generate(&mut self, n: usize, schema: &DatasetSchema) -> Vec<Record> {
        (0..n).map(|_| self.next_record(schema)).collect()
    }

    pub fn next_record(&mut self, schema: &DatasetSchema) -> Record {
        self.index += 1;
        let title = format!("{} #{}", self.lorem.sentence(3, 6), self.index);
        let body = self.lorem.paragraph(20, 60);

        let mut builder = RecordBuilder::new(title)
            .text_content(body)
            .record_type(self.params.record_type);

        if let Some(generator) = &mut self.vectors {
            builder = builder.vector(generator.next_vector());
        }

        let tag_count = self.rng.random_range(0..=self.params.max_tags);
        for _ in 0..tag_count {
            builder = builder.tag(self.lorem.word());
        }

        builder
            .build(schema)
            .expect("generated record must satisfy the schema it was generated for")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextframe_table::schema::DatasetSchema;

    #[test]
    fn generated_records_validate_against_their_schema() {
        let schema = DatasetSchema::new(8);
        let mut generator = RecordGenerator::new(RecordGenParams {
            vector: Some(VectorParams { dim: 8, ..VectorParams::default() }),
            seed: 7,
            ..Default::default()
        });
        let records = generator.generate(10, &schema);
        assert_eq!(records.len(), 10);
        for record in &records {
            assert!(record.is_valid(&schema));
            assert_eq!(record.vector.as_ref().unwrap().len(), 8);
        }
    }

    #[test]
    fn same_seed_produces_identical_records() {
        let schema = DatasetSchema::new(4);
        let params = RecordGenParams {
            vector: Some(VectorParams { dim: 4, ..VectorParams::default() }),
            seed: 42,
            ..Default::default()
        };
        let mut a = RecordGenerator::new(params.clone());
        let mut b = RecordGenerator::new(params);
        let ra = a.next_record(&schema);
        let rb = b.next_record(&schema);
        assert_eq!(ra.title, rb.title);
        assert_eq!(ra.vector, rb.vector);
    }
}
