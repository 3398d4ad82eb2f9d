// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! The relationship subsystem (C8, §4.8): forward/reverse traversal of
//! [`Relationship`] edges between records, plus bounded multi-hop
//! expansion. Relationships are stored inline on each record rather
//! than in a separate adjacency structure (§3.1), so every traversal
//! here is a column scan over the `relationships` field -- there is no
//! resident graph (§9 Open Question, recorded in `DESIGN.md`).

use std::collections::HashSet;

use contextframe_core::error::Result;
use uuid::Uuid;

use crate::dataset::store::{core_field_ids, FragmentReader};
use crate::dataset::FrameDataset;
use crate::{Relationship, RelationshipTarget, RelationshipType};

impl FrameDataset {
    /// Look up a single record by uuid (§4.8 `find_by_uuid`). An alias
    /// for [`FrameDataset::get_by_uuid`] kept under this name for
    /// parity with the relationship subsystem's other lookups.
    pub async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<crate::Record>> {
        self.get_by_uuid(uuid).await
    }

    /// The records `uuid`'s relationships point at, optionally filtered
    /// to one [`RelationshipType`] (§4.8 forward traversal). Only
    /// uuid-targeted relationships resolve to records in this dataset;
    /// uri/path/cid targets name something outside it and are skipped.
    pub async fn find_related(&self, uuid: Uuid, kind: Option<RelationshipType>) -> Result<Vec<crate::Record>> {
        let Some(source) = self.get_by_uuid(uuid).await? else {
            return Ok(Vec::new());
        };
        let mut results = Vec::new();
        for relationship in matching(&source.relationships, kind) {
            if let RelationshipTarget::Uuid(target) = &relationship.target {
                if let Some(record) = self.get_by_uuid(*target).await? {
                    results.push(record);
                }
            }
        }
        Ok(results)
    }

    /// Every live record whose relationships point at `target_uuid`,
    /// optionally filtered to one [`RelationshipType`] (§4.8 reverse
    /// traversal). Implemented as a column scan; a dataset with a
    /// relationship-targeting scalar index could instead narrow this to
    /// an index probe, but no such index kind exists yet (§9 Open
    /// Question).
    pub async fn find_reverse(&self, target_uuid: Uuid, kind: Option<RelationshipType>) -> Result<Vec<crate::Record>> {
        let manifest = self.current_manifest().await;
        let schema = &manifest.schema;
        let field_ids = core_field_ids(schema);

        let mut results = Vec::new();
        for fragment in &manifest.fragments {
            let rows = FragmentReader::read(&self.store, fragment, schema, &field_ids, false).await?;
            for (_, record) in rows {
                let points_at_target = matching(&record.relationships, kind)
                    .any(|relationship| relationship.target == RelationshipTarget::Uuid(target_uuid));
                if points_at_target {
                    results.push(record);
                }
            }
        }
        Ok(results)
    }

    /// Breadth-first forward traversal from `start`, up to `max_depth`
    /// hops, returning every newly-reached record exactly once (§4.8
    /// `expand`). Does not build or cache a graph: each hop is a fresh
    /// `find_related` call per frontier uuid (§9: no resident graph).
    pub async fn expand(&self, start: &[Uuid], max_depth: usize) -> Result<Vec<crate::Record>> {
        let mut visited: HashSet<Uuid> = start.iter().copied().collect();
        let mut frontier: Vec<Uuid> = start.to_vec();
        let mut results = Vec::new();

        for _ in 0..max_depth {
            if frontier.is_empty() {
                break;
            }
            let mut next_frontier = Vec::new();
            for uuid in frontier {
                for record in self.find_related(uuid, None).await? {
                    if visited.insert(record.uuid) {
                        next_frontier.push(record.uuid);
                        results.push(record);
                    }
                }
            }
            frontier = next_frontier;
        }
        Ok(results)
    }
}

fn matching(relationships: &[Relationship], kind: Option<RelationshipType>) -> impl Iterator<Item = &Relationship> {
    relationships.iter().filter(move |r| match kind {
        Some(k) => r.kind == k,
        None => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordBuilder;

    async fn linked_dataset(dir: &std::path::Path) -> (FrameDataset, Vec<Uuid>) {
        let ds = FrameDataset::create(dir.to_str().unwrap(), 2).await.unwrap();
        let schema = ds.schema().await;

        let mut uuids = Vec::new();
        for i in 0..4 {
            let record = RecordBuilder::new(format!("doc-{i}")).vector(vec![0.0, 0.0]).build(&schema).unwrap();
            uuids.push(record.uuid);
            ds.add(record).await.unwrap();
        }

        // chain: 0 -> 1 -> 2, and 0 -> 3 (child)
        for (from, to, kind) in [
            (uuids[0], uuids[1], RelationshipType::Related),
            (uuids[1], uuids[2], RelationshipType::Related),
            (uuids[0], uuids[3], RelationshipType::Child),
        ] {
            let mut record = ds.get_by_uuid(from).await.unwrap().unwrap();
            record.add_relationship(Relationship {
                kind,
                target: RelationshipTarget::Uuid(to),
                title: None,
                description: None,
            });
            ds.update(record).await.unwrap();
        }

        (ds, uuids)
    }

    #[tokio::test]
    async fn find_related_resolves_uuid_targets() {
        let dir = tempfile::tempdir().unwrap();
        let (ds, uuids) = linked_dataset(dir.path()).await;
        let related = ds.find_related(uuids[0], None).await.unwrap();
        let found: HashSet<Uuid> = related.iter().map(|r| r.uuid).collect();
        assert_eq!(found, [uuids[1], uuids[3]].into_iter().collect());
    }

    #[tokio::test]
    async fn find_related_filters_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        let (ds, uuids) = linked_dataset(dir.path()).await;
        let related = ds.find_related(uuids[0], Some(RelationshipType::Child)).await.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].uuid, uuids[3]);
    }

    #[tokio::test]
    async fn find_reverse_matches_forward_edges() {
        let dir = tempfile::tempdir().unwrap();
        let (ds, uuids) = linked_dataset(dir.path()).await;
        let reverse = ds.find_reverse(uuids[1], None).await.unwrap();
        assert_eq!(reverse.len(), 1);
        assert_eq!(reverse[0].uuid, uuids[0]);
    }

    #[tokio::test]
    async fn expand_is_breadth_first_and_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let (ds, uuids) = linked_dataset(dir.path()).await;

        let one_hop = ds.expand(&[uuids[0]], 1).await.unwrap();
        let one_hop_ids: HashSet<Uuid> = one_hop.iter().map(|r| r.uuid).collect();
        assert_eq!(one_hop_ids, [uuids[1], uuids[3]].into_iter().collect());

        let two_hops = ds.expand(&[uuids[0]], 2).await.unwrap();
        let two_hop_ids: HashSet<Uuid> = two_hops.iter().map(|r| r.uuid).collect();
        assert_eq!(two_hop_ids, [uuids[1], uuids[2], uuids[3]].into_iter().collect());
    }

    #[tokio::test]
    async fn expand_deduplicates_across_branches() {
        let dir = tempfile::tempdir().unwrap();
        let ds = FrameDataset::create(dir.path().to_str().unwrap(), 2).await.unwrap();
        let schema = ds.schema().await;
        let a = RecordBuilder::new("a").vector(vec![0.0, 0.0]).build(&schema).unwrap();
        let b = RecordBuilder::new("b").vector(vec![0.0, 0.0]).build(&schema).unwrap();
        let c = RecordBuilder::new("c").vector(vec![0.0, 0.0]).build(&schema).unwrap();
        let (a_id, b_id, c_id) = (a.uuid, b.uuid, c.uuid);
        ds.add(a).await.unwrap();
        ds.add(b).await.unwrap();
        ds.add(c).await.unwrap();

        for (from, to) in [(a_id, c_id), (b_id, c_id)] {
            let mut record = ds.get_by_uuid(from).await.unwrap().unwrap();
            record.add_relationship(Relationship {
                kind: RelationshipType::Related,
                target: RelationshipTarget::Uuid(to),
                title: None,
                description: None,
            });
            ds.update(record).await.unwrap();
        }

        let expanded = ds.expand(&[a_id, b_id], 1).await.unwrap();
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].uuid, c_id);
    }
}
