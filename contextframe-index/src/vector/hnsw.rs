// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! A single-shard HNSW graph, the alternative to IVF for the
//! `index_type = "IVF_HNSW"` variant (§4.5): `m` neighbors per node,
//! `ef_construction` candidates considered while inserting, and a
//! probabilistically assigned `max_level`.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::metric::DistanceMetric;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswParams {
    pub m: usize,
    pub ef_construction: usize,
    pub max_level: usize,
    pub metric: DistanceMetric,
    pub seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 100,
            max_level: 8,
            metric: DistanceMetric::L2,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    vector: Vec<f32>,
    /// Neighbor lists, one per level this node participates in.
    links: Vec<Vec<u32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswGraph {
    params: HnswParams,
    nodes: Vec<Node>,
    entry_point: Option<u32>,
}

#[derive(Clone, Copy, PartialEq)]
struct ScoredId {
    distance: f32,
    id: u32,
}

impl Eq for ScoredId {}
impl PartialOrd for ScoredId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ScoredId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance.total_cmp(&other.distance)
    }
}

impl HnswGraph {
    pub fn new(params: HnswParams) -> Self {
        Self {
            params,
            nodes: Vec::new(),
            entry_point: None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn random_level(&self, rng: &mut impl Rng) -> usize {
        let mut level = 0;
        // Standard HNSW exponential level assignment, capped at
        // `max_level` so insert cost stays bounded for large builds.
        while rng.random::<f32>() < 0.5 && level < self.params.max_level {
            level += 1;
        }
        level
    }

    /// Build a graph from scratch over all vectors in insertion order.
    /// Determinism is seeded by `params.seed` so two builds over the
    /// same input produce the same graph.
    pub fn build(vectors: Vec<Vec<f32>>, params: HnswParams) -> Self {
        let mut graph = Self::new(params.clone());
        let mut rng = StdRng::seed_from_u64(params.seed);
        for v in vectors {
            graph.insert_with_rng(v, &mut rng);
        }
        graph
    }

    pub fn insert(&mut self, vector: Vec<f32>) -> u32 {
        let mut rng = StdRng::seed_from_u64(self.params.seed ^ (self.nodes.len() as u64));
        self.insert_with_rng(vector, &mut rng)
    }

    fn insert_with_rng(&mut self, vector: Vec<f32>, rng: &mut impl Rng) -> u32 {
        let level = self.random_level(rng);
        let id = self.nodes.len() as u32;
        self.nodes.push(Node {
            vector: vector.clone(),
            links: vec![Vec::new(); level + 1],
        });

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(id);
            return id;
        };

        let mut current = entry;
        let entry_level = self.nodes[entry as usize].links.len() - 1;

        for lc in (level + 1..=entry_level).rev() {
            current = self.greedy_descend(&vector, current, lc);
        }

        for lc in (0..=level.min(entry_level)).rev() {
            let candidates = self.search_layer(&vector, current, self.params.ef_construction, lc);
            let neighbors = self.select_neighbors(&candidates, self.params.m);
            for &n in &neighbors {
                self.link(id, n, lc);
                self.link(n, id, lc);
            }
            if let Some(&best) = neighbors.first() {
                current = best;
            }
        }

        if level > entry_level {
            self.entry_point = Some(id);
        }
        id
    }

    fn link(&mut self, from: u32, to: u32, level: usize) {
        let node = &mut self.nodes[from as usize];
        if level >= node.links.len() {
            return;
        }
        if !node.links[level].contains(&to) {
            node.links[level].push(to);
        }
        if node.links[level].len() > self.params.m * 2 {
            let vector = node.vector.clone();
            let mut scored: Vec<ScoredId> = node.links[level]
                .iter()
                .map(|&n| ScoredId {
                    distance: self.params.metric.distance(&vector, &self.nodes[n as usize].vector),
                    id: n,
                })
                .collect();
            scored.sort();
            scored.truncate(self.params.m * 2);
            self.nodes[from as usize].links[level] = scored.into_iter().map(|s| s.id).collect();
        }
    }

    fn greedy_descend(&self, query: &[f32], mut current: u32, level: usize) -> u32 {
        loop {
            let mut improved = false;
            let current_dist = self.params.metric.distance(query, &self.nodes[current as usize].vector);
            if level >= self.nodes[current as usize].links.len() {
                return current;
            }
            for &neighbor in &self.nodes[current as usize].links[level] {
                let d = self.params.metric.distance(query, &self.nodes[neighbor as usize].vector);
                if d < current_dist {
                    current = neighbor;
                    improved = true;
                    break;
                }
            }
            if !improved {
                return current;
            }
        }
    }

    /// Beam search at a single layer, returning up to `ef` candidates
    /// ordered nearest-first.
    fn search_layer(&self, query: &[f32], entry: u32, ef: usize, level: usize) -> Vec<u32> {
        let mut visited = BTreeSet::new();
        visited.insert(entry);

        let entry_dist = self.params.metric.distance(query, &self.nodes[entry as usize].vector);
        let mut candidates = BinaryHeap::new();
        candidates.push(std::cmp::Reverse(ScoredId {
            distance: entry_dist,
            id: entry,
        }));
        let mut found = BinaryHeap::new();
        found.push(ScoredId {
            distance: entry_dist,
            id: entry,
        });

        while let Some(std::cmp::Reverse(current)) = candidates.pop() {
            let worst_found = found.peek().map(|s| s.distance).unwrap_or(f32::INFINITY);
            if current.distance > worst_found && found.len() >= ef {
                break;
            }

            if level >= self.nodes[current.id as usize].links.len() {
                continue;
            }
            for &neighbor in &self.nodes[current.id as usize].links[level].clone() {
                if !visited.insert(neighbor) {
                    continue;
                }
                let d = self.params.metric.distance(query, &self.nodes[neighbor as usize].vector);
                let worst_found = found.peek().map(|s| s.distance).unwrap_or(f32::INFINITY);
                if found.len() < ef || d < worst_found {
                    candidates.push(std::cmp::Reverse(ScoredId { distance: d, id: neighbor }));
                    found.push(ScoredId { distance: d, id: neighbor });
                    if found.len() > ef {
                        found.pop();
                    }
                }
            }
        }

        let mut result: Vec<ScoredId> = found.into_vec();
        result.sort();
        result.into_iter().map(|s| s.id).collect()
    }

    fn select_neighbors(&self, candidates: &[u32], m: usize) -> Vec<u32> {
        candidates.iter().take(m).copied().collect()
    }

    /// Search for the `ef_search` nearest neighbors of `query`.
    /// `ef_search` should be `>= k` (the design's `refine_factor` is
    /// applied by the caller after this returns distances).
    pub fn search(&self, query: &[f32], ef_search: usize) -> Vec<(u32, f32)> {
        let Some(entry) = self.entry_point else {
            return Vec::new();
        };
        let top_level = self.nodes[entry as usize].links.len() - 1;
        let mut current = entry;
        for lc in (1..=top_level).rev() {
            current = self.greedy_descend(query, current, lc);
        }
        let candidates = self.search_layer(query, current, ef_search, 0);
        candidates
            .into_iter()
            .map(|id| (id, self.params.metric.distance(query, &self.nodes[id as usize].vector)))
            .collect()
    }

    pub fn vector(&self, id: u32) -> &[f32] {
        &self.nodes[id as usize].vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize) -> Vec<Vec<f32>> {
        (0..n).map(|i| vec![(i as f32) * 2.0, 0.0]).collect()
    }

    #[test]
    fn search_finds_exact_nearest_for_small_graph() {
        let vectors = grid(50);
        let graph = HnswGraph::build(
            vectors.clone(),
            HnswParams {
                m: 8,
                ef_construction: 64,
                max_level: 4,
                metric: DistanceMetric::L2,
                seed: 11,
            },
        );
        let query = vec![10.0, 0.0];
        let results = graph.search(&query, 10);
        assert!(!results.is_empty());
        let best = results.iter().min_by(|a, b| a.1.total_cmp(&b.1)).unwrap();
        assert_eq!(best.0, 5);
    }

    #[test]
    fn insert_grows_graph_length() {
        let mut graph = HnswGraph::new(HnswParams::default());
        for v in grid(10) {
            graph.insert(v);
        }
        assert_eq!(graph.len(), 10);
    }
}
