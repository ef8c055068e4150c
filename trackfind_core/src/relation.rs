//! Weighted relations between nodes of a candidate graph.
//!
//! The builder is agnostic of what the nodes are: a neighbourhood closure
//! proposes candidate successors for each node and a weighing closure (a
//! filter in practice) grades them. Only finite weights become relations.

use serde::{Deserialize, Serialize};
use trackfind_env::WireGeometry;

use crate::filter::Weight;
use crate::hits::{HitId, HitStore};

/// Directed, weighted edge between two node indices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightedRelation {
    pub from: usize,
    pub to: usize,
    pub weight: Weight,
}

/// Counters of a relation building pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationStats {
    /// Candidate pairs proposed by the neighbourhood
    pub candidates: usize,
    pub accepted: usize,
    /// Candidates whose weight was NaN or infinite
    pub rejected: usize,
}

impl RelationStats {
    pub fn merge(&mut self, other: &RelationStats) {
        self.candidates += other.candidates;
        self.accepted += other.accepted;
        self.rejected += other.rejected;
    }
}

/// Builds relations from a bounded neighbourhood and a weight function.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelationBuilder;

impl RelationBuilder {
    /// Relations over `node_count` nodes.
    ///
    /// `neighbours(from, &mut out)` fills the candidate successors of `from`;
    /// self relations are skipped. The result is sorted by `to`, with the
    /// relations into one node kept in discovery order.
    pub fn build<N, W>(
        &self,
        node_count: usize,
        mut neighbours: N,
        mut weigh: W,
    ) -> (Vec<WeightedRelation>, RelationStats)
    where
        N: FnMut(usize, &mut Vec<usize>),
        W: FnMut(usize, usize) -> Weight,
    {
        let mut relations = Vec::new();
        let mut stats = RelationStats::default();
        let mut candidates = Vec::new();

        for from in 0..node_count {
            candidates.clear();
            neighbours(from, &mut candidates);
            for &to in &candidates {
                if to == from || to >= node_count {
                    continue;
                }
                stats.candidates += 1;
                let weight = weigh(from, to);
                if weight.is_finite() {
                    stats.accepted += 1;
                    relations.push(WeightedRelation { from, to, weight });
                } else {
                    stats.rejected += 1;
                }
            }
        }

        relations.sort_by_key(|r| r.to);
        (relations, stats)
    }
}

/// Outward neighbourhood of the hits of one cluster.
///
/// Each hit points to the hits of the next layer of its superlayer within
/// a wire window, so the resulting graph is acyclic.
pub struct HitNeighborhood<'a> {
    store: &'a HitStore,
    /// Nodes, ascending
    nodes: &'a [HitId],
    wire_window: u16,
    wire_count: u16,
    layer_count: u8,
}

impl<'a> HitNeighborhood<'a> {
    pub fn new(
        store: &'a HitStore,
        geometry: &dyn WireGeometry,
        nodes: &'a [HitId],
        wire_window: u16,
    ) -> Self {
        let superlayer = nodes.first().map(|&id| store.get(id).superlayer()).unwrap_or(0);
        Self {
            store,
            nodes,
            wire_window,
            wire_count: geometry.wire_count(superlayer),
            layer_count: geometry.layer_count(superlayer),
        }
    }

    /// Candidate successors of node `from`, as node indices.
    pub fn neighbours(&self, from: usize, out: &mut Vec<usize>) {
        let hit = self.store.get(self.nodes[from]);
        if hit.layer() + 1 >= self.layer_count {
            return;
        }
        let near = self.store.hits_near(
            hit.superlayer(),
            hit.layer() + 1,
            hit.wire.wire,
            self.wire_window,
            self.wire_count,
        );
        out.extend(near.into_iter().filter_map(|id| self.nodes.binary_search(&id).ok()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackfind_env::{CylindricalGeometry, RawHit, WireId};

    #[test]
    fn test_rejected_weights_are_omitted() {
        let builder = RelationBuilder;
        let (relations, stats) = builder.build(
            3,
            |_, out| out.extend(0..3usize),
            |from, to| if (from + to) % 2 == 0 { f64::NAN } else { 1.0 },
        );
        // Pairs without self relations: 6, of which (0,2) and (2,0) are rejected
        assert_eq!(stats.candidates, 6);
        assert_eq!(stats.rejected, 2);
        assert_eq!(relations.len(), 4);
        assert!(relations.iter().all(|r| r.from != r.to));
    }

    #[test]
    fn test_sorted_by_target_in_discovery_order() {
        let builder = RelationBuilder;
        let (relations, _) = builder.build(
            4,
            |from, out| {
                if from < 3 {
                    out.push(3)
                }
            },
            |_, _| 1.0,
        );
        let froms: Vec<usize> = relations.iter().map(|r| r.from).collect();
        assert_eq!(froms, vec![0, 1, 2]);
    }

    #[test]
    fn test_hit_neighbourhood_points_outward() {
        let geometry = CylindricalGeometry::default();
        let raw = vec![
            RawHit::new(WireId::new(0, 0, 10), 0.1),
            RawHit::new(WireId::new(0, 1, 10), 0.1),
            RawHit::new(WireId::new(0, 1, 11), 0.1),
            RawHit::new(WireId::new(0, 1, 30), 0.1),
            RawHit::new(WireId::new(0, 2, 11), 0.1),
        ];
        let store = HitStore::build(&raw, &geometry).unwrap();
        let nodes: Vec<HitId> = store.iter().map(|h| h.id).collect();
        let neighbourhood = HitNeighborhood::new(&store, &geometry, &nodes, 1);

        let (relations, stats) =
            RelationBuilder.build(nodes.len(), |from, out| neighbourhood.neighbours(from, out), |_, _| 1.0);

        // 0 -> {1, 2}; 1 -> {4}; 2 -> {4}
        assert_eq!(stats.accepted, 4);
        for r in &relations {
            let from = store.get(nodes[r.from]);
            let to = store.get(nodes[r.to]);
            assert_eq!(to.layer(), from.layer() + 1);
        }
    }
}
