//! Segment finding inside clusters.
//!
//! Hits of a cluster are connected to their outward neighbours, the hit pair
//! filter grades the connections and the cellular automaton extracts the
//! longest chains. Chains that are long enough become segments.

use serde::{Deserialize, Serialize};
use tracing::debug;
use trackfind_env::StereoKind;

use crate::automaton::{AutomatonConfig, CellularAutomaton};
use crate::cluster::Cluster;
use crate::filter::{EventContext, Filter, HitContent, Weight};
use crate::fit::{CircleFitter, Trajectory2D};
use crate::hits::{CellTable, HitId, HitStore};
use crate::metrics::EventStats;
use crate::relation::{HitNeighborhood, RelationBuilder};

/// Candidate connection between hits of adjacent layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitPair {
    pub from: HitId,
    pub to: HitId,
}

impl HitContent for HitPair {
    fn collect_hits(&self, _event: &EventContext<'_>, out: &mut Vec<HitId>) {
        out.push(self.from);
        out.push(self.to);
    }

    fn nominal_weight(&self, _event: &EventContext<'_>) -> Weight {
        1.0
    }
}

/// Ordered hits of one superlayer with a local fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub superlayer: u8,
    pub stereo: StereoKind,
    /// Hits, inside out
    pub hits: Vec<HitId>,
    pub trajectory: Trajectory2D,
    pub chi2: f64,
    pub ndf: usize,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn is_axial(&self) -> bool {
        self.stereo.is_axial()
    }

    /// Azimuth of the mean wire position.
    pub fn phi(&self, store: &HitStore) -> f64 {
        let sum = self
            .hits
            .iter()
            .fold(nalgebra::Vector2::zeros(), |acc, &id| acc + store.get(id).ref_position);
        sum.y.atan2(sum.x)
    }

    /// Fits the hits as given, `None` if they cannot be fitted.
    pub fn fit(hits: Vec<HitId>, store: &HitStore, fitter: &CircleFitter) -> Option<Self> {
        let first = store.get(*hits.first()?);
        let result = fitter.fit_ids(&hits, store)?;
        Some(Self {
            superlayer: first.superlayer(),
            stereo: first.stereo,
            hits,
            trajectory: result.trajectory,
            chi2: result.chi2,
            ndf: result.ndf,
        })
    }
}

impl HitContent for Segment {
    fn collect_hits(&self, _event: &EventContext<'_>, out: &mut Vec<HitId>) {
        out.extend_from_slice(&self.hits);
    }
}

/// Configuration for the SegmentFinder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentFinderConfig {
    /// Shorter chains are discarded
    pub min_segment_hits: usize,

    /// Wire window towards the next layer
    pub wire_window: u16,

    pub automaton: AutomatonConfig,
}

impl Default for SegmentFinderConfig {
    fn default() -> Self {
        Self {
            min_segment_hits: 3,
            wire_window: 1,
            automaton: AutomatonConfig::default(),
        }
    }
}

/// Builds segments from clusters.
#[derive(Debug, Clone, Default)]
pub struct SegmentFinder {
    config: SegmentFinderConfig,
    automaton: CellularAutomaton,
    fitter: CircleFitter,
}

impl SegmentFinder {
    pub fn new(config: SegmentFinderConfig) -> Self {
        let automaton = CellularAutomaton::new(config.automaton.clone());
        Self {
            config,
            automaton,
            fitter: CircleFitter::default(),
        }
    }

    /// Segments of all non-background clusters, in cluster order.
    ///
    /// Only available cells take part; hits of discarded chains stay free
    /// for later stages.
    pub fn find_segments(
        &self,
        clusters: &[Cluster],
        filter: &mut dyn Filter<HitPair>,
        event: &EventContext<'_>,
        cells: &CellTable,
        stats: &mut EventStats,
    ) -> Vec<Segment> {
        let store = event.hits;
        let mut segments = Vec::new();

        for cluster in clusters.iter().filter(|c| !c.background) {
            let nodes: Vec<HitId> = cluster
                .hits
                .iter()
                .copied()
                .filter(|&id| cells.is_available(id))
                .collect();
            if nodes.len() < self.config.min_segment_hits.max(1) {
                continue;
            }

            let neighbourhood =
                HitNeighborhood::new(store, event.geometry, &nodes, self.config.wire_window);
            let (relations, relation_stats) = RelationBuilder.build(
                nodes.len(),
                |from, out| neighbourhood.neighbours(from, out),
                |from, to| {
                    let pair = HitPair {
                        from: nodes[from],
                        to: nodes[to],
                    };
                    filter.weigh(&pair, event)
                },
            );
            stats.hit_relations.merge(&relation_stats);

            let intrinsic = vec![1.0; nodes.len()];
            let outcome = self.automaton.find_paths(&intrinsic, &relations);
            stats.record_automaton(&outcome);

            for path in outcome.paths {
                if path.len() < self.config.min_segment_hits {
                    continue;
                }
                let hits: Vec<HitId> = path.into_iter().map(|i| nodes[i]).collect();
                if let Some(segment) = Segment::fit(hits, store, &self.fitter) {
                    segments.push(segment);
                }
            }
        }

        debug!("Built {} segments from {} clusters", segments.len(), clusters.len());
        stats.segments += segments.len();
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Clusterizer;
    use crate::filter::{AllFilter, NoneFilter};
    use trackfind_env::{CylindricalGeometry, RawHit, WireId};

    fn segments_for(raw: Vec<RawHit>, filter: &mut dyn Filter<HitPair>) -> (Vec<Segment>, EventStats) {
        let geometry = CylindricalGeometry::default();
        let store = HitStore::build(&raw, &geometry).unwrap();
        let mut cells = CellTable::new(store.len());
        let clusters = Clusterizer::default().clusterize(&store, &geometry, &mut cells);
        let event = EventContext::new(&store, &geometry);
        let mut stats = EventStats::default();
        let segments =
            SegmentFinder::default().find_segments(&clusters, filter, &event, &cells, &mut stats);
        (segments, stats)
    }

    #[test]
    fn test_column_becomes_one_segment() {
        let raw = crate::hits::tests::column(2, 40, 6);
        let (segments, stats) = segments_for(raw, &mut AllFilter::<HitPair>::new(1.0));

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].len(), 6);
        assert_eq!(segments[0].superlayer, 2);
        assert!(segments[0].is_axial());
        assert_eq!(stats.hit_relations.accepted, 5);
        // Inside out
        let layers: Vec<u8> = segments[0].hits.iter().map(|id| id.0 as u8).collect();
        assert_eq!(layers, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_reject_all_leaves_no_segments() {
        let raw = crate::hits::tests::column(0, 40, 6);
        let (segments, stats) = segments_for(raw, &mut NoneFilter::<HitPair>::new());
        assert!(segments.is_empty());
        assert_eq!(stats.hit_relations.rejected, 5);
    }

    #[test]
    fn test_background_cluster_skipped() {
        let raw = vec![
            RawHit::new(WireId::new(0, 0, 3), 0.1),
            RawHit::new(WireId::new(0, 1, 3), 0.1),
        ];
        let (segments, _) = segments_for(raw, &mut AllFilter::<HitPair>::new(1.0));
        assert!(segments.is_empty());
    }
}
