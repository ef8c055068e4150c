//! Monitoring counters.
//!
//! [`EventStats`] is filled by one call of the pipeline; [`PipelineMetrics`]
//! accumulates them over a run. Degraded outcomes (automaton iteration bound
//! hits, Hough node budget exhaustion) are counted here in addition to the
//! warnings they log.

use serde::{Deserialize, Serialize};

use crate::automaton::AutomatonOutcome;
use crate::relation::RelationStats;

/// Counters of a single event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventStats {
    pub hits: usize,
    pub clusters: usize,
    pub background_clusters: usize,
    pub hit_relations: RelationStats,
    pub segments: usize,
    pub segment_pairs: usize,
    pub triples: usize,
    pub triple_relations: RelationStats,

    // === Cellular automaton ===
    pub automaton_passes: usize,
    pub automaton_bound_hits: usize,
    pub automaton_recomputations: usize,

    // === Hough search ===
    pub hough_nodes: usize,
    pub hough_budget_exhausted: usize,
    pub stereo_hits_assigned: usize,

    // === Quality assertion ===
    pub hits_dropped: usize,
    pub hits_added: usize,
    pub tracks_split: usize,
    pub tracks_merged: usize,
    pub tracks_removed: usize,
    pub tracks_rejected: usize,

    // === Output ===
    pub automaton_tracks: usize,
    pub hough_tracks: usize,
    pub tracks: usize,
    pub assigned_hits: usize,
}

impl EventStats {
    /// Adds the counters of an automaton run.
    pub fn record_automaton(&mut self, outcome: &AutomatonOutcome) {
        self.automaton_passes += outcome.passes;
        self.automaton_bound_hits += outcome.bound_hits;
        self.automaton_recomputations += outcome.recomputations;
    }

    /// True if any stage ran in a degraded mode.
    pub fn degraded(&self) -> bool {
        self.automaton_bound_hits > 0 || self.hough_budget_exhausted > 0
    }

    /// Adds all counters of another event.
    pub fn accumulate(&mut self, other: &EventStats) {
        self.hits += other.hits;
        self.clusters += other.clusters;
        self.background_clusters += other.background_clusters;
        self.hit_relations.merge(&other.hit_relations);
        self.segments += other.segments;
        self.segment_pairs += other.segment_pairs;
        self.triples += other.triples;
        self.triple_relations.merge(&other.triple_relations);
        self.automaton_passes += other.automaton_passes;
        self.automaton_bound_hits += other.automaton_bound_hits;
        self.automaton_recomputations += other.automaton_recomputations;
        self.hough_nodes += other.hough_nodes;
        self.hough_budget_exhausted += other.hough_budget_exhausted;
        self.stereo_hits_assigned += other.stereo_hits_assigned;
        self.hits_dropped += other.hits_dropped;
        self.hits_added += other.hits_added;
        self.tracks_split += other.tracks_split;
        self.tracks_merged += other.tracks_merged;
        self.tracks_removed += other.tracks_removed;
        self.tracks_rejected += other.tracks_rejected;
        self.automaton_tracks += other.automaton_tracks;
        self.hough_tracks += other.hough_tracks;
        self.tracks += other.tracks;
        self.assigned_hits += other.assigned_hits;
    }
}

/// Counters accumulated over all events of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub events: usize,
    pub empty_events: usize,
    pub degraded_events: usize,
    pub failed_events: usize,
    pub totals: EventStats,
}

impl PipelineMetrics {
    pub fn record(&mut self, stats: &EventStats) {
        self.events += 1;
        if stats.hits == 0 {
            self.empty_events += 1;
        }
        if stats.degraded() {
            self.degraded_events += 1;
        }
        self.totals.accumulate(stats);
    }

    pub fn record_failure(&mut self) {
        self.events += 1;
        self.failed_events += 1;
    }

    pub fn mean_tracks_per_event(&self) -> f64 {
        if self.events == 0 {
            0.0
        } else {
            self.totals.tracks as f64 / self.events as f64
        }
    }

    /// Fraction of hits that ended up on a track.
    pub fn hit_assignment_rate(&self) -> f64 {
        if self.totals.hits == 0 {
            0.0
        } else {
            self.totals.assigned_hits as f64 / self.totals.hits as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_and_rates() {
        let mut metrics = PipelineMetrics::default();
        let stats = EventStats {
            hits: 100,
            assigned_hits: 80,
            tracks: 2,
            automaton_bound_hits: 1,
            ..Default::default()
        };
        metrics.record(&stats);
        metrics.record(&EventStats::default());

        assert_eq!(metrics.events, 2);
        assert_eq!(metrics.empty_events, 1);
        assert_eq!(metrics.degraded_events, 1);
        assert_eq!(metrics.mean_tracks_per_event(), 1.0);
        assert_eq!(metrics.hit_assignment_rate(), 0.8);
    }

    #[test]
    fn test_record_automaton() {
        let mut stats = EventStats::default();
        let outcome = AutomatonOutcome {
            passes: 3,
            bound_hits: 1,
            recomputations: 2,
            ..Default::default()
        };
        stats.record_automaton(&outcome);
        stats.record_automaton(&outcome);
        assert_eq!(stats.automaton_passes, 6);
        assert_eq!(stats.automaton_recomputations, 4);
        assert!(stats.degraded());
    }
}
