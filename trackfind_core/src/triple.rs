//! Segment triples and track construction from triple paths.
//!
//! A triple joins an axial segment of superlayer `k`, a stereo segment of
//! `k + 1` and an axial segment of `k + 2`. The axial pair fixes the xy
//! circle, the stereo middle the sz line. Triples sharing a segment
//! (`a.end == b.start`) are related, and the automaton picks the longest
//! chains of triples, which condense into tracks.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::automaton::{AutomatonConfig, CellularAutomaton};
use crate::error::TrackingError;
use crate::filter::{is_accepted, EventContext, Filter, HitContent, Weight, REJECT};
use crate::fit::{fit_stereo_hits, normalize_angle, FitResult, SzFitter, SzTrajectory, Trajectory2D};
use crate::hits::{CellTable, HitId, HitStore, WireHit};
use crate::metrics::EventStats;
use crate::relation::RelationBuilder;
use crate::segment::Segment;
use crate::track::{Track, TrackFitter, TrackOrigin};

// ============================================================================
// CANDIDATE TYPES
// ============================================================================

/// Two axial segments two superlayers apart with their combined fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentPair {
    /// Index of the inner segment
    pub start: usize,
    /// Index of the outer segment
    pub end: usize,
    pub fit: FitResult<Trajectory2D>,
}

impl HitContent for SegmentPair {
    fn collect_hits(&self, event: &EventContext<'_>, out: &mut Vec<HitId>) {
        for index in [self.start, self.end] {
            if let Some(segment) = event.segments.get(index) {
                out.extend_from_slice(&segment.hits);
            }
        }
    }
}

/// Axial, stereo and axial segment of three consecutive superlayers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentTriple {
    pub start: usize,
    pub middle: usize,
    pub end: usize,
    /// Combined fit of the axial segments
    pub trajectory: Trajectory2D,
    /// Fit of the stereo middle along `trajectory`
    pub sz: SzTrajectory,
    pub sz_chi2: f64,
    pub sz_ndf: usize,
    /// Grade given by the triple filter
    pub weight: Weight,
}

impl SegmentTriple {
    pub fn segments(&self) -> [usize; 3] {
        [self.start, self.middle, self.end]
    }

    pub fn sz_chi2_per_ndf(&self) -> f64 {
        if self.sz_ndf == 0 {
            0.0
        } else {
            self.sz_chi2 / self.sz_ndf as f64
        }
    }
}

impl HitContent for SegmentTriple {
    fn collect_hits(&self, event: &EventContext<'_>, out: &mut Vec<HitId>) {
        for index in self.segments() {
            if let Some(segment) = event.segments.get(index) {
                out.extend_from_slice(&segment.hits);
            }
        }
    }
}

/// Two triples sharing a segment, `triples[from].end == triples[to].start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripleRelation {
    pub from: usize,
    pub to: usize,
}

impl HitContent for TripleRelation {
    fn collect_hits(&self, event: &EventContext<'_>, out: &mut Vec<HitId>) {
        let (Some(from), Some(to)) = (event.triples.get(self.from), event.triples.get(self.to)) else {
            return;
        };
        let mut segments = from.segments().to_vec();
        segments.extend(to.segments().into_iter().filter(|&s| s != from.end));
        for index in segments {
            if let Some(segment) = event.segments.get(index) {
                out.extend_from_slice(&segment.hits);
            }
        }
    }

    fn nominal_weight(&self, _event: &EventContext<'_>) -> Weight {
        0.0
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Configuration for the TripleTrackBuilder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TripleConfig {
    /// Largest azimuth difference between segments of one triple (rad)
    pub max_delta_phi: f64,

    /// Tracks built from triple paths need at least this many hits
    pub min_track_hits: usize,

    pub automaton: AutomatonConfig,
}

impl Default for TripleConfig {
    fn default() -> Self {
        Self {
            max_delta_phi: 0.8,
            min_track_hits: 8,
            automaton: AutomatonConfig::default(),
        }
    }
}

/// Builds segment pairs, triples and the tracks of triple paths.
#[derive(Debug, Clone, Default)]
pub struct TripleTrackBuilder {
    config: TripleConfig,
    automaton: CellularAutomaton,
    fitter: TrackFitter,
}

impl TripleTrackBuilder {
    pub fn new(config: TripleConfig, fitter: TrackFitter) -> Self {
        let automaton = CellularAutomaton::new(config.automaton.clone());
        Self {
            config,
            automaton,
            fitter,
        }
    }

    /// Pairs of axial segments in superlayers `k` and `k + 2` accepted by the filter.
    pub fn build_pairs(
        &self,
        filter: &mut dyn Filter<SegmentPair>,
        event: &EventContext<'_>,
        stats: &mut EventStats,
    ) -> Vec<SegmentPair> {
        let segments = event.segments;
        let store = event.hits;
        let phis: Vec<f64> = segments.iter().map(|s| s.phi(store)).collect();
        let mut pairs = Vec::new();

        for (start, inner) in segments.iter().enumerate() {
            if !inner.is_axial() {
                continue;
            }
            for (end, outer) in segments.iter().enumerate() {
                if !outer.is_axial() || outer.superlayer != inner.superlayer + 2 {
                    continue;
                }
                if normalize_angle(phis[end] - phis[start]).abs() > self.config.max_delta_phi {
                    continue;
                }
                let mut hits = inner.hits.clone();
                hits.extend_from_slice(&outer.hits);
                let Some(fit) = self.fitter.circle.fit_ids(&hits, store) else {
                    continue;
                };
                let pair = SegmentPair { start, end, fit };
                if is_accepted(filter.weigh(&pair, event)) {
                    pairs.push(pair);
                }
            }
        }

        stats.segment_pairs += pairs.len();
        pairs
    }

    /// Completes accepted pairs with a stereo middle segment.
    pub fn build_triples(
        &self,
        pairs: &[SegmentPair],
        filter: &mut dyn Filter<SegmentTriple>,
        event: &EventContext<'_>,
        stats: &mut EventStats,
    ) -> Vec<SegmentTriple> {
        let segments = event.segments;
        let store = event.hits;
        let mut triples = Vec::new();

        for pair in pairs {
            let inner = &segments[pair.start];
            let start_phi = inner.phi(store);
            for (middle, candidate) in segments.iter().enumerate() {
                if candidate.is_axial() || candidate.superlayer != inner.superlayer + 1 {
                    continue;
                }
                if normalize_angle(candidate.phi(store) - start_phi).abs() > self.config.max_delta_phi {
                    continue;
                }
                let stereo: Vec<&WireHit> = candidate.hits.iter().map(|&id| store.get(id)).collect();
                let Some(sz) = fit_stereo_hits(&stereo, &pair.fit.trajectory, &SzFitter) else {
                    continue;
                };
                let mut triple = SegmentTriple {
                    start: pair.start,
                    middle,
                    end: pair.end,
                    trajectory: pair.fit.trajectory,
                    sz: sz.trajectory,
                    sz_chi2: sz.chi2,
                    sz_ndf: sz.ndf,
                    weight: REJECT,
                };
                let weight = filter.weigh(&triple, event);
                if is_accepted(weight) {
                    triple.weight = weight;
                    triples.push(triple);
                }
            }
        }

        stats.triples += triples.len();
        triples
    }

    /// Extracts triple paths with the automaton and turns them into tracks.
    ///
    /// Relation weights are the filter weight minus the hits of the shared
    /// segment, so a path's value counts every hit once. Hits already taken
    /// by an earlier track are left out of later ones.
    pub fn build_tracks(
        &self,
        triples: &[SegmentTriple],
        filter: &mut dyn Filter<TripleRelation>,
        event: &EventContext<'_>,
        cells: &mut CellTable,
        stats: &mut EventStats,
    ) -> Vec<Track> {
        let event = event.with_triples(triples);
        let segments = event.segments;

        let mut by_start: HashMap<usize, Vec<usize>> = HashMap::new();
        for (index, triple) in triples.iter().enumerate() {
            by_start.entry(triple.start).or_default().push(index);
        }

        let (relations, relation_stats) = RelationBuilder.build(
            triples.len(),
            |from, out| {
                if let Some(next) = by_start.get(&triples[from].end) {
                    out.extend_from_slice(next);
                }
            },
            |from, to| {
                let weight = filter.weigh(&TripleRelation { from, to }, &event);
                let shared = segments.get(triples[from].end).map_or(0, Segment::len);
                weight - shared as f64
            },
        );
        stats.triple_relations.merge(&relation_stats);

        let intrinsic: Vec<Weight> = triples.iter().map(|t| t.weight).collect();
        let outcome = self.automaton.find_paths(&intrinsic, &relations);
        stats.record_automaton(&outcome);

        let mut tracks = Vec::new();
        for path in &outcome.paths {
            let chain: Vec<SegmentTriple> = path.iter().map(|&i| triples[i]).collect();
            let hits: Vec<HitId> = condense_triples(&chain, segments)
                .into_iter()
                .filter(|&id| cells.is_available(id))
                .collect();
            if hits.len() < self.config.min_track_hits {
                continue;
            }
            if let Some(track) = Track::fit(hits, event.hits, &self.fitter, TrackOrigin::Automaton) {
                for &id in &track.hits {
                    cells.try_take(id);
                }
                tracks.push(track);
            }
        }

        debug!(
            "Built {} tracks from {} triples ({} paths)",
            tracks.len(),
            triples.len(),
            outcome.paths.len()
        );
        stats.automaton_tracks += tracks.len();
        tracks
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

/// Hits of a chain of triples in flight order, shared segments once.
pub fn condense_triples(chain: &[SegmentTriple], segments: &[Segment]) -> Vec<HitId> {
    let mut order: Vec<usize> = Vec::new();
    for triple in chain {
        for index in triple.segments() {
            if order.last() != Some(&index) {
                order.push(index);
            }
        }
    }
    order
        .into_iter()
        .filter_map(|index| segments.get(index))
        .flat_map(|segment| segment.hits.iter().copied())
        .collect()
}

/// Splits a track into its superlayer segments and overlapping triples.
///
/// Needs an odd number (at least three) of superlayer runs.
pub fn track_to_triple_chain(
    track: &Track,
    store: &HitStore,
    fitter: &TrackFitter,
) -> Result<(Vec<Segment>, Vec<SegmentTriple>), TrackingError> {
    let mut segments: Vec<Segment> = Vec::new();
    for &id in &track.hits {
        let hit = store.get(id);
        match segments.last_mut() {
            Some(segment) if segment.superlayer == hit.superlayer() => segment.hits.push(id),
            _ => segments.push(Segment {
                superlayer: hit.superlayer(),
                stereo: hit.stereo,
                hits: vec![id],
                trajectory: track.trajectory,
                chi2: 0.0,
                ndf: 0,
            }),
        }
    }

    let count = segments.len();
    if count < 3 || count % 2 == 0 {
        return Err(TrackingError::IncompatibleChain(count));
    }

    for segment in &mut segments {
        if let Some(fit) = fitter.circle.fit_ids(&segment.hits, store) {
            segment.trajectory = fit.trajectory;
            segment.chi2 = fit.chi2;
            segment.ndf = fit.ndf;
        }
    }

    let sz = track.sz.unwrap_or(SzTrajectory::new(0.0, 0.0));
    let triples = (0..count - 2)
        .step_by(2)
        .map(|k| SegmentTriple {
            start: k,
            middle: k + 1,
            end: k + 2,
            trajectory: track.trajectory,
            sz,
            sz_chi2: 0.0,
            sz_ndf: 0,
            weight: (segments[k].len() + segments[k + 1].len() + segments[k + 2].len()) as Weight,
        })
        .collect();

    Ok((segments, triples))
}
