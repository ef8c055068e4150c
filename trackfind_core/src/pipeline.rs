//! The per-event track finding pipeline.
//!
//! Stages, in order: hit store, clusters, segments, segment pairs and
//! triples, automaton tracks, Hough tracks over the remaining hits, quality
//! assertion and the track filter. One [`TrackFinder`] processes one event
//! at a time; run one instance per worker thread for parallel processing.

use tracing::{debug, warn};

use trackfind_env::{HitSource, McTruthLookup, WireGeometry};

use crate::cluster::Clusterizer;
use crate::config::TrackFinderConfig;
use crate::error::{ConfigError, TrackingError};
use crate::filter::{is_accepted, EventContext, Filter, FilterConfig, FilterFactory, FilterRegistry};
use crate::hits::{CellTable, HitStore};
use crate::hough::HoughTrackFinder;
use crate::metrics::{EventStats, PipelineMetrics};
use crate::quality::QualityAsserter;
use crate::segment::{HitPair, Segment, SegmentFinder};
use crate::track::{Track, TrackFitter};
use crate::triple::{SegmentPair, SegmentTriple, TripleRelation, TripleTrackBuilder};

/// Receiver of finished tracks.
pub trait TrackCollector {
    fn collect(&mut self, track: Track);
}

impl TrackCollector for Vec<Track> {
    fn collect(&mut self, track: Track) {
        self.push(track);
    }
}

/// Everything one event produced.
#[derive(Debug, Clone, Default)]
pub struct EventOutput {
    /// Tracks in stage order: automaton tracks first, then Hough tracks
    pub tracks: Vec<Track>,
    pub segments: Vec<Segment>,
    /// Hit store the ids of tracks and segments refer to
    pub hits: HitStore,
    pub stats: EventStats,
}

struct StageFilters {
    hit_pairs: Box<dyn Filter<HitPair>>,
    segment_pairs: Box<dyn Filter<SegmentPair>>,
    triples: Box<dyn Filter<SegmentTriple>>,
    triple_relations: Box<dyn Filter<TripleRelation>>,
    tracks: Box<dyn Filter<Track>>,
}

/// Cellular automaton and Hough track finder.
pub struct TrackFinder {
    config: TrackFinderConfig,
    clusterizer: Clusterizer,
    segment_finder: SegmentFinder,
    triple_builder: TripleTrackBuilder,
    hough: HoughTrackFinder,
    quality: QualityAsserter,
    filters: StageFilters,
    /// Name of the first selected filter that reads truth, if any
    truth_filter: Option<String>,
    cells: CellTable,
    metrics: PipelineMetrics,
}

impl TrackFinder {
    /// Instantiates the configured filters and initializes them.
    ///
    /// Fails if a filter needs simulation truth and `truth_available` is
    /// false.
    pub fn new(
        config: TrackFinderConfig,
        registry: &FilterRegistry,
        geometry: &dyn WireGeometry,
        truth_available: bool,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let selection = &config.filters;
        let filters = StageFilters {
            hit_pairs: create(&registry.hit_pairs, &selection.hit_pairs, geometry, truth_available)?,
            segment_pairs: create(&registry.segment_pairs, &selection.segment_pairs, geometry, truth_available)?,
            triples: create(&registry.triples, &selection.triples, geometry, truth_available)?,
            triple_relations: create(
                &registry.triple_relations,
                &selection.triple_relations,
                geometry,
                truth_available,
            )?,
            tracks: create(&registry.tracks, &selection.tracks, geometry, truth_available)?,
        };
        let truth_filter = [
            (filters.hit_pairs.needs_truth_information(), &selection.hit_pairs),
            (filters.segment_pairs.needs_truth_information(), &selection.segment_pairs),
            (filters.triples.needs_truth_information(), &selection.triples),
            (filters.triple_relations.needs_truth_information(), &selection.triple_relations),
            (filters.tracks.needs_truth_information(), &selection.tracks),
        ]
        .into_iter()
        .find(|(needs, _)| *needs)
        .map(|(_, selected)| selected.name.clone());

        let fitter = TrackFitter::new(config.fit.clone());
        Ok(Self {
            clusterizer: Clusterizer::new(config.cluster.clone()),
            segment_finder: SegmentFinder::new(config.segments.clone()),
            triple_builder: TripleTrackBuilder::new(config.triples.clone(), fitter.clone()),
            hough: HoughTrackFinder::new(config.hough.clone(), fitter.clone()),
            quality: QualityAsserter::new(config.quality.clone(), fitter),
            filters,
            truth_filter,
            cells: CellTable::default(),
            metrics: PipelineMetrics::default(),
            config,
        })
    }

    pub fn config(&self) -> &TrackFinderConfig {
        &self.config
    }

    /// Counters accumulated over all processed events.
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Finds the tracks of one event.
    ///
    /// An event without hits gives an empty output. Fails on hits the
    /// geometry does not know, and on events without truth when a selected
    /// filter reads it.
    pub fn process_event(
        &mut self,
        hits: &dyn HitSource,
        geometry: &dyn WireGeometry,
        truth: Option<&dyn McTruthLookup>,
    ) -> Result<EventOutput, TrackingError> {
        match self.run_event(hits, geometry, truth) {
            Ok(output) => {
                self.metrics.record(&output.stats);
                Ok(output)
            }
            Err(e) => {
                warn!("Event failed: {}", e);
                self.metrics.record_failure();
                Err(e)
            }
        }
    }

    /// Like [`process_event`](Self::process_event), handing the tracks to a collector.
    pub fn process_into(
        &mut self,
        hits: &dyn HitSource,
        geometry: &dyn WireGeometry,
        truth: Option<&dyn McTruthLookup>,
        collector: &mut dyn TrackCollector,
    ) -> Result<EventStats, TrackingError> {
        let output = self.process_event(hits, geometry, truth)?;
        for track in output.tracks {
            collector.collect(track);
        }
        Ok(output.stats)
    }

    fn run_event(
        &mut self,
        hits: &dyn HitSource,
        geometry: &dyn WireGeometry,
        truth: Option<&dyn McTruthLookup>,
    ) -> Result<EventOutput, TrackingError> {
        if let (Some(name), None) = (&self.truth_filter, truth) {
            return Err(TrackingError::TruthMissing(name.clone()));
        }
        let store = HitStore::build(hits, geometry)?;
        let mut stats = EventStats {
            hits: store.len(),
            ..Default::default()
        };
        self.cells.reset(store.len());
        if store.is_empty() {
            return Ok(EventOutput {
                hits: store,
                stats,
                ..Default::default()
            });
        }

        let clusters = self.clusterizer.clusterize(&store, geometry, &mut self.cells);
        stats.clusters = clusters.len();
        stats.background_clusters = clusters.iter().filter(|c| c.background).count();

        let event = EventContext::new(&store, geometry).with_truth(truth);
        let segments = self.segment_finder.find_segments(
            &clusters,
            self.filters.hit_pairs.as_mut(),
            &event,
            &self.cells,
            &mut stats,
        );
        let event = event.with_segments(&segments);

        let mut tracks = Vec::new();
        if self.config.use_automaton {
            let pairs = self
                .triple_builder
                .build_pairs(self.filters.segment_pairs.as_mut(), &event, &mut stats);
            let triples =
                self.triple_builder
                    .build_triples(&pairs, self.filters.triples.as_mut(), &event, &mut stats);
            tracks = self.triple_builder.build_tracks(
                &triples,
                self.filters.triple_relations.as_mut(),
                &event,
                &mut self.cells,
                &mut stats,
            );
        }
        if self.config.use_hough {
            tracks.extend(self.hough.find_tracks(&event, &mut self.cells, &mut stats));
        }

        let tracks = self.quality.assert_quality(tracks, &store, &mut self.cells, &mut stats);
        let mut accepted = Vec::with_capacity(tracks.len());
        for track in tracks {
            if is_accepted(self.filters.tracks.weigh(&track, &event)) {
                accepted.push(track);
            } else {
                for &id in &track.hits {
                    self.cells.release(id);
                }
                stats.tracks_rejected += 1;
            }
        }

        stats.tracks = accepted.len();
        stats.assigned_hits = accepted.iter().map(Track::len).sum();
        debug!(
            "Event: {} hits, {} segments, {} tracks ({} hits assigned)",
            stats.hits, stats.segments, stats.tracks, stats.assigned_hits
        );

        Ok(EventOutput {
            tracks: accepted,
            segments,
            hits: store,
            stats,
        })
    }
}

fn create<T>(
    factory: &FilterFactory<T>,
    config: &FilterConfig,
    geometry: &dyn WireGeometry,
    truth_available: bool,
) -> Result<Box<dyn Filter<T>>, ConfigError> {
    let mut filter = factory.create(config)?;
    if filter.needs_truth_information() && !truth_available {
        return Err(ConfigError::TruthRequired(config.name.clone()));
    }
    filter.initialize(geometry)?;
    debug!("Selected {} filter '{}'", factory.kind(), config.name);
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::{SzTrajectory, Trajectory2D};
    use crate::hits::HitId;
    use crate::track::tests::helix_hits;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use trackfind_env::{CylindricalGeometry, McHitInfo, MapTruthLookup, RawHit, WireId};

    fn finder(config: TrackFinderConfig) -> TrackFinder {
        TrackFinder::new(config, &FilterRegistry::standard(), &CylindricalGeometry::default(), false).unwrap()
    }

    fn all_superlayers() -> Vec<u8> {
        (0..9).collect()
    }

    #[test]
    fn test_single_helix() {
        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(0.006, 1.2);
        let raw = helix_hits(&geometry, &truth, &SzTrajectory::new(0.3, 1.0), &all_superlayers());

        let mut finder = finder(TrackFinderConfig::default());
        let output = finder.process_event(&raw, &geometry, None).unwrap();

        assert!(!output.tracks.is_empty());
        let best = output.tracks.iter().max_by_key(|t| t.len()).unwrap();
        assert!(best.len() >= 30, "best track has {} hits", best.len());
        assert_relative_eq!(best.trajectory.curvature, 0.006, epsilon = 1e-3);
        assert_eq!(output.stats.tracks, output.tracks.len());
        assert_eq!(output.stats.hits, raw.len());

        // Disjoint hit sets
        let mut all: Vec<HitId> = output.tracks.iter().flat_map(|t| t.hits.iter().copied()).collect();
        let count = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), count);
        assert_eq!(finder.metrics().events, 1);
    }

    #[test]
    fn test_clean_helix_is_one_track() {
        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(0.004, 0.5);
        let raw = helix_hits(&geometry, &truth, &SzTrajectory::new(0.2, 0.0), &all_superlayers());
        assert_eq!(raw.len(), 54);

        let mut finder = finder(TrackFinderConfig::default());
        let output = finder.process_event(&raw, &geometry, None).unwrap();

        let lengths: Vec<usize> = output.tracks.iter().map(Track::len).collect();
        assert_eq!(output.tracks.len(), 1, "track lengths {:?}", lengths);
        let track = &output.tracks[0];
        assert_eq!(track.len(), raw.len());
        assert_relative_eq!(track.trajectory.curvature, truth.curvature, epsilon = 2e-4);
        assert!(track.chi2_per_ndf() < 5.0, "chi2/ndf {}", track.chi2_per_ndf());
    }

    #[test]
    fn test_empty_event() {
        let geometry = CylindricalGeometry::default();
        let mut finder = finder(TrackFinderConfig::default());
        let output = finder.process_event(&Vec::<RawHit>::new(), &geometry, None).unwrap();
        assert!(output.tracks.is_empty());
        assert!(output.segments.is_empty());
        assert_eq!(finder.metrics().empty_events, 1);
    }

    #[test]
    fn test_unknown_wire_fails_event() {
        let geometry = CylindricalGeometry::default();
        let raw = vec![RawHit::new(WireId::new(12, 0, 0), 0.1)];
        let mut finder = finder(TrackFinderConfig::default());
        assert!(matches!(
            finder.process_event(&raw, &geometry, None),
            Err(TrackingError::UnknownWire { .. })
        ));
        assert_eq!(finder.metrics().failed_events, 1);
    }

    #[test]
    fn test_truth_filter_needs_truth() {
        let geometry = CylindricalGeometry::default();
        let mut config = TrackFinderConfig::default();
        config.filters.tracks = FilterConfig::named("truth");

        let result = TrackFinder::new(config.clone(), &FilterRegistry::standard(), &geometry, false);
        assert!(matches!(result, Err(ConfigError::TruthRequired(name)) if name == "truth"));
        assert!(TrackFinder::new(config, &FilterRegistry::standard(), &geometry, true).is_ok());
    }

    #[test]
    fn test_event_without_truth_fails_truth_filter() {
        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(0.006, 1.2);
        let raw = helix_hits(&geometry, &truth, &SzTrajectory::new(0.3, 1.0), &all_superlayers());

        let mut config = TrackFinderConfig::default();
        config.filters.segment_pairs = FilterConfig::named("truth");
        let mut finder = TrackFinder::new(config, &FilterRegistry::standard(), &geometry, true).unwrap();

        let result = finder.process_event(&raw, &geometry, None);
        assert!(matches!(result, Err(TrackingError::TruthMissing(name)) if name == "truth"));
        assert_eq!(finder.metrics().failed_events, 1);
        assert_eq!(finder.metrics().events, 1);
    }

    #[test]
    fn test_truth_filter_keeps_true_track() {
        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(-0.008, -0.4);
        let raw = helix_hits(&geometry, &truth, &SzTrajectory::new(-0.2, 0.0), &all_superlayers());
        let mut lookup = MapTruthLookup::new();
        for index in 0..raw.len() {
            lookup.insert(
                index,
                McHitInfo {
                    particle_id: 7,
                    order: index as u32,
                },
            );
        }

        let mut config = TrackFinderConfig::default();
        config.filters.tracks = FilterConfig::named("truth")
            .with_number("min_purity", 0.9)
            .with_number("require_order", 0.0);
        let mut finder = TrackFinder::new(config, &FilterRegistry::standard(), &geometry, true).unwrap();
        let output = finder.process_event(&raw, &geometry, Some(&lookup)).unwrap();
        assert!(!output.tracks.is_empty());
        assert_eq!(output.stats.tracks_rejected, 0);
    }

    #[test]
    fn test_rejecting_track_filter_releases_hits() {
        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(0.006, 1.2);
        let raw = helix_hits(&geometry, &truth, &SzTrajectory::new(0.3, 1.0), &all_superlayers());

        let mut config = TrackFinderConfig::default();
        config.filters.tracks = FilterConfig::named("none");
        let mut finder = finder(config);
        let mut collected: Vec<Track> = Vec::new();
        let stats = finder.process_into(&raw, &geometry, None, &mut collected).unwrap();

        assert!(collected.is_empty());
        assert!(stats.tracks_rejected >= 1);
        assert_eq!(stats.assigned_hits, 0);
    }

    #[test]
    fn test_collector_receives_tracks() {
        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(0.006, 1.2);
        let raw = helix_hits(&geometry, &truth, &SzTrajectory::new(0.3, 1.0), &all_superlayers());
        let mut finder = finder(TrackFinderConfig::default());
        let mut collected: Vec<Track> = Vec::new();
        let stats = finder.process_into(&raw, &geometry, None, &mut collected).unwrap();
        assert_eq!(collected.len(), stats.tracks);
        assert!(!collected.is_empty());
    }

    /// Three separate columns of four hits in the innermost superlayer.
    fn three_chains() -> Vec<RawHit> {
        let mut raw = Vec::new();
        for wire in [10, 60, 120] {
            raw.extend(crate::hits::tests::column(0, wire, 4));
        }
        raw
    }

    fn segment_wires(output: &EventOutput) -> Vec<Vec<WireId>> {
        let mut wires: Vec<Vec<WireId>> = output
            .segments
            .iter()
            .map(|s| s.hits.iter().map(|&id| output.hits.get(id).wire).collect())
            .collect();
        wires.sort();
        wires
    }

    proptest! {
        #[test]
        fn test_chains_independent_of_hit_order(raw in Just(three_chains()).prop_shuffle()) {
            let geometry = CylindricalGeometry::default();
            let config = TrackFinderConfig {
                use_automaton: false,
                use_hough: false,
                ..Default::default()
            };
            let mut finder = finder(config);
            let output = finder.process_event(&raw, &geometry, None).unwrap();
            let reference = finder.process_event(&three_chains(), &geometry, None).unwrap();

            prop_assert_eq!(output.segments.len(), 3);
            prop_assert!(output.segments.iter().all(|s| s.len() == 4));
            prop_assert_eq!(segment_wires(&output), segment_wires(&reference));
        }
    }
}
