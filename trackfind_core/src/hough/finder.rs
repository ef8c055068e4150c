//! Hough track finding: axial seeds in (phi0, curvature), stereo hits in
//! (tan lambda, z0).

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

use super::{CurveItem, HoughBox, HoughItem, LinearCurve, QuadTreeConfig, QuadTreeSearch, SegmentItem, SinusoidCurve};
use crate::filter::EventContext;
use crate::fit::{stereo_candidates, Trajectory2D};
use crate::hits::{CellTable, HitId, WireHit};
use crate::metrics::EventStats;
use crate::track::{Track, TrackFitter, TrackOrigin};

/// Configuration for the HoughTrackFinder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HoughConfig {
    /// Start direction range (rad)
    pub phi_range: (f64, f64),

    /// Signed curvature range (1/cm)
    pub curvature_range: (f64, f64),

    /// Search over axial hits or segments
    pub axial: QuadTreeConfig,

    /// Vote with whole axial segments instead of single hits
    pub use_segments: bool,

    /// Fraction of a segment's hits that must lie in a box
    pub segment_hit_ratio: f64,

    /// Seeds with fewer free hits are dropped
    pub min_track_hits: usize,

    /// Search over the stereo hits of one track
    pub stereo: QuadTreeConfig,

    pub tan_lambda_range: (f64, f64),

    /// z0 range (cm)
    pub z0_range: (f64, f64),
}

impl Default for HoughConfig {
    fn default() -> Self {
        Self {
            phi_range: (-PI, PI),
            curvature_range: (-0.04, 0.04),
            axial: QuadTreeConfig::default(),
            use_segments: false,
            segment_hit_ratio: 0.6,
            min_track_hits: 8,
            stereo: QuadTreeConfig {
                max_level: 7,
                min_hits: 3,
                overlap: 0.2,
                max_nodes: 50_000,
                max_seeds: Some(1),
            },
            tan_lambda_range: (-3.0, 3.0),
            z0_range: (-40.0, 40.0),
        }
    }
}

/// Builds tracks from quad-tree seeds over the hits left by earlier stages.
#[derive(Debug, Clone, Default)]
pub struct HoughTrackFinder {
    config: HoughConfig,
    axial: QuadTreeSearch,
    stereo: QuadTreeSearch,
    fitter: TrackFitter,
}

impl HoughTrackFinder {
    pub fn new(config: HoughConfig, fitter: TrackFitter) -> Self {
        Self {
            axial: QuadTreeSearch::new(config.axial.clone()),
            stereo: QuadTreeSearch::new(config.stereo.clone()),
            config,
            fitter,
        }
    }

    pub fn config(&self) -> &HoughConfig {
        &self.config
    }

    /// Tracks from the available hits; their hits are taken.
    pub fn find_tracks(
        &self,
        event: &EventContext<'_>,
        cells: &mut CellTable,
        stats: &mut EventStats,
    ) -> Vec<Track> {
        let store = event.hits;
        let root = HoughBox::new(self.config.phi_range, self.config.curvature_range);

        let seeds = if self.config.use_segments {
            let items: Vec<SegmentItem> = event
                .segments
                .iter()
                .filter(|s| s.is_axial() && s.hits.iter().all(|&id| cells.is_available(id)))
                .map(|s| {
                    let hits = s.hits.iter().map(|&id| axial_item(store.get(id))).collect();
                    SegmentItem::new(hits, self.config.segment_hit_ratio)
                })
                .collect();
            self.axial_seeds(root, &items, stats)
        } else {
            let items: Vec<CurveItem<SinusoidCurve>> = store
                .iter()
                .filter(|h| h.is_axial() && cells.is_available(h.id))
                .map(axial_item)
                .collect();
            self.axial_seeds(root, &items, stats)
        };

        let mut tracks = Vec::new();
        for (hits, bounds) in seeds {
            if let Some(track) = self.build_track(hits, &bounds, event, cells, stats) {
                tracks.push(track);
            }
        }
        debug!("Hough search built {} tracks", tracks.len());
        tracks
    }

    /// Adds the free stereo hits whose sz lines agree best with each other.
    ///
    /// Returns the number of hits added. The track is refitted and its hits
    /// ordered by arc length afterwards.
    pub fn assign_stereo_hits(
        &self,
        track: &mut Track,
        event: &EventContext<'_>,
        cells: &CellTable,
        stats: &mut EventStats,
    ) -> usize {
        let store = event.hits;
        let items: Vec<CurveItem<LinearCurve>> = store
            .iter()
            .filter(|h| !h.is_axial() && cells.is_available(h.id) && !track.contains(h.id))
            .filter_map(|h| {
                let curves: Vec<LinearCurve> = stereo_candidates(h, &track.trajectory)
                    .into_iter()
                    .filter(|c| c.s > 0.0)
                    .map(|c| LinearCurve::new(c.s, c.z))
                    .collect();
                (!curves.is_empty()).then(|| CurveItem::new(h.id, curves))
            })
            .collect();
        if items.is_empty() {
            return 0;
        }

        let root = HoughBox::new(self.config.tan_lambda_range, self.config.z0_range);
        let mut taken = vec![false; items.len()];
        let outcome = self.stereo.search(root, &items, &mut taken);
        stats.hough_nodes += outcome.nodes;
        if outcome.budget_exhausted {
            stats.hough_budget_exhausted += 1;
        }

        let Some(seed) = outcome.seeds.first() else {
            return 0;
        };
        let added = seed.items.len();
        track.hits.extend(seed.items.iter().map(|&i| items[i].hit));
        track.refit(store, &self.fitter);
        let mut ordered: Vec<(f64, HitId)> = track
            .hits
            .iter()
            .map(|&id| (track.arc_length_of(store.get(id)), id))
            .collect();
        ordered.sort_by(|a, b| a.0.total_cmp(&b.0));
        track.hits = ordered.into_iter().map(|(_, id)| id).collect();
        track.refit(store, &self.fitter);

        stats.stereo_hits_assigned += added;
        added
    }

    fn axial_seeds<I: HoughItem>(
        &self,
        root: HoughBox,
        items: &[I],
        stats: &mut EventStats,
    ) -> Vec<(Vec<HitId>, HoughBox)> {
        let mut taken = vec![false; items.len()];
        let outcome = self.axial.search(root, items, &mut taken);
        stats.hough_nodes += outcome.nodes;
        if outcome.budget_exhausted {
            stats.hough_budget_exhausted += 1;
        }
        outcome
            .seeds
            .into_iter()
            .map(|seed| {
                let hits = seed.items.iter().flat_map(|&i| items[i].hits()).collect();
                (hits, seed.bounds)
            })
            .collect()
    }

    fn build_track(
        &self,
        hits: Vec<HitId>,
        bounds: &HoughBox,
        event: &EventContext<'_>,
        cells: &mut CellTable,
        stats: &mut EventStats,
    ) -> Option<Track> {
        let store = event.hits;
        let mut hits: Vec<HitId> = hits.into_iter().filter(|&id| cells.is_available(id)).collect();
        hits.sort_unstable();
        hits.dedup();
        if hits.len() < self.config.min_track_hits {
            return None;
        }

        // Every track shows up twice, once per direction of flight
        let (phi, curvature) = bounds.center();
        let mut seed = Trajectory2D::through_origin(curvature, phi);
        let forward = hits
            .iter()
            .filter(|&&id| seed.arc_length(&store.get(id).ref_position) > 0.0)
            .count();
        if 2 * forward < hits.len() {
            seed = seed.reversed();
        }
        hits.sort_by(|&a, &b| {
            let sa = seed.arc_length(&store.get(a).ref_position);
            let sb = seed.arc_length(&store.get(b).ref_position);
            sa.total_cmp(&sb)
        });

        let mut track = Track::fit(hits, store, &self.fitter, TrackOrigin::Hough)?;
        self.assign_stereo_hits(&mut track, event, cells, stats);
        for &id in &track.hits {
            cells.try_take(id);
        }
        stats.hough_tracks += 1;
        Some(track)
    }
}

fn axial_item(hit: &WireHit) -> CurveItem<SinusoidCurve> {
    CurveItem::new(hit.id, SinusoidCurve::for_hit(hit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Clusterizer;
    use crate::filter::AllFilter;
    use crate::fit::SzTrajectory;
    use crate::hits::HitStore;
    use crate::segment::{HitPair, SegmentFinder};
    use crate::track::tests::{circle_hits, helix_hits};
    use approx::assert_relative_eq;
    use trackfind_env::{CylindricalGeometry, RawHit};

    fn run(raw: Vec<RawHit>, config: HoughConfig) -> (Vec<Track>, HitStore, CellTable, EventStats) {
        let geometry = CylindricalGeometry::default();
        let store = HitStore::build(&raw, &geometry).unwrap();
        let mut cells = CellTable::new(store.len());
        let mut stats = EventStats::default();
        let tracks = {
            let event = EventContext::new(&store, &geometry);
            HoughTrackFinder::new(config, TrackFitter::default()).find_tracks(&event, &mut cells, &mut stats)
        };
        (tracks, store, cells, stats)
    }

    #[test]
    fn test_single_axial_track() {
        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(0.008, 0.7);
        let raw = circle_hits(&geometry, &truth, &[0, 2, 4, 6, 8]);
        let (tracks, store, cells, stats) = run(raw, HoughConfig::default());

        assert_eq!(tracks.len(), 1);
        let track = &tracks[0];
        assert_eq!(track.origin, TrackOrigin::Hough);
        assert!(track.len() >= 25);
        assert_relative_eq!(track.trajectory.curvature, truth.curvature, epsilon = 5e-4);
        assert_relative_eq!(track.trajectory.phi0, truth.phi0, epsilon = 0.02);
        assert!(track.hits.iter().all(|&id| cells.is_taken(id)));
        assert!(stats.hough_nodes > 0);
        assert_eq!(stats.hough_tracks, 1);

        // Flight order
        let arcs: Vec<f64> = track.hits.iter().map(|&id| track.arc_length_of(store.get(id))).collect();
        assert!(arcs[0] > 0.0);
        assert!(arcs.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_two_tracks() {
        let geometry = CylindricalGeometry::default();
        let first = Trajectory2D::through_origin(0.008, 0.7);
        let second = Trajectory2D::through_origin(-0.012, -2.0);
        let mut raw = circle_hits(&geometry, &first, &[0, 2, 4, 6, 8]);
        raw.extend(circle_hits(&geometry, &second, &[0, 2, 4, 6, 8]));
        let (tracks, _, _, _) = run(raw, HoughConfig::default());

        assert_eq!(tracks.len(), 2);
        let mut curvatures: Vec<f64> = tracks.iter().map(|t| t.trajectory.curvature).collect();
        curvatures.sort_by(f64::total_cmp);
        assert_relative_eq!(curvatures[0], -0.012, epsilon = 5e-4);
        assert_relative_eq!(curvatures[1], 0.008, epsilon = 5e-4);
    }

    #[test]
    fn test_stereo_hits_assigned() {
        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(0.006, 1.2);
        let sz = SzTrajectory::new(0.3, 1.0);
        let raw = helix_hits(&geometry, &truth, &sz, &[0, 1, 2, 3, 4, 5, 6, 7, 8]);
        let (tracks, store, _, stats) = run(raw, HoughConfig::default());

        assert_eq!(tracks.len(), 1);
        let stereo = tracks[0].hits.iter().filter(|&&id| !store.get(id).is_axial()).count();
        assert!(stereo >= 12, "only {} stereo hits assigned", stereo);
        assert_eq!(stats.stereo_hits_assigned, stereo);
        let fitted = tracks[0].sz.unwrap();
        assert_relative_eq!(fitted.tan_lambda, 0.3, epsilon = 0.1);
    }

    #[test]
    fn test_segment_votes() {
        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(-0.01, 2.5);
        let raw = circle_hits(&geometry, &truth, &[0, 2, 4, 6, 8]);
        let store = HitStore::build(&raw, &geometry).unwrap();
        let mut cells = CellTable::new(store.len());
        let mut stats = EventStats::default();
        let clusters = Clusterizer::default().clusterize(&store, &geometry, &mut cells);
        let segments = {
            let event = EventContext::new(&store, &geometry);
            SegmentFinder::default().find_segments(
                &clusters,
                &mut AllFilter::<HitPair>::new(1.0),
                &event,
                &cells,
                &mut stats,
            )
        };
        assert!(segments.len() >= 4);

        let config = HoughConfig {
            use_segments: true,
            ..Default::default()
        };
        let event = EventContext::new(&store, &geometry).with_segments(&segments);
        let tracks = HoughTrackFinder::new(config, TrackFitter::default()).find_tracks(&event, &mut cells, &mut stats);
        assert_eq!(tracks.len(), 1);
        assert!(tracks[0].len() >= 24);
        assert_relative_eq!(tracks[0].trajectory.curvature, -0.01, epsilon = 5e-4);
    }

    #[test]
    fn test_taken_hits_are_skipped() {
        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(0.008, 0.7);
        let raw = circle_hits(&geometry, &truth, &[0, 2, 4, 6, 8]);
        let store = HitStore::build(&raw, &geometry).unwrap();
        let mut cells = CellTable::new(store.len());
        for hit in store.iter() {
            cells.try_take(hit.id);
        }
        let event = EventContext::new(&store, &geometry);
        let tracks = HoughTrackFinder::default().find_tracks(&event, &mut cells, &mut EventStats::default());
        assert!(tracks.is_empty());
    }

    #[test]
    fn test_empty_event() {
        let (tracks, _, _, stats) = run(Vec::new(), HoughConfig::default());
        assert!(tracks.is_empty());
        assert_eq!(stats.hough_tracks, 0);
    }
}
