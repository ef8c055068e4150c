//! Track quality assertion.
//!
//! Greedy local corrections applied to finished track candidates: hit
//! migration, back-to-back splitting, merging of fragments and removal of
//! short tracks, each followed by normalization. The corrections reach a
//! stable state but not necessarily the best possible hit assignment.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fit::normalize_angle;
use crate::hits::{CellTable, HitId, HitStore};
use crate::metrics::EventStats;
use crate::track::{Track, TrackFitter, TrackOrigin};

/// Configuration for the QualityAsserter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub drop_distant_hits: bool,

    /// Largest kept hit residual (cm), inclusive
    pub drop_distance: f64,

    pub add_nearby_hits: bool,

    /// Largest residual of a hit picked up from the free pool (cm)
    pub add_distance: f64,

    pub split_back_to_back: bool,

    /// Both halves need this many hits for a split
    pub min_split_hits: usize,

    pub merge_tracks: bool,

    /// Largest χ²/ndf of the combined fit of a merge
    pub merge_chi2_cut: f64,

    /// Largest start direction difference of merged tracks (rad)
    pub merge_max_delta_phi: f64,

    /// Largest curvature difference of merged tracks (1/cm)
    pub merge_max_delta_curvature: f64,

    pub remove_short_tracks: bool,

    pub min_track_hits: usize,

    /// Upper bound on sort/refit rounds per normalization
    pub max_normalize_rounds: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            drop_distant_hits: true,
            drop_distance: 0.3,
            add_nearby_hits: true,
            add_distance: 0.1,
            split_back_to_back: true,
            min_split_hits: 5,
            merge_tracks: true,
            merge_chi2_cut: 10.0,
            merge_max_delta_phi: 0.2,
            merge_max_delta_curvature: 0.002,
            remove_short_tracks: true,
            min_track_hits: 5,
            max_normalize_rounds: 4,
        }
    }
}

/// Applies the configured corrections to finished tracks.
///
/// Hits of kept tracks stay taken in the cell table; dropped hits and hits
/// of removed tracks are released.
#[derive(Debug, Clone, Default)]
pub struct QualityAsserter {
    config: QualityConfig,
    fitter: TrackFitter,
}

impl QualityAsserter {
    pub fn new(config: QualityConfig, fitter: TrackFitter) -> Self {
        Self { config, fitter }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Runs all enabled corrections.
    pub fn assert_quality(
        &self,
        tracks: Vec<Track>,
        store: &HitStore,
        cells: &mut CellTable,
        stats: &mut EventStats,
    ) -> Vec<Track> {
        let mut out = Vec::with_capacity(tracks.len());
        for mut track in tracks {
            if self.config.drop_distant_hits {
                stats.hits_dropped += self.drop_distant_hits(&mut track, store, cells);
            }
            if self.config.add_nearby_hits {
                stats.hits_added += self.add_nearby_hits(&mut track, store, cells);
            }
            self.normalize(&mut track, store);

            if self.config.split_back_to_back {
                if let Some(mut back) = self.split_back_to_back(&mut track, store) {
                    self.normalize(&mut track, store);
                    self.normalize(&mut back, store);
                    stats.tracks_split += 1;
                    out.push(track);
                    out.push(back);
                    continue;
                }
            }
            out.push(track);
        }

        if self.config.merge_tracks {
            stats.tracks_merged += self.merge_tracks(&mut out, store);
        }
        if self.config.remove_short_tracks {
            stats.tracks_removed += self.remove_short_tracks(&mut out, cells);
        }
        debug!("Quality assertion kept {} tracks", out.len());
        out
    }

    /// Removes hits whose residual exceeds `drop_distance` and releases them.
    ///
    /// A hit exactly at the threshold is kept.
    pub fn drop_distant_hits(&self, track: &mut Track, store: &HitStore, cells: &mut CellTable) -> usize {
        let limit = self.config.drop_distance;
        let (kept, dropped): (Vec<HitId>, Vec<HitId>) = track
            .hits
            .iter()
            .copied()
            .partition(|&id| track.hit_residual(store.get(id)) <= limit);
        for &id in &dropped {
            cells.release(id);
        }
        track.hits = kept;
        dropped.len()
    }

    /// Takes free hits of the track's superlayers lying within `add_distance`.
    pub fn add_nearby_hits(&self, track: &mut Track, store: &HitStore, cells: &mut CellTable) -> usize {
        let mut added = 0;
        for superlayer in track.superlayers(store) {
            for hit in store.superlayer_hits(superlayer) {
                if !cells.is_available(hit.id) || track.contains(hit.id) {
                    continue;
                }
                if track.hit_residual(hit) <= self.config.add_distance && cells.try_take(hit.id) {
                    track.hits.push(hit.id);
                    added += 1;
                }
            }
        }
        added
    }

    /// Splits off the hits behind the perigee.
    ///
    /// `track` keeps the forward hits; the returned track holds the backward
    /// ones in their own flight order. Nothing changes unless both halves
    /// have `min_split_hits`.
    pub fn split_back_to_back(&self, track: &mut Track, store: &HitStore) -> Option<Track> {
        let (forward, mut backward): (Vec<HitId>, Vec<HitId>) = track
            .hits
            .iter()
            .copied()
            .partition(|&id| track.arc_length_of(store.get(id)) >= 0.0);
        let min = self.config.min_split_hits.max(1);
        if forward.len() < min || backward.len() < min {
            return None;
        }

        // Outwards from the perigee
        backward.sort_by(|&a, &b| {
            let sa = track.arc_length_of(store.get(a));
            let sb = track.arc_length_of(store.get(b));
            sb.total_cmp(&sa)
        });
        let back = Track::fit(backward, store, &self.fitter, TrackOrigin::Split)?;
        track.hits = forward;
        track.refit(store, &self.fitter);
        Some(back)
    }

    /// Merges pairs of compatible tracks until no pair is left.
    ///
    /// Returns the number of merges.
    pub fn merge_tracks(&self, tracks: &mut Vec<Track>, store: &HitStore) -> usize {
        let mut merges = 0;
        'scan: loop {
            for i in 0..tracks.len() {
                for j in (i + 1)..tracks.len() {
                    if let Some(merged) = self.try_merge(&tracks[i], &tracks[j], store) {
                        tracks[i] = merged;
                        tracks.remove(j);
                        merges += 1;
                        continue 'scan;
                    }
                }
            }
            break;
        }
        merges
    }

    fn try_merge(&self, a: &Track, b: &Track, store: &HitStore) -> Option<Track> {
        let delta_phi = normalize_angle(a.trajectory.phi0 - b.trajectory.phi0).abs();
        let delta_curvature = (a.trajectory.curvature - b.trajectory.curvature).abs();
        if delta_phi > self.config.merge_max_delta_phi
            || delta_curvature > self.config.merge_max_delta_curvature
        {
            return None;
        }

        let mut hits: Vec<HitId> = a.hits.iter().chain(&b.hits).copied().collect();
        hits.sort_unstable();
        hits.dedup();
        hits.sort_by(|&x, &y| {
            let sx = a.arc_length_of(store.get(x));
            let sy = a.arc_length_of(store.get(y));
            sx.total_cmp(&sy)
        });
        let mut merged = Track::fit(hits, store, &self.fitter, a.origin)?;
        if merged.chi2_per_ndf() > self.config.merge_chi2_cut {
            return None;
        }
        self.normalize(&mut merged, store);
        Some(merged)
    }

    /// Drops tracks below `min_track_hits` and releases their hits.
    pub fn remove_short_tracks(&self, tracks: &mut Vec<Track>, cells: &mut CellTable) -> usize {
        let before = tracks.len();
        tracks.retain(|track| {
            let keep = track.len() >= self.config.min_track_hits;
            if !keep {
                for &id in &track.hits {
                    cells.release(id);
                }
            }
            keep
        });
        before - tracks.len()
    }

    /// Sorts hits by arc length and refits until nothing changes.
    ///
    /// Returns true if the track changed. Normalizing a normalized track
    /// leaves it untouched.
    pub fn normalize(&self, track: &mut Track, store: &HitStore) -> bool {
        let mut changed = false;
        for _ in 0..self.config.max_normalize_rounds.max(1) {
            let before = track.clone();
            let keys: Vec<f64> = track.hits.iter().map(|&id| track.arc_length_of(store.get(id))).collect();
            let mut order: Vec<usize> = (0..track.hits.len()).collect();
            order.sort_by(|&a, &b| keys[a].total_cmp(&keys[b]));
            track.hits = order.into_iter().map(|i| before.hits[i]).collect();
            track.refit(store, &self.fitter);

            if *track == before {
                break;
            }
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::Trajectory2D;
    use crate::track::tests::circle_hits;
    use approx::assert_relative_eq;
    use trackfind_env::{CylindricalGeometry, RawHit, WireId};

    fn fitted(store: &HitStore, ids: Vec<HitId>) -> Track {
        Track::fit(ids, store, &TrackFitter::default(), TrackOrigin::Automaton).unwrap()
    }

    fn taken_cells(store: &HitStore) -> CellTable {
        let mut cells = CellTable::new(store.len());
        for hit in store.iter() {
            cells.try_take(hit.id);
        }
        cells
    }

    /// Wire 0 of the innermost layer sits on the x axis.
    fn hit_on_axis(drift: f64) -> (HitStore, Track) {
        let geometry = CylindricalGeometry::default();
        let raw = vec![RawHit::new(WireId::new(0, 0, 0), drift)];
        let store = HitStore::build(&raw, &geometry).unwrap();
        let track = Track::new(vec![HitId(0)], Trajectory2D::line(0.0, 0.0), TrackOrigin::Hough);
        (store, track)
    }

    #[test]
    fn test_drop_boundary() {
        let asserter = QualityAsserter::new(
            QualityConfig {
                drop_distance: 0.25,
                ..Default::default()
            },
            TrackFitter::default(),
        );
        let epsilon = 1e-9;

        for (drift, expected_drops) in [(0.25 - epsilon, 0), (0.25, 0), (0.25 + epsilon, 1)] {
            let (store, mut track) = hit_on_axis(drift);
            let mut cells = taken_cells(&store);
            let dropped = asserter.drop_distant_hits(&mut track, &store, &mut cells);
            assert_eq!(dropped, expected_drops, "drift {}", drift);
            assert_eq!(cells.is_taken(HitId(0)), expected_drops == 0);
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(0.01, 0.7);
        let raw = circle_hits(&geometry, &truth, &[0, 2, 4]);
        let store = HitStore::build(&raw, &geometry).unwrap();
        // Scrambled order
        let mut ids: Vec<HitId> = store.iter().map(|h| h.id).collect();
        ids.reverse();
        ids.swap(0, 7);
        let mut track = Track::new(ids, truth, TrackOrigin::Automaton);

        let asserter = QualityAsserter::default();
        assert!(asserter.normalize(&mut track, &store));
        let once = track.clone();
        assert!(!asserter.normalize(&mut track, &store));
        assert_eq!(track, once);

        let arcs: Vec<f64> = track.hits.iter().map(|&id| track.arc_length_of(store.get(id))).collect();
        assert!(arcs.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_add_nearby_hits() {
        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(0.01, 0.7);
        let raw = circle_hits(&geometry, &truth, &[0, 2, 4]);
        let store = HitStore::build(&raw, &geometry).unwrap();
        let mut cells = taken_cells(&store);

        let mut ids: Vec<HitId> = store.iter().map(|h| h.id).collect();
        let missing = [ids.remove(8), ids.remove(3)];
        for id in missing {
            cells.release(id);
        }
        let mut track = fitted(&store, ids);

        let added = QualityAsserter::default().add_nearby_hits(&mut track, &store, &mut cells);
        assert_eq!(added, 2);
        assert!(missing.iter().all(|&id| track.contains(id) && cells.is_taken(id)));
    }

    #[test]
    fn test_split_back_to_back() {
        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(0.005, 0.7);
        let mut raw = circle_hits(&geometry, &truth, &[0, 2, 4]);
        raw.extend(circle_hits(&geometry, &truth.reversed(), &[0, 2, 4]));
        let store = HitStore::build(&raw, &geometry).unwrap();

        let mut ids: Vec<HitId> = store.iter().map(|h| h.id).collect();
        ids.sort_by(|&a, &b| {
            let sa = truth.arc_length(&store.get(a).ref_position);
            let sb = truth.arc_length(&store.get(b).ref_position);
            sa.total_cmp(&sb)
        });
        let mut track = fitted(&store, ids);

        let back = QualityAsserter::default().split_back_to_back(&mut track, &store).unwrap();
        assert_eq!(track.len(), 18);
        assert_eq!(back.len(), 18);
        assert_eq!(back.origin, TrackOrigin::Split);
        assert_relative_eq!(track.trajectory.curvature, 0.005, epsilon = 5e-4);
        assert_relative_eq!(back.trajectory.curvature, -0.005, epsilon = 5e-4);
        assert!(back.hits.iter().all(|&id| back.arc_length_of(store.get(id)) > 0.0));
    }

    #[test]
    fn test_no_split_of_one_sided_track() {
        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(0.01, 0.7);
        let raw = circle_hits(&geometry, &truth, &[0, 2, 4]);
        let store = HitStore::build(&raw, &geometry).unwrap();
        let mut track = fitted(&store, store.iter().map(|h| h.id).collect());
        let before = track.clone();
        assert!(QualityAsserter::default().split_back_to_back(&mut track, &store).is_none());
        assert_eq!(track, before);
    }

    #[test]
    fn test_merge_fragments() {
        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(0.008, 0.7);
        let other = Trajectory2D::through_origin(-0.012, -2.0);
        let mut raw = circle_hits(&geometry, &truth, &[0, 2, 4, 6]);
        let split = raw.len() / 2;
        raw.extend(circle_hits(&geometry, &other, &[0, 2, 4, 6]));
        let store = HitStore::build(&raw, &geometry).unwrap();

        let by_raw = |range: std::ops::Range<usize>| -> Vec<HitId> {
            let mut ids: Vec<HitId> = store.iter().filter(|h| range.contains(&h.raw_index)).map(|h| h.id).collect();
            ids.sort_by_key(|&id| store.get(id).raw_index);
            ids
        };
        let mut tracks = vec![
            fitted(&store, by_raw(0..split)),
            fitted(&store, by_raw(split..2 * split)),
            fitted(&store, by_raw(2 * split..raw.len())),
        ];

        let merges = QualityAsserter::default().merge_tracks(&mut tracks, &store);
        assert_eq!(merges, 1);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].len(), 2 * split);
        assert_relative_eq!(tracks[0].trajectory.curvature, 0.008, epsilon = 5e-4);
    }

    #[test]
    fn test_remove_short_tracks_releases_hits() {
        let geometry = CylindricalGeometry::default();
        let raw = crate::hits::tests::column(0, 10, 4);
        let store = HitStore::build(&raw, &geometry).unwrap();
        let mut cells = taken_cells(&store);
        let ids: Vec<HitId> = store.iter().map(|h| h.id).collect();
        let mut tracks = vec![Track::new(ids, Trajectory2D::line(0.0, 0.0), TrackOrigin::Hough)];

        let removed = QualityAsserter::default().remove_short_tracks(&mut tracks, &mut cells);
        assert_eq!(removed, 1);
        assert!(tracks.is_empty());
        assert_eq!(cells.taken_count(), 0);
    }

    #[test]
    fn test_assert_quality_counts() {
        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(0.01, 0.7);
        let mut raw = circle_hits(&geometry, &truth, &[0, 2, 4]);
        // Far off the track in a crossed superlayer
        raw.push(RawHit::new(WireId::new(2, 3, 100), 0.1));
        let store = HitStore::build(&raw, &geometry).unwrap();
        let mut cells = taken_cells(&store);
        let stray = store.iter().find(|h| h.raw_index == raw.len() - 1).unwrap().id;

        let mut ids: Vec<HitId> = store.iter().filter(|h| h.id != stray).map(|h| h.id).collect();
        ids.sort_by(|&a, &b| {
            let sa = truth.arc_length(&store.get(a).ref_position);
            let sb = truth.arc_length(&store.get(b).ref_position);
            sa.total_cmp(&sb)
        });
        let mut track = fitted(&store, ids);
        track.hits.push(stray);

        let mut stats = EventStats::default();
        let tracks = QualityAsserter::default().assert_quality(vec![track], &store, &mut cells, &mut stats);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].len(), 18);
        assert_eq!(stats.hits_dropped, 1);
        assert_eq!(stats.hits_added, 0);
        assert!(!cells.is_taken(stray));
    }
}
