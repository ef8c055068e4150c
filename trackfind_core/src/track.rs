//! Track candidates.

use serde::{Deserialize, Serialize};

use crate::filter::{EventContext, HitContent};
use crate::fit::{
    fit_stereo_hits, stereo_candidates, CircleFitter, FitResult, SzFitter, SzTrajectory,
    Trajectory2D,
};
use crate::hits::{HitId, HitStore, WireHit};

/// Stage that produced a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackOrigin {
    /// Segment triple paths of the cellular automaton
    Automaton,
    /// Hough quad-tree seeds
    Hough,
    /// Second half of a back-to-back split
    Split,
}

/// Ordered hits with a fitted trajectory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    /// Hits in flight order, no duplicates
    pub hits: Vec<HitId>,
    pub trajectory: Trajectory2D,
    pub sz: Option<SzTrajectory>,
    pub chi2: f64,
    pub ndf: usize,
    pub origin: TrackOrigin,
}

impl Track {
    /// Track with an externally supplied trajectory.
    pub fn new(hits: Vec<HitId>, trajectory: Trajectory2D, origin: TrackOrigin) -> Self {
        Self {
            hits,
            trajectory,
            sz: None,
            chi2: 0.0,
            ndf: 0,
            origin,
        }
    }

    /// Fits a track to the given hits, `None` if they do not constrain a trajectory.
    pub fn fit(
        hits: Vec<HitId>,
        store: &HitStore,
        fitter: &TrackFitter,
        origin: TrackOrigin,
    ) -> Option<Self> {
        let fit = fitter.fit(&hits, store)?;
        Some(Self {
            hits,
            trajectory: fit.trajectory,
            sz: fit.sz,
            chi2: fit.chi2,
            ndf: fit.ndf,
            origin,
        })
    }

    /// Refits in place. Keeps the old trajectory and returns false on failure.
    pub fn refit(&mut self, store: &HitStore, fitter: &TrackFitter) -> bool {
        match fitter.fit(&self.hits, store) {
            Some(fit) => {
                self.trajectory = fit.trajectory;
                self.sz = fit.sz;
                self.chi2 = fit.chi2;
                self.ndf = fit.ndf;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn chi2_per_ndf(&self) -> f64 {
        if self.ndf == 0 {
            0.0
        } else {
            self.chi2 / self.ndf as f64
        }
    }

    pub fn contains(&self, id: HitId) -> bool {
        self.hits.contains(&id)
    }

    /// Distance between the trajectory and a hit's drift circle.
    ///
    /// Stereo hits need an sz line; without one they count as compatible
    /// if their wire can reach the trajectory at all.
    pub fn hit_residual(&self, hit: &WireHit) -> f64 {
        if hit.is_axial() {
            return hit.residual(&self.trajectory);
        }
        match &self.sz {
            Some(sz) => hit.residual_3d(&self.trajectory, sz),
            None if stereo_candidates(hit, &self.trajectory).is_empty() => f64::INFINITY,
            None => 0.0,
        }
    }

    /// Arc length of a hit along the trajectory.
    pub fn arc_length_of(&self, hit: &WireHit) -> f64 {
        let s = self.trajectory.arc_length(&hit.ref_position);
        match (&self.sz, hit.is_axial()) {
            (Some(sz), false) => self.trajectory.arc_length(&hit.position_at(sz.z_at(s))),
            _ => s,
        }
    }

    /// Superlayers crossed, ascending.
    pub fn superlayers(&self, store: &HitStore) -> Vec<u8> {
        let mut superlayers: Vec<u8> = self.hits.iter().map(|&id| store.get(id).superlayer()).collect();
        superlayers.sort_unstable();
        superlayers.dedup();
        superlayers
    }
}

impl HitContent for Track {
    fn collect_hits(&self, _event: &EventContext<'_>, out: &mut Vec<HitId>) {
        out.extend_from_slice(&self.hits);
    }
}

/// Combined xy and sz fit of a track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackFit {
    pub trajectory: Trajectory2D,
    pub sz: Option<SzTrajectory>,
    pub chi2: f64,
    pub ndf: usize,
}

/// Fits the xy circle on axial hits and the sz line on stereo hits.
#[derive(Debug, Clone, Default)]
pub struct TrackFitter {
    pub circle: CircleFitter,
    pub sz: SzFitter,
}

impl TrackFitter {
    pub fn new(circle: CircleFitter) -> Self {
        Self {
            circle,
            sz: SzFitter,
        }
    }

    /// Fits hits in their given order.
    ///
    /// With fewer than three axial hits the xy fit uses all hits at z = 0.
    pub fn fit(&self, ids: &[HitId], store: &HitStore) -> Option<TrackFit> {
        let hits: Vec<&WireHit> = ids.iter().map(|&id| store.get(id)).collect();
        let axial: Vec<&WireHit> = hits.iter().copied().filter(|h| h.is_axial()).collect();
        let stereo: Vec<&WireHit> = hits.iter().copied().filter(|h| !h.is_axial()).collect();

        let xy: FitResult<Trajectory2D> = if axial.len() >= 3 {
            self.circle.fit_hits(&axial)?
        } else {
            self.circle.fit_hits(&hits)?
        };

        let sz = if axial.len() >= 3 && stereo.len() >= 2 {
            fit_stereo_hits(&stereo, &xy.trajectory, &self.sz)
        } else {
            None
        };

        let (chi2, ndf) = match &sz {
            Some(sz_fit) => (xy.chi2 + sz_fit.chi2, xy.ndf + sz_fit.ndf),
            None => (xy.chi2, xy.ndf),
        };

        Some(TrackFit {
            trajectory: xy.trajectory,
            sz: sz.map(|f| f.trajectory),
            chi2,
            ndf,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use trackfind_env::{CylindricalGeometry, RawHit, WireGeometry, WireId};

    /// Axial hits of a circle through the origin, exact drift lengths.
    pub(crate) fn circle_hits(
        geometry: &CylindricalGeometry,
        trajectory: &Trajectory2D,
        superlayers: &[u8],
    ) -> Vec<RawHit> {
        helix_hits(geometry, trajectory, &SzTrajectory::new(0.0, 0.0), superlayers)
    }

    /// Hits of a helix from the origin in the given superlayers.
    ///
    /// Each layer contributes the wire closest to the crossing point at the
    /// helix z; the drift length is the exact distance to that wire.
    pub(crate) fn helix_hits(
        geometry: &CylindricalGeometry,
        trajectory: &Trajectory2D,
        sz: &SzTrajectory,
        superlayers: &[u8],
    ) -> Vec<RawHit> {
        let mut raw = Vec::new();
        for &superlayer in superlayers {
            for layer in 0..geometry.layer_count(superlayer) {
                let radius = geometry.layer_radius(superlayer, layer);
                let s = 2.0 / trajectory.curvature * (0.5 * radius * trajectory.curvature).asin();
                let z = sz.z_at(s);
                let point = trajectory.point_at(s);
                let best = (0..geometry.wire_count(superlayer))
                    .map(|w| WireId::new(superlayer, layer, w))
                    .filter_map(|id| geometry.wire_line(id).map(|line| (id, line.position_at(z))))
                    .min_by(|a, b| (a.1 - point).norm().total_cmp(&(b.1 - point).norm()));
                let Some((wire, position)) = best else { continue };
                let drift = trajectory.distance(&position).abs();
                raw.push(RawHit::new(wire, drift));
            }
        }
        raw
    }

    #[test]
    fn test_fit_recovers_circle() {
        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(0.01, 0.7);
        let raw = circle_hits(&geometry, &truth, &[0, 2, 4]);
        let store = HitStore::build(&raw, &geometry).unwrap();
        let ids: Vec<HitId> = store.iter().map(|h| h.id).collect();

        let track = Track::fit(ids, &store, &TrackFitter::default(), TrackOrigin::Hough).unwrap();
        assert_relative_eq!(track.trajectory.curvature, truth.curvature, epsilon = 2e-4);
        assert_relative_eq!(track.trajectory.phi0, truth.phi0, epsilon = 1e-2);
        assert!(track.sz.is_none());
        for &id in &track.hits {
            assert!(track.hit_residual(store.get(id)) < 0.05);
        }
    }

    #[test]
    fn test_superlayers_and_arc_length() {
        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(-0.005, 2.0);
        let raw = circle_hits(&geometry, &truth, &[0, 4]);
        let store = HitStore::build(&raw, &geometry).unwrap();
        let ids: Vec<HitId> = store.iter().map(|h| h.id).collect();

        let track = Track::new(ids, truth, TrackOrigin::Hough);
        assert_eq!(track.superlayers(&store), vec![0, 4]);
        let first = track.arc_length_of(store.get(track.hits[0]));
        let last = track.arc_length_of(store.get(*track.hits.last().unwrap()));
        assert!(first > 0.0 && last > first);
    }
}
