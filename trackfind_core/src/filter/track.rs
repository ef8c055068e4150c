//! Final track filter.

use super::{EventContext, Filter, ParameterDescriptor, Parameters, Weight, REJECT};
use crate::error::ConfigError;
use crate::track::Track;

/// Rejects short, badly fitted or too strongly curved tracks.
#[derive(Debug, Clone)]
pub struct SimpleTrackFilter {
    min_hits: usize,
    max_chi2_per_ndf: f64,
    max_curvature: f64,
}

impl SimpleTrackFilter {
    pub fn new(min_hits: usize, max_chi2_per_ndf: f64, max_curvature: f64) -> Self {
        Self {
            min_hits,
            max_chi2_per_ndf,
            max_curvature,
        }
    }

    pub fn parameters() -> Vec<ParameterDescriptor> {
        vec![
            ParameterDescriptor::number("min_hits", 5.0, "Fewest hits of an accepted track"),
            ParameterDescriptor::number("max_chi2_per_ndf", 20.0, "Largest chi2/ndf"),
            ParameterDescriptor::number("max_curvature", 0.04, "Largest absolute curvature (1/cm)"),
        ]
    }

    pub fn from_parameters(params: &Parameters) -> Result<Self, ConfigError> {
        Ok(Self::new(
            params.count("min_hits")?,
            params.non_negative("max_chi2_per_ndf")?,
            params.non_negative("max_curvature")?,
        ))
    }
}

impl Filter<Track> for SimpleTrackFilter {
    fn name(&self) -> &str {
        "simple"
    }

    fn weigh(&mut self, track: &Track, _event: &EventContext<'_>) -> Weight {
        if track.len() < self.min_hits
            || track.chi2_per_ndf() > self.max_chi2_per_ndf
            || track.trajectory.curvature.abs() > self.max_curvature
        {
            REJECT
        } else {
            track.len() as Weight
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::Trajectory2D;
    use crate::hits::{HitId, HitStore};
    use crate::track::TrackOrigin;

    #[test]
    fn test_min_hits_and_chi2() {
        let geometry = trackfind_env::CylindricalGeometry::default();
        let store = HitStore::default();
        let event = EventContext::new(&store, &geometry);
        let mut filter = SimpleTrackFilter::new(3, 10.0, 0.04);

        let hits: Vec<HitId> = (0..4).map(HitId).collect();
        let mut track = Track::new(hits, Trajectory2D::through_origin(0.01, 0.0), TrackOrigin::Hough);
        assert_eq!(filter.weigh(&track, &event), 4.0);

        track.chi2 = 50.0;
        track.ndf = 2;
        assert!(filter.weigh(&track, &event).is_nan());

        let short = Track::new(vec![HitId(0)], track.trajectory, TrackOrigin::Hough);
        assert!(filter.weigh(&short, &event).is_nan());
    }

    #[test]
    fn test_curvature_beyond_hough_range_is_rejected() {
        let geometry = trackfind_env::CylindricalGeometry::default();
        let store = HitStore::default();
        let event = EventContext::new(&store, &geometry);
        let mut filter = SimpleTrackFilter::from_parameters(
            &Parameters::resolve("simple", &SimpleTrackFilter::parameters(), &Default::default()).unwrap(),
        )
        .unwrap();

        let hits: Vec<HitId> = (0..6).map(HitId).collect();
        let curled = Track::new(hits.clone(), Trajectory2D::through_origin(-0.05, 1.0), TrackOrigin::Hough);
        assert!(filter.weigh(&curled, &event).is_nan());

        let mut track = Track::new(hits, Trajectory2D::through_origin(0.039, 1.0), TrackOrigin::Hough);
        assert_eq!(filter.weigh(&track, &event), 6.0);

        // chi2/ndf of 25 is above the default cut
        track.chi2 = 3.0 * 25.0;
        track.ndf = 3;
        assert!(filter.weigh(&track, &event).is_nan());
    }
}
