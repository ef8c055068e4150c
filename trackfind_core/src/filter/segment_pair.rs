//! Fit quality filter for axial segment pairs.

use super::{EventContext, Filter, HitContent, ParameterDescriptor, Parameters, Weight, REJECT};
use crate::error::ConfigError;
use crate::triple::SegmentPair;

/// Cuts on the combined circle fit of a segment pair.
#[derive(Debug, Clone)]
pub struct SimpleSegmentPairFilter {
    max_chi2_per_ndf: f64,
    max_curvature: f64,
}

impl SimpleSegmentPairFilter {
    pub fn new(max_chi2_per_ndf: f64, max_curvature: f64) -> Self {
        Self {
            max_chi2_per_ndf,
            max_curvature,
        }
    }

    pub fn parameters() -> Vec<ParameterDescriptor> {
        vec![
            ParameterDescriptor::number("max_chi2_per_ndf", 50.0, "Largest chi2/ndf of the combined fit"),
            ParameterDescriptor::number("max_curvature", 0.05, "Largest absolute curvature (1/cm)"),
        ]
    }

    pub fn from_parameters(params: &Parameters) -> Result<Self, ConfigError> {
        Ok(Self::new(
            params.non_negative("max_chi2_per_ndf")?,
            params.non_negative("max_curvature")?,
        ))
    }
}

impl Filter<SegmentPair> for SimpleSegmentPairFilter {
    fn name(&self) -> &str {
        "simple"
    }

    fn weigh(&mut self, pair: &SegmentPair, event: &EventContext<'_>) -> Weight {
        if pair.fit.chi2_per_ndf() > self.max_chi2_per_ndf
            || pair.fit.trajectory.curvature.abs() > self.max_curvature
        {
            return REJECT;
        }
        pair.nominal_weight(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::{FitResult, Trajectory2D};
    use crate::hits::HitStore;

    fn pair(chi2: f64, curvature: f64) -> SegmentPair {
        SegmentPair {
            start: 0,
            end: 1,
            fit: FitResult {
                trajectory: Trajectory2D::through_origin(curvature, 0.3),
                chi2,
                ndf: 10,
            },
        }
    }

    #[test]
    fn test_cuts() {
        let geometry = trackfind_env::CylindricalGeometry::default();
        let store = HitStore::default();
        let event = EventContext::new(&store, &geometry);
        let mut filter = SimpleSegmentPairFilter::new(5.0, 0.02);

        // No segments in the context: accepted with zero hits
        assert_eq!(filter.weigh(&pair(20.0, 0.01), &event), 0.0);
        assert!(filter.weigh(&pair(60.0, 0.01), &event).is_nan());
        assert!(filter.weigh(&pair(20.0, -0.03), &event).is_nan());
    }
}
