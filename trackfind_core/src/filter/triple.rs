//! Filters for segment triples and their relations.

use super::{EventContext, Filter, HitContent, ParameterDescriptor, Parameters, Weight, REJECT};
use crate::error::ConfigError;
use crate::triple::{SegmentTriple, TripleRelation};

/// Cuts on the sz line of a triple's stereo segment.
#[derive(Debug, Clone)]
pub struct SimpleTripleFilter {
    max_z0: f64,
    max_tan_lambda: f64,
    max_sz_chi2_per_ndf: f64,
}

impl SimpleTripleFilter {
    pub fn new(max_z0: f64, max_tan_lambda: f64, max_sz_chi2_per_ndf: f64) -> Self {
        Self {
            max_z0,
            max_tan_lambda,
            max_sz_chi2_per_ndf,
        }
    }

    pub fn parameters() -> Vec<ParameterDescriptor> {
        vec![
            ParameterDescriptor::number("max_z0", 50.0, "Largest |z0| (cm)"),
            ParameterDescriptor::number("max_tan_lambda", 5.0, "Largest |tan lambda|"),
            ParameterDescriptor::number("max_sz_chi2_per_ndf", 100.0, "Largest sz chi2/ndf"),
        ]
    }

    pub fn from_parameters(params: &Parameters) -> Result<Self, ConfigError> {
        Ok(Self::new(
            params.non_negative("max_z0")?,
            params.non_negative("max_tan_lambda")?,
            params.non_negative("max_sz_chi2_per_ndf")?,
        ))
    }
}

impl Filter<SegmentTriple> for SimpleTripleFilter {
    fn name(&self) -> &str {
        "simple"
    }

    fn weigh(&mut self, triple: &SegmentTriple, event: &EventContext<'_>) -> Weight {
        if triple.sz.z0.abs() > self.max_z0
            || triple.sz.tan_lambda.abs() > self.max_tan_lambda
            || triple.sz_chi2_per_ndf() > self.max_sz_chi2_per_ndf
        {
            return REJECT;
        }
        triple.nominal_weight(event)
    }
}

/// Requires compatible sz lines of neighbouring triples.
#[derive(Debug, Clone)]
pub struct SimpleTripleRelationFilter {
    max_delta_tan_lambda: f64,
    max_delta_z0: f64,
}

impl SimpleTripleRelationFilter {
    pub fn new(max_delta_tan_lambda: f64, max_delta_z0: f64) -> Self {
        Self {
            max_delta_tan_lambda,
            max_delta_z0,
        }
    }

    pub fn parameters() -> Vec<ParameterDescriptor> {
        vec![
            ParameterDescriptor::number("max_delta_tan_lambda", 1.0, "Largest tan lambda difference"),
            ParameterDescriptor::number("max_delta_z0", 40.0, "Largest z0 difference (cm)"),
        ]
    }

    pub fn from_parameters(params: &Parameters) -> Result<Self, ConfigError> {
        Ok(Self::new(
            params.non_negative("max_delta_tan_lambda")?,
            params.non_negative("max_delta_z0")?,
        ))
    }
}

impl Filter<TripleRelation> for SimpleTripleRelationFilter {
    fn name(&self) -> &str {
        "simple"
    }

    fn weigh(&mut self, relation: &TripleRelation, event: &EventContext<'_>) -> Weight {
        let (Some(from), Some(to)) = (event.triples.get(relation.from), event.triples.get(relation.to)) else {
            return REJECT;
        };
        if (from.sz.tan_lambda - to.sz.tan_lambda).abs() > self.max_delta_tan_lambda
            || (from.sz.z0 - to.sz.z0).abs() > self.max_delta_z0
        {
            return REJECT;
        }
        relation.nominal_weight(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::{SzTrajectory, Trajectory2D};
    use crate::hits::HitStore;

    fn triple(start: usize, tan_lambda: f64, z0: f64) -> SegmentTriple {
        SegmentTriple {
            start,
            middle: start + 1,
            end: start + 2,
            trajectory: Trajectory2D::through_origin(0.01, 0.0),
            sz: SzTrajectory::new(tan_lambda, z0),
            sz_chi2: 1.0,
            sz_ndf: 2,
            weight: 0.0,
        }
    }

    #[test]
    fn test_triple_cuts() {
        let geometry = trackfind_env::CylindricalGeometry::default();
        let store = HitStore::default();
        let event = EventContext::new(&store, &geometry);
        let mut filter = SimpleTripleFilter::new(30.0, 3.0, 10.0);

        assert_eq!(filter.weigh(&triple(0, 0.5, 5.0), &event), 0.0);
        assert!(filter.weigh(&triple(0, 0.5, -35.0), &event).is_nan());
        assert!(filter.weigh(&triple(0, 3.5, 0.0), &event).is_nan());
    }

    #[test]
    fn test_relation_cuts() {
        let geometry = trackfind_env::CylindricalGeometry::default();
        let store = HitStore::default();
        let triples = [triple(0, 0.5, 2.0), triple(2, 0.6, 4.0), triple(2, 2.0, 4.0)];
        let event = EventContext::new(&store, &geometry).with_triples(&triples);
        let mut filter = SimpleTripleRelationFilter::new(0.5, 10.0);

        assert_eq!(filter.weigh(&TripleRelation { from: 0, to: 1 }, &event), 0.0);
        assert!(filter.weigh(&TripleRelation { from: 0, to: 2 }, &event).is_nan());
        assert!(filter.weigh(&TripleRelation { from: 0, to: 7 }, &event).is_nan());
    }
}
