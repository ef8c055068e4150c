//! Geometric hit pair filter.

use super::{EventContext, Filter, ParameterDescriptor, Parameters, Weight, REJECT};
use crate::error::ConfigError;
use crate::segment::HitPair;

/// Accepts neighbouring hits whose drift circles admit a common tangent.
#[derive(Debug, Clone)]
pub struct SimpleHitPairFilter {
    max_distance: f64,
    weight: f64,
}

impl SimpleHitPairFilter {
    pub fn new(max_distance: f64, weight: f64) -> Self {
        Self { max_distance, weight }
    }

    pub fn parameters() -> Vec<ParameterDescriptor> {
        vec![
            ParameterDescriptor::number("max_distance", 2.5, "Largest wire distance (cm)"),
            ParameterDescriptor::number("weight", 1.0, "Weight of accepted pairs"),
        ]
    }

    pub fn from_parameters(params: &Parameters) -> Result<Self, ConfigError> {
        Ok(Self::new(params.non_negative("max_distance")?, params.number("weight")?))
    }
}

impl Filter<HitPair> for SimpleHitPairFilter {
    fn name(&self) -> &str {
        "simple"
    }

    fn weigh(&mut self, pair: &HitPair, event: &EventContext<'_>) -> Weight {
        let from = event.hits.get(pair.from);
        let to = event.hits.get(pair.to);
        let distance = from.ref_distance(to);
        // One drift circle inside the other has no common tangent
        let nested = distance < (from.drift_length - to.drift_length).abs();
        if distance > self.max_distance || nested {
            REJECT
        } else {
            self.weight
        }
    }
}
