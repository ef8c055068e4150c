//! Logistic-regression filter over a variable set.
//!
//! Weights are trained offline on rows written by the recording filter and
//! loaded from a JSON file of the form
//! `{"bias": -1.2, "weights": {"n_hits": 0.3, ...}}`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::{EventContext, Filter, HitContent, VarRow, VarSet, Weight, REJECT};
use crate::error::ConfigError;

/// Trained coefficients keyed by variable name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MvaWeights {
    pub bias: f64,
    pub weights: BTreeMap<String, f64>,
}

impl MvaWeights {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Probability in (0, 1); `None` if a weighted variable is missing.
    pub fn evaluate(&self, row: &VarRow) -> Option<f64> {
        let mut sum = self.bias;
        for (name, weight) in &self.weights {
            sum += weight * row.get(name)?;
        }
        Some(1.0 / (1.0 + (-sum).exp()))
    }
}

/// Accepts candidates whose probability reaches the cut.
///
/// Accepted candidates are weighted with the probability times their
/// nominal weight, so automaton stages keep their hit-count scale.
pub struct MvaFilter<T> {
    varset: Box<dyn VarSet<T>>,
    weights: MvaWeights,
    cut: f64,
    row: VarRow,
}

impl<T> MvaFilter<T> {
    /// Fails if the weights refer to variables the set does not provide.
    pub fn new(varset: Box<dyn VarSet<T>>, weights: MvaWeights, cut: f64) -> Result<Self, ConfigError> {
        let names = varset.names();
        if let Some(unknown) = weights.weights.keys().find(|k| !names.iter().any(|n| *n == k.as_str())) {
            return Err(ConfigError::invalid_parameter(
                "mva",
                "weights",
                format!("variable '{}' is not in variable set '{}'", unknown, varset.name()),
            ));
        }
        if !(0.0..=1.0).contains(&cut) {
            return Err(ConfigError::invalid_parameter("mva", "cut", format!("{} is outside [0, 1]", cut)));
        }
        Ok(Self {
            varset,
            weights,
            cut,
            row: VarRow::new(),
        })
    }
}

impl<T: HitContent> Filter<T> for MvaFilter<T> {
    fn name(&self) -> &str {
        "mva"
    }

    fn weigh(&mut self, object: &T, event: &EventContext<'_>) -> Weight {
        self.row.clear();
        if !self.varset.extract(object, event, &mut self.row) {
            return REJECT;
        }
        match self.weights.evaluate(&self.row) {
            Some(p) if p >= self.cut => p * object.nominal_weight(event),
            _ => REJECT,
        }
    }

    fn needs_truth_information(&self) -> bool {
        self.varset.needs_truth_information()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{varset_by_name, HitPairVarSet};
    use crate::hits::{HitId, HitStore};
    use crate::segment::HitPair;
    use approx::assert_relative_eq;
    use trackfind_env::{CylindricalGeometry, RawHit, WireId};

    #[test]
    fn test_evaluate() {
        let weights = MvaWeights::from_json_str(r#"{"bias": 1.0, "weights": {"a": 2.0}}"#).unwrap();
        let mut row = VarRow::new();
        assert!(weights.evaluate(&row).is_none());
        row.insert("a".into(), -0.5);
        assert_relative_eq!(weights.evaluate(&row).unwrap(), 0.5);
    }

    #[test]
    fn test_unknown_variable_rejected_at_construction() {
        let weights = MvaWeights::from_json_str(r#"{"bias": 0.0, "weights": {"colour": 1.0}}"#).unwrap();
        let result = MvaFilter::<HitPair>::new(Box::new(HitPairVarSet), weights, 0.5);
        assert!(matches!(result, Err(ConfigError::InvalidParameter { .. })));
    }

    #[test]
    fn test_cut_on_distance() {
        let geometry = CylindricalGeometry::default();
        let raw = vec![
            RawHit::new(WireId::new(0, 0, 10), 0.2),
            RawHit::new(WireId::new(0, 1, 10), 0.3),
            RawHit::new(WireId::new(0, 2, 40), 0.3),
        ];
        let store = HitStore::build(&raw, &geometry).unwrap();
        let event = EventContext::new(&store, &geometry);
        // p >= 0.5 exactly when distance <= 3
        let weights = MvaWeights::from_json_str(r#"{"bias": 3.0, "weights": {"distance": -1.0}}"#).unwrap();
        let varset = varset_by_name::<HitPair>("basic").unwrap();
        let mut filter = MvaFilter::new(varset, weights, 0.5).unwrap();

        let near = filter.weigh(&HitPair { from: HitId(0), to: HitId(1) }, &event);
        assert!(near > 0.5 && near < 1.0);
        assert!(filter.weigh(&HitPair { from: HitId(1), to: HitId(2) }, &event).is_nan());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            MvaWeights::from_path("/nonexistent/weights.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
