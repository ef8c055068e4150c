//! Recording filter: writes variable rows for offline training.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use trackfind_env::WireGeometry;

use super::{EventContext, Filter, VarRow, VarSet, Weight};
use crate::error::ConfigError;

/// Variables of one graded candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedRow {
    /// Candidate type, e.g. `hit_pair`
    pub kind: String,
    /// Weight the wrapped filter returned, `null` for rejections
    pub weight: Option<f64>,
    /// Variables prefixed with their set name, e.g. `basic_distance`
    pub variables: VarRow,
}

/// Shared row buffer of all recording filters of a registry.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    rows: Arc<Mutex<Vec<RecordedRow>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, row: RecordedRow) {
        match self.rows.lock() {
            Ok(mut rows) => rows.push(row),
            Err(poisoned) => poisoned.into_inner().push(row),
        }
    }

    /// Removes and returns all rows recorded so far.
    pub fn take(&self) -> Vec<RecordedRow> {
        match self.rows.lock() {
            Ok(mut rows) => std::mem::take(&mut *rows),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn len(&self) -> usize {
        match self.rows.lock() {
            Ok(rows) => rows.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Wraps another filter and records the variables of every candidate it sees.
///
/// The wrapped filter's verdict is passed through unchanged.
pub struct RecordingFilter<T> {
    kind: &'static str,
    varsets: Vec<Box<dyn VarSet<T>>>,
    inner: Box<dyn Filter<T>>,
    sink: RecordingSink,
}

impl<T> RecordingFilter<T> {
    pub fn new(
        kind: &'static str,
        varsets: Vec<Box<dyn VarSet<T>>>,
        inner: Box<dyn Filter<T>>,
        sink: RecordingSink,
    ) -> Self {
        Self {
            kind,
            varsets,
            inner,
            sink,
        }
    }
}

impl<T> Filter<T> for RecordingFilter<T> {
    fn name(&self) -> &str {
        "recording"
    }

    fn weigh(&mut self, object: &T, event: &EventContext<'_>) -> Weight {
        let weight = self.inner.weigh(object, event);

        let mut variables = VarRow::new();
        let mut scratch = VarRow::new();
        for varset in &self.varsets {
            scratch.clear();
            if varset.extract(object, event, &mut scratch) {
                for (name, value) in &scratch {
                    variables.insert(format!("{}_{}", varset.name(), name), *value);
                }
            }
        }

        self.sink.push(RecordedRow {
            kind: self.kind.to_string(),
            weight: weight.is_finite().then_some(weight),
            variables,
        });
        weight
    }

    fn needs_truth_information(&self) -> bool {
        self.inner.needs_truth_information()
            || self.varsets.iter().any(|v| v.needs_truth_information())
    }

    fn initialize(&mut self, geometry: &dyn WireGeometry) -> Result<(), ConfigError> {
        self.inner.initialize(geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{HitPairVarSet, NoneFilter};
    use crate::hits::{HitId, HitStore};
    use crate::segment::HitPair;
    use trackfind_env::{CylindricalGeometry, RawHit, WireId};

    #[test]
    fn test_records_rejections_too() {
        let geometry = CylindricalGeometry::default();
        let raw = vec![
            RawHit::new(WireId::new(0, 0, 10), 0.2),
            RawHit::new(WireId::new(0, 1, 10), 0.3),
        ];
        let store = HitStore::build(&raw, &geometry).unwrap();
        let event = EventContext::new(&store, &geometry);
        let sink = RecordingSink::new();
        let mut filter = RecordingFilter::new(
            "hit_pair",
            vec![Box::new(HitPairVarSet) as Box<dyn VarSet<HitPair>>],
            Box::new(NoneFilter::<HitPair>::new()),
            sink.clone(),
        );

        let weight = filter.weigh(&HitPair { from: HitId(0), to: HitId(1) }, &event);
        assert!(weight.is_nan());

        let rows = sink.take();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, "hit_pair");
        assert_eq!(rows[0].weight, None);
        assert_eq!(rows[0].variables["basic_drift_to"], 0.3);
        assert!(sink.is_empty());
    }
}
