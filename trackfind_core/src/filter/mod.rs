//! Filter framework.
//!
//! A filter grades a candidate object (a hit pair, a segment pair, a triple,
//! a relation between triples, a track) with a [`Weight`]. A finite weight
//! accepts the candidate, NaN rejects it. Filters are created by name from a
//! [`FilterFactory`] so the pipeline can be reconfigured without code
//! changes; the [`FilterRegistry`] bundles one factory per object type.

mod basic;
mod factory;
mod hit_pair;
mod mva;
mod recording;
mod registry;
mod segment_pair;
mod track;
mod triple;
mod truth;
mod varsets;

pub use basic::{AllFilter, NoneFilter};
pub use factory::{
    FilterConfig, FilterFactory, ParamDefault, ParamValue, ParameterDescriptor, Parameters,
};
pub use hit_pair::SimpleHitPairFilter;
pub use mva::{MvaFilter, MvaWeights};
pub use recording::{RecordedRow, RecordingFilter, RecordingSink};
pub use registry::FilterRegistry;
pub use segment_pair::SimpleSegmentPairFilter;
pub use track::SimpleTrackFilter;
pub use triple::{SimpleTripleFilter, SimpleTripleRelationFilter};
pub use truth::{majority_particle, TruthFilter, TruthMatch};
pub use varsets::{
    varset_by_name, HitCountVarSet, HitPairVarSet, Recordable, SegmentPairVarSet, TrackVarSet,
    TripleRelationVarSet, TripleVarSet, TruthVarSet, VarRow, VarSet,
};

use trackfind_env::{McTruthLookup, WireGeometry};

use crate::error::ConfigError;
use crate::hits::{HitId, HitStore};
use crate::segment::Segment;
use crate::triple::SegmentTriple;

/// Grade of a candidate; NaN rejects.
pub type Weight = f64;

/// Weight of a rejected candidate.
pub const REJECT: Weight = f64::NAN;

/// True for weights that accept a candidate.
#[inline]
pub fn is_accepted(weight: Weight) -> bool {
    weight.is_finite()
}

/// Read-only event data a filter may consult.
#[derive(Clone, Copy)]
pub struct EventContext<'a> {
    pub hits: &'a HitStore,
    pub geometry: &'a dyn WireGeometry,
    /// Present only when the event carries simulation truth
    pub truth: Option<&'a dyn McTruthLookup>,
    /// Segments built so far in this event
    pub segments: &'a [Segment],
    /// Segment triples built so far in this event
    pub triples: &'a [SegmentTriple],
}

impl<'a> EventContext<'a> {
    pub fn new(hits: &'a HitStore, geometry: &'a dyn WireGeometry) -> Self {
        Self {
            hits,
            geometry,
            truth: None,
            segments: &[],
            triples: &[],
        }
    }

    pub fn with_truth(mut self, truth: Option<&'a dyn McTruthLookup>) -> Self {
        self.truth = truth;
        self
    }

    pub fn with_segments(mut self, segments: &'a [Segment]) -> Self {
        self.segments = segments;
        self
    }

    pub fn with_triples(mut self, triples: &'a [SegmentTriple]) -> Self {
        self.triples = triples;
        self
    }
}

/// Grades candidates of type `T`.
pub trait Filter<T>: Send {
    /// Name the filter was registered under.
    fn name(&self) -> &str;

    /// Weight of a candidate; NaN rejects it.
    fn weigh(&mut self, object: &T, event: &EventContext<'_>) -> Weight;

    /// True if the filter can only work with simulation truth.
    fn needs_truth_information(&self) -> bool {
        false
    }

    /// Called once before the first event.
    fn initialize(&mut self, _geometry: &dyn WireGeometry) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Candidates that are made of wire hits.
pub trait HitContent {
    /// Hits of the candidate in flight order.
    fn collect_hits(&self, event: &EventContext<'_>, out: &mut Vec<HitId>);

    /// Weight a perfect candidate is given by accepting filters.
    fn nominal_weight(&self, event: &EventContext<'_>) -> Weight {
        let mut hits = Vec::new();
        self.collect_hits(event, &mut hits);
        hits.len() as Weight
    }
}
