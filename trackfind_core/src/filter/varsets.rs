//! Variable sets: named features extracted from candidates.
//!
//! Variable sets feed the MVA filter and the recording filter. Every
//! candidate type has a `basic` set; `hits` and `truth` work on any
//! candidate made of wire hits.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use super::{majority_particle, EventContext, HitContent};
use crate::fit::normalize_angle;
use crate::hits::HitId;
use crate::segment::HitPair;
use crate::track::Track;
use crate::triple::{SegmentPair, SegmentTriple, TripleRelation};

/// Extracted variables keyed by name.
pub type VarRow = BTreeMap<String, f64>;

/// Extracts named variables from candidates of type `T`.
pub trait VarSet<T>: Send {
    fn name(&self) -> &str;

    /// Names of the variables `extract` fills.
    fn names(&self) -> Vec<&'static str>;

    /// Fills `row`; false if the candidate has no such variables.
    fn extract(&self, object: &T, event: &EventContext<'_>, row: &mut VarRow) -> bool;

    fn needs_truth_information(&self) -> bool {
        false
    }
}

/// Candidate types with variable sets.
pub trait Recordable: HitContent + Sized + 'static {
    /// Object kind used in recorded rows.
    const KIND: &'static str;

    fn basic_varset() -> Box<dyn VarSet<Self>>;
}

/// Looks up a variable set by name: `basic`, `hits` or `truth`.
pub fn varset_by_name<T: Recordable>(name: &str) -> Option<Box<dyn VarSet<T>>> {
    match name {
        "basic" => Some(T::basic_varset()),
        "hits" => Some(Box::new(HitCountVarSet::new())),
        "truth" => Some(Box::new(TruthVarSet::new())),
        _ => None,
    }
}

fn set(row: &mut VarRow, name: &str, value: f64) {
    row.insert(name.to_string(), value);
}

fn hits_of<T: HitContent>(object: &T, event: &EventContext<'_>) -> Vec<HitId> {
    let mut hits = Vec::new();
    object.collect_hits(event, &mut hits);
    hits
}

// ============================================================================
// GENERIC SETS
// ============================================================================

/// Hit and superlayer counts.
#[derive(Debug, Clone, Copy)]
pub struct HitCountVarSet<T> {
    _marker: PhantomData<fn(&T)>,
}

impl<T> HitCountVarSet<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for HitCountVarSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: HitContent> VarSet<T> for HitCountVarSet<T> {
    fn name(&self) -> &str {
        "hits"
    }

    fn names(&self) -> Vec<&'static str> {
        vec!["n_hits", "n_axial", "n_stereo", "n_superlayers"]
    }

    fn extract(&self, object: &T, event: &EventContext<'_>, row: &mut VarRow) -> bool {
        let hits = hits_of(object, event);
        let axial = hits.iter().filter(|&&id| event.hits.get(id).is_axial()).count();
        let mut superlayers: Vec<u8> = hits.iter().map(|&id| event.hits.get(id).superlayer()).collect();
        superlayers.sort_unstable();
        superlayers.dedup();

        set(row, "n_hits", hits.len() as f64);
        set(row, "n_axial", axial as f64);
        set(row, "n_stereo", (hits.len() - axial) as f64);
        set(row, "n_superlayers", superlayers.len() as f64);
        true
    }
}

/// Truth match of the candidate; the training target.
#[derive(Debug, Clone, Copy)]
pub struct TruthVarSet<T> {
    _marker: PhantomData<fn(&T)>,
}

impl<T> TruthVarSet<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for TruthVarSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: HitContent> VarSet<T> for TruthVarSet<T> {
    fn name(&self) -> &str {
        "truth"
    }

    fn names(&self) -> Vec<&'static str> {
        vec!["truth", "purity", "efficiency", "ordered"]
    }

    fn extract(&self, object: &T, event: &EventContext<'_>, row: &mut VarRow) -> bool {
        let hits = hits_of(object, event);
        let Some(matched) = majority_particle(&hits, event) else {
            return false;
        };
        let good = matched.purity >= 1.0 && matched.ordered;
        set(row, "truth", if good { 1.0 } else { 0.0 });
        set(row, "purity", matched.purity);
        set(row, "efficiency", matched.efficiency);
        set(row, "ordered", if matched.ordered { 1.0 } else { 0.0 });
        true
    }

    fn needs_truth_information(&self) -> bool {
        true
    }
}

// ============================================================================
// BASIC SETS
// ============================================================================

/// Wire distance and drift lengths of a hit pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct HitPairVarSet;

impl VarSet<HitPair> for HitPairVarSet {
    fn name(&self) -> &str {
        "basic"
    }

    fn names(&self) -> Vec<&'static str> {
        vec!["distance", "drift_from", "drift_to", "drift_difference", "layer"]
    }

    fn extract(&self, pair: &HitPair, event: &EventContext<'_>, row: &mut VarRow) -> bool {
        let from = event.hits.get(pair.from);
        let to = event.hits.get(pair.to);
        set(row, "distance", from.ref_distance(to));
        set(row, "drift_from", from.drift_length);
        set(row, "drift_to", to.drift_length);
        set(row, "drift_difference", (from.drift_length - to.drift_length).abs());
        set(row, "layer", from.layer() as f64);
        true
    }
}

/// Fit quality and segment agreement of a segment pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentPairVarSet;

impl VarSet<SegmentPair> for SegmentPairVarSet {
    fn name(&self) -> &str {
        "basic"
    }

    fn names(&self) -> Vec<&'static str> {
        vec!["start_hits", "end_hits", "chi2_per_ndf", "curvature", "delta_phi", "delta_curvature"]
    }

    fn extract(&self, pair: &SegmentPair, event: &EventContext<'_>, row: &mut VarRow) -> bool {
        let (Some(start), Some(end)) = (event.segments.get(pair.start), event.segments.get(pair.end)) else {
            return false;
        };
        let delta_phi = normalize_angle(end.phi(event.hits) - start.phi(event.hits));
        set(row, "start_hits", start.len() as f64);
        set(row, "end_hits", end.len() as f64);
        set(row, "chi2_per_ndf", pair.fit.chi2_per_ndf());
        set(row, "curvature", pair.fit.trajectory.curvature);
        set(row, "delta_phi", delta_phi);
        set(row, "delta_curvature", end.trajectory.curvature - start.trajectory.curvature);
        true
    }
}

/// Trajectory and sz line of a triple.
#[derive(Debug, Clone, Copy, Default)]
pub struct TripleVarSet;

impl VarSet<SegmentTriple> for TripleVarSet {
    fn name(&self) -> &str {
        "basic"
    }

    fn names(&self) -> Vec<&'static str> {
        vec!["curvature", "tan_lambda", "z0", "sz_chi2_per_ndf", "middle_hits"]
    }

    fn extract(&self, triple: &SegmentTriple, event: &EventContext<'_>, row: &mut VarRow) -> bool {
        let Some(middle) = event.segments.get(triple.middle) else {
            return false;
        };
        set(row, "curvature", triple.trajectory.curvature);
        set(row, "tan_lambda", triple.sz.tan_lambda);
        set(row, "z0", triple.sz.z0);
        set(row, "sz_chi2_per_ndf", triple.sz_chi2_per_ndf());
        set(row, "middle_hits", middle.len() as f64);
        true
    }
}

/// Agreement of two neighbouring triples.
#[derive(Debug, Clone, Copy, Default)]
pub struct TripleRelationVarSet;

impl VarSet<TripleRelation> for TripleRelationVarSet {
    fn name(&self) -> &str {
        "basic"
    }

    fn names(&self) -> Vec<&'static str> {
        vec!["delta_tan_lambda", "delta_z0", "delta_curvature"]
    }

    fn extract(&self, relation: &TripleRelation, event: &EventContext<'_>, row: &mut VarRow) -> bool {
        let (Some(from), Some(to)) = (event.triples.get(relation.from), event.triples.get(relation.to)) else {
            return false;
        };
        set(row, "delta_tan_lambda", to.sz.tan_lambda - from.sz.tan_lambda);
        set(row, "delta_z0", to.sz.z0 - from.sz.z0);
        set(row, "delta_curvature", to.trajectory.curvature - from.trajectory.curvature);
        true
    }
}

/// Fit parameters of a track.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackVarSet;

impl VarSet<Track> for TrackVarSet {
    fn name(&self) -> &str {
        "basic"
    }

    fn names(&self) -> Vec<&'static str> {
        vec!["n_hits", "chi2_per_ndf", "curvature", "abs_impact", "has_sz", "tan_lambda"]
    }

    fn extract(&self, track: &Track, _event: &EventContext<'_>, row: &mut VarRow) -> bool {
        set(row, "n_hits", track.len() as f64);
        set(row, "chi2_per_ndf", track.chi2_per_ndf());
        set(row, "curvature", track.trajectory.curvature);
        set(row, "abs_impact", track.trajectory.impact.abs());
        set(row, "has_sz", if track.sz.is_some() { 1.0 } else { 0.0 });
        set(row, "tan_lambda", track.sz.map_or(0.0, |sz| sz.tan_lambda));
        true
    }
}

impl Recordable for HitPair {
    const KIND: &'static str = "hit_pair";

    fn basic_varset() -> Box<dyn VarSet<Self>> {
        Box::new(HitPairVarSet)
    }
}

impl Recordable for SegmentPair {
    const KIND: &'static str = "segment_pair";

    fn basic_varset() -> Box<dyn VarSet<Self>> {
        Box::new(SegmentPairVarSet)
    }
}

impl Recordable for SegmentTriple {
    const KIND: &'static str = "triple";

    fn basic_varset() -> Box<dyn VarSet<Self>> {
        Box::new(TripleVarSet)
    }
}

impl Recordable for TripleRelation {
    const KIND: &'static str = "triple_relation";

    fn basic_varset() -> Box<dyn VarSet<Self>> {
        Box::new(TripleRelationVarSet)
    }
}

impl Recordable for Track {
    const KIND: &'static str = "track";

    fn basic_varset() -> Box<dyn VarSet<Self>> {
        Box::new(TrackVarSet)
    }
}
