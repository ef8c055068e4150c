//! One filter factory per candidate type, pre-filled with the built-in filters.

use super::{
    varset_by_name, AllFilter, Filter, FilterConfig, FilterFactory, MvaFilter, MvaWeights, NoneFilter,
    ParameterDescriptor, Parameters, Recordable, RecordingFilter, RecordingSink, SimpleHitPairFilter,
    SimpleSegmentPairFilter, SimpleTrackFilter, SimpleTripleFilter, SimpleTripleRelationFilter,
    TruthFilter, VarSet,
};
use crate::error::ConfigError;
use crate::segment::HitPair;
use crate::track::Track;
use crate::triple::{SegmentPair, SegmentTriple, TripleRelation};

/// Filter factories of all pipeline stages.
///
/// Every factory knows `all`, `none`, `truth`, `mva`, `recording` and the
/// type's own `simple` filter. Further filters can be registered before the
/// pipeline is assembled.
#[derive(Debug, Clone)]
pub struct FilterRegistry {
    pub hit_pairs: FilterFactory<HitPair>,
    pub segment_pairs: FilterFactory<SegmentPair>,
    pub triples: FilterFactory<SegmentTriple>,
    pub triple_relations: FilterFactory<TripleRelation>,
    pub tracks: FilterFactory<Track>,
    recordings: RecordingSink,
}

impl FilterRegistry {
    /// Registry without any filters.
    pub fn empty() -> Self {
        Self {
            hit_pairs: FilterFactory::new("hit pair"),
            segment_pairs: FilterFactory::new("segment pair"),
            triples: FilterFactory::new("triple"),
            triple_relations: FilterFactory::new("triple relation"),
            tracks: FilterFactory::new("track"),
            recordings: RecordingSink::new(),
        }
    }

    /// Registry with the built-in filters.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        let sink = registry.recordings.clone();

        registry.hit_pairs.register(
            "simple",
            "Wire distance and drift circle compatibility",
            SimpleHitPairFilter::parameters(),
            |p| Ok(Box::new(SimpleHitPairFilter::from_parameters(p)?)),
        );
        registry.segment_pairs.register(
            "simple",
            "Combined circle fit quality",
            SimpleSegmentPairFilter::parameters(),
            |p| Ok(Box::new(SimpleSegmentPairFilter::from_parameters(p)?)),
        );
        registry.triples.register(
            "simple",
            "Sz line of the stereo segment",
            SimpleTripleFilter::parameters(),
            |p| Ok(Box::new(SimpleTripleFilter::from_parameters(p)?)),
        );
        registry.triple_relations.register(
            "simple",
            "Sz agreement of neighbouring triples",
            SimpleTripleRelationFilter::parameters(),
            |p| Ok(Box::new(SimpleTripleRelationFilter::from_parameters(p)?)),
        );
        registry.tracks.register(
            "simple",
            "Hit count and fit quality",
            SimpleTrackFilter::parameters(),
            |p| Ok(Box::new(SimpleTrackFilter::from_parameters(p)?)),
        );

        register_common(&mut registry.hit_pairs, &sink);
        register_common(&mut registry.segment_pairs, &sink);
        register_common(&mut registry.triples, &sink);
        register_common(&mut registry.triple_relations, &sink);
        register_common(&mut registry.tracks, &sink);
        registry
    }

    /// Rows written by recording filters created from this registry.
    pub fn recordings(&self) -> &RecordingSink {
        &self.recordings
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn register_common<T: Recordable>(factory: &mut FilterFactory<T>, sink: &RecordingSink) {
    factory.register("all", "Accepts everything with the nominal weight", Vec::new(), |_| {
        Ok(Box::new(AllFilter::<T>::nominal()))
    });
    factory.register("none", "Rejects everything", Vec::new(), |_| {
        Ok(Box::new(NoneFilter::<T>::new()))
    });
    factory.register(
        "truth",
        "Accepts candidates from a single particle in flight order",
        vec![
            ParameterDescriptor::number("min_purity", 1.0, "Smallest majority particle hit fraction"),
            ParameterDescriptor::number("require_order", 1.0, "Non-zero requires flight order"),
        ],
        |p| {
            let filter = TruthFilter::<T>::new(p.number("min_purity")?, p.number("require_order")? != 0.0)?;
            Ok(Box::new(filter))
        },
    );
    factory.register(
        "mva",
        "Logistic regression over a variable set",
        vec![
            ParameterDescriptor::text("weights", "", "Path of the JSON weight file"),
            ParameterDescriptor::text("varset", "basic", "Variable set the weights refer to"),
            ParameterDescriptor::number("cut", 0.5, "Smallest accepted probability"),
        ],
        |p| {
            let path = p.text("weights")?;
            if path.is_empty() {
                return Err(ConfigError::invalid_parameter(p.filter(), "weights", "no weight file given"));
            }
            let weights = MvaWeights::from_path(path)?;
            let varset = lookup_varset::<T>(p, p.text("varset")?)?;
            Ok(Box::new(MvaFilter::new(varset, weights, p.number("cut")?)?))
        },
    );

    // Recording wraps any filter registered so far
    let snapshot = factory.clone();
    let sink = sink.clone();
    factory.register(
        "recording",
        "Records variable rows and passes the wrapped filter's verdict on",
        vec![
            ParameterDescriptor::text("inner", "all", "Wrapped filter"),
            ParameterDescriptor::text("varsets", "basic,hits", "Comma separated variable sets"),
        ],
        move |p| {
            let inner = snapshot.create(&FilterConfig::named(p.text("inner")?))?;
            let varsets = p
                .text("varsets")?
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| lookup_varset::<T>(p, name))
                .collect::<Result<Vec<_>, _>>()?;
            let filter: Box<dyn Filter<T>> = Box::new(RecordingFilter::new(T::KIND, varsets, inner, sink.clone()));
            Ok(filter)
        },
    );
}

fn lookup_varset<T: Recordable>(params: &Parameters, name: &str) -> Result<Box<dyn VarSet<T>>, ConfigError> {
    varset_by_name::<T>(name).ok_or_else(|| {
        ConfigError::invalid_parameter(params.filter(), "varset", format!("unknown variable set '{}'", name))
    })
}
