//! Filters and helpers based on simulation truth.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use super::{EventContext, Filter, HitContent, Weight, REJECT};
use crate::error::ConfigError;
use crate::hits::HitId;

/// Particle that contributed most hits to a candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TruthMatch {
    pub particle_id: u32,
    /// Fraction of the candidate's hits from this particle
    pub purity: f64,
    /// Fraction of the particle's hits contained in the candidate
    pub efficiency: f64,
    /// The particle's hits appear in flight order
    pub ordered: bool,
}

/// Majority particle of a hit list; `None` without truth or matched hits.
///
/// Ties go to the lowest particle id.
pub fn majority_particle(hits: &[HitId], event: &EventContext<'_>) -> Option<TruthMatch> {
    let truth = event.truth?;
    if hits.is_empty() {
        return None;
    }

    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    let infos: Vec<_> = hits
        .iter()
        .map(|&id| truth.mc_hit(event.hits.get(id).raw_index))
        .collect();
    for info in infos.iter().flatten() {
        *counts.entry(info.particle_id).or_insert(0) += 1;
    }

    let (particle_id, count) = counts
        .iter()
        .fold(None, |best: Option<(u32, usize)>, (&id, &count)| match best {
            Some((_, best_count)) if count <= best_count => best,
            _ => Some((id, count)),
        })?;

    let orders: Vec<u32> = infos
        .iter()
        .flatten()
        .filter(|info| info.particle_id == particle_id)
        .map(|info| info.order)
        .collect();
    let ordered = orders.windows(2).all(|w| w[0] < w[1]);
    let total = truth.particle_hit_count(particle_id).max(1);

    Some(TruthMatch {
        particle_id,
        purity: count as f64 / hits.len() as f64,
        efficiency: count as f64 / total as f64,
        ordered,
    })
}

/// Accepts candidates made of the hits of one particle in flight order.
#[derive(Debug, Clone)]
pub struct TruthFilter<T> {
    min_purity: f64,
    require_order: bool,
    hits: Vec<HitId>,
    _marker: PhantomData<fn(&T)>,
}

impl<T> TruthFilter<T> {
    pub fn new(min_purity: f64, require_order: bool) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&min_purity) {
            return Err(ConfigError::invalid_parameter(
                "truth",
                "min_purity",
                format!("{} is outside [0, 1]", min_purity),
            ));
        }
        Ok(Self {
            min_purity,
            require_order,
            hits: Vec::new(),
            _marker: PhantomData,
        })
    }
}

impl<T: HitContent> Filter<T> for TruthFilter<T> {
    fn name(&self) -> &str {
        "truth"
    }

    fn weigh(&mut self, object: &T, event: &EventContext<'_>) -> Weight {
        self.hits.clear();
        object.collect_hits(event, &mut self.hits);
        match majority_particle(&self.hits, event) {
            Some(m) if m.purity >= self.min_purity && (m.ordered || !self.require_order) => {
                object.nominal_weight(event)
            }
            _ => REJECT,
        }
    }

    fn needs_truth_information(&self) -> bool {
        true
    }
}
