//! Filters that do not look at their candidates.

use std::marker::PhantomData;

use super::{EventContext, Filter, HitContent, Weight, REJECT};

/// Accepts every candidate, with a constant or its nominal weight.
#[derive(Debug, Clone)]
pub struct AllFilter<T> {
    weight: Option<Weight>,
    _marker: PhantomData<fn(&T)>,
}

impl<T> AllFilter<T> {
    pub fn new(weight: Weight) -> Self {
        Self {
            weight: Some(weight),
            _marker: PhantomData,
        }
    }

    /// Weighs each candidate with [`HitContent::nominal_weight`].
    pub fn nominal() -> Self {
        Self {
            weight: None,
            _marker: PhantomData,
        }
    }
}

impl<T: HitContent> Filter<T> for AllFilter<T> {
    fn name(&self) -> &str {
        "all"
    }

    fn weigh(&mut self, object: &T, event: &EventContext<'_>) -> Weight {
        match self.weight {
            Some(weight) => weight,
            None => object.nominal_weight(event),
        }
    }
}

/// Rejects every candidate.
#[derive(Debug, Clone)]
pub struct NoneFilter<T> {
    _marker: PhantomData<fn(&T)>,
}

impl<T> NoneFilter<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for NoneFilter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Filter<T> for NoneFilter<T> {
    fn name(&self) -> &str {
        "none"
    }

    fn weigh(&mut self, _object: &T, _event: &EventContext<'_>) -> Weight {
        REJECT
    }
}
