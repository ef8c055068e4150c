//! Monte-Carlo truth lookup, used only by truth-based filters and validation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Truth record of a single hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct McHitInfo {
    /// Simulated particle that produced the hit
    pub particle_id: u32,

    /// Position of the hit along the particle's flight (0 = first hit)
    pub order: u32,
}

/// Read-only map from hit index (position in the hit source) to truth.
pub trait McTruthLookup {
    /// Truth of a hit, `None` for background or unmatched hits.
    fn mc_hit(&self, hit_index: usize) -> Option<McHitInfo>;

    /// Number of hits a particle left in the detector.
    fn particle_hit_count(&self, particle_id: u32) -> usize;

    /// Particle ids present in the event, ascending.
    fn particle_ids(&self) -> Vec<u32>;
}

/// HashMap-backed truth lookup, filled by a simulation or a truth matcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapTruthLookup {
    hits: HashMap<usize, McHitInfo>,
    particle_counts: HashMap<u32, usize>,
}

impl MapTruthLookup {
    /// Creates an empty lookup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the truth of one hit. Re-inserting a hit replaces its record.
    pub fn insert(&mut self, hit_index: usize, info: McHitInfo) {
        if let Some(previous) = self.hits.insert(hit_index, info) {
            if let Some(count) = self.particle_counts.get_mut(&previous.particle_id) {
                *count = count.saturating_sub(1);
            }
        }
        *self.particle_counts.entry(info.particle_id).or_insert(0) += 1;
    }

    /// Number of hits with truth information.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// True if no hit has truth information.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

impl McTruthLookup for MapTruthLookup {
    fn mc_hit(&self, hit_index: usize) -> Option<McHitInfo> {
        self.hits.get(&hit_index).copied()
    }

    fn particle_hit_count(&self, particle_id: u32) -> usize {
        self.particle_counts.get(&particle_id).copied().unwrap_or(0)
    }

    fn particle_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .particle_counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let mut truth = MapTruthLookup::new();
        truth.insert(3, McHitInfo { particle_id: 7, order: 0 });
        truth.insert(4, McHitInfo { particle_id: 7, order: 1 });
        truth.insert(9, McHitInfo { particle_id: 2, order: 0 });

        assert_eq!(truth.mc_hit(4).map(|i| i.order), Some(1));
        assert!(truth.mc_hit(5).is_none());
        assert_eq!(truth.particle_hit_count(7), 2);
        assert_eq!(truth.particle_ids(), vec![2, 7]);
    }

    #[test]
    fn test_reinsert_moves_count() {
        let mut truth = MapTruthLookup::new();
        truth.insert(0, McHitInfo { particle_id: 1, order: 0 });
        truth.insert(0, McHitInfo { particle_id: 2, order: 0 });

        assert_eq!(truth.len(), 1);
        assert_eq!(truth.particle_hit_count(1), 0);
        assert_eq!(truth.particle_ids(), vec![2]);
    }
}
