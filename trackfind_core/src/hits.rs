//! Wire hits and their automaton cells.
//!
//! A [`WireHit`] is the immutable, geometry-resolved view of one raw hit.
//! Everything the algorithms mutate about a hit (taken / background / masked
//! flags and the automaton state) lives in a [`CellTable`] indexed by
//! [`HitId`], so hits can be shared freely by segments and tracks.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use trackfind_env::{HitSource, StereoKind, WireGeometry, WireId};

use crate::error::TrackingError;
use crate::fit::{SzTrajectory, Trajectory2D};

// ============================================================================
// HIT IDENTITY
// ============================================================================

/// Index of a hit inside the event's [`HitStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HitId(pub u32);

impl HitId {
    /// Position of the hit in the store.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ============================================================================
// WIRE HIT
// ============================================================================

/// A raw hit combined with the position of its wire.
#[derive(Debug, Clone, Serialize)]
pub struct WireHit {
    /// Arena id, ordered like the wire id
    pub id: HitId,

    /// Index of the originating record in the hit source
    pub raw_index: usize,

    pub wire: WireId,

    pub stereo: StereoKind,

    /// Wire position at z = 0
    pub ref_position: Vector2<f64>,

    /// Wire displacement per unit z
    pub skew: Vector2<f64>,

    /// Backward and forward z of the wire
    pub z_range: (f64, f64),

    /// Measured drift circle radius (cm)
    pub drift_length: f64,

    /// Variance of the drift length (cm²)
    pub drift_length_variance: f64,
}

impl WireHit {
    #[inline]
    pub fn superlayer(&self) -> u8 {
        self.wire.superlayer
    }

    #[inline]
    pub fn layer(&self) -> u8 {
        self.wire.layer
    }

    #[inline]
    pub fn is_axial(&self) -> bool {
        self.stereo.is_axial()
    }

    /// Wire position at the given z.
    #[inline]
    pub fn position_at(&self, z: f64) -> Vector2<f64> {
        self.ref_position + self.skew * z
    }

    /// True if z lies on the wire.
    pub fn contains_z(&self, z: f64) -> bool {
        z >= self.z_range.0 && z <= self.z_range.1
    }

    /// Distance between the reference positions of two hits.
    pub fn ref_distance(&self, other: &WireHit) -> f64 {
        (self.ref_position - other.ref_position).norm()
    }

    /// Mismatch between the trajectory and the drift circle at z = 0.
    pub fn residual(&self, trajectory: &Trajectory2D) -> f64 {
        (trajectory.distance(&self.ref_position).abs() - self.drift_length).abs()
    }

    /// Mismatch at the z the sz line predicts for this hit.
    pub fn residual_3d(&self, trajectory: &Trajectory2D, sz: &SzTrajectory) -> f64 {
        let s = trajectory.arc_length(&self.ref_position);
        let z = sz.z_at(s);
        let position = self.position_at(z);
        (trajectory.distance(&position).abs() - self.drift_length).abs()
    }

    /// Point of the drift circle that touches the trajectory.
    ///
    /// This resolves the left/right ambiguity using the side on which the
    /// trajectory passes the wire.
    pub fn touching_point(&self, trajectory: &Trajectory2D, z: f64) -> Vector2<f64> {
        let wire = self.position_at(z);
        let closest = trajectory.closest_point(&wire);
        let offset = closest - wire;
        let norm = offset.norm();
        if norm <= f64::EPSILON {
            return wire;
        }
        wire + offset * (self.drift_length / norm)
    }
}

// ============================================================================
// HIT STORE
// ============================================================================

/// Event arena of wire hits, sorted by wire id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HitStore {
    hits: Vec<WireHit>,
}

impl HitStore {
    /// Resolves every raw hit against the geometry.
    ///
    /// Hits on the same wire keep their source order.
    pub fn build(source: &dyn HitSource, geometry: &dyn WireGeometry) -> Result<Self, TrackingError> {
        let raw = source.raw_hits();
        let mut order: Vec<usize> = (0..raw.len()).collect();
        order.sort_by_key(|&i| (raw[i].wire, i));

        let mut hits = Vec::with_capacity(raw.len());
        for (position, raw_index) in order.into_iter().enumerate() {
            let record = &raw[raw_index];
            let line = geometry.wire_line(record.wire).ok_or(TrackingError::UnknownWire {
                index: raw_index,
                wire: record.wire,
            })?;
            hits.push(WireHit {
                id: HitId(position as u32),
                raw_index,
                wire: record.wire,
                stereo: geometry.stereo_kind(record.wire.superlayer),
                ref_position: line.ref_position,
                skew: line.skew,
                z_range: (line.backward_z, line.forward_z),
                drift_length: record.drift_length.abs(),
                drift_length_variance: record.drift_length_variance.max(f64::MIN_POSITIVE),
            });
        }

        Ok(Self { hits })
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Panics if the id does not belong to this store.
    #[inline]
    pub fn get(&self, id: HitId) -> &WireHit {
        &self.hits[id.index()]
    }

    pub fn hits(&self) -> &[WireHit] {
        &self.hits
    }

    pub fn iter(&self) -> impl Iterator<Item = &WireHit> {
        self.hits.iter()
    }

    /// All hits of one superlayer.
    pub fn superlayer_hits(&self, superlayer: u8) -> &[WireHit] {
        let start = self.hits.partition_point(|h| h.wire.superlayer < superlayer);
        let end = self.hits.partition_point(|h| h.wire.superlayer <= superlayer);
        &self.hits[start..end]
    }

    /// All hits of one layer.
    pub fn layer_hits(&self, superlayer: u8, layer: u8) -> &[WireHit] {
        let key = (superlayer, layer);
        let start = self
            .hits
            .partition_point(|h| (h.wire.superlayer, h.wire.layer) < key);
        let end = self
            .hits
            .partition_point(|h| (h.wire.superlayer, h.wire.layer) <= key);
        &self.hits[start..end]
    }

    /// Hits of a layer whose wire lies within `window` of `wire`, wrapping
    /// around the layer. Found by binary search on the sorted wire numbers.
    pub fn hits_near(
        &self,
        superlayer: u8,
        layer: u8,
        wire: u16,
        window: u16,
        wire_count: u16,
    ) -> Vec<HitId> {
        let layer_hits = self.layer_hits(superlayer, layer);
        let mut found = Vec::new();
        for (lo, hi) in wire_window(wire, window, wire_count) {
            let start = layer_hits.partition_point(|h| h.wire.wire < lo);
            let end = layer_hits.partition_point(|h| h.wire.wire <= hi);
            found.extend(layer_hits[start..end].iter().map(|h| h.id));
        }
        found
    }

    /// Raw source indices of a list of hits.
    pub fn raw_indices(&self, ids: &[HitId]) -> Vec<usize> {
        ids.iter().map(|&id| self.get(id).raw_index).collect()
    }
}

/// Inclusive wire ranges covering `wire ± window` on a ring of `count` wires.
fn wire_window(wire: u16, window: u16, count: u16) -> Vec<(u16, u16)> {
    if count == 0 {
        return Vec::new();
    }
    if 2 * window as u32 + 1 >= count as u32 {
        return vec![(0, count - 1)];
    }
    let lo = wire as i32 - window as i32;
    let hi = wire as i32 + window as i32;
    let n = count as i32;
    if lo < 0 {
        vec![(0, hi as u16), ((lo + n) as u16, count - 1)]
    } else if hi >= n {
        vec![(lo as u16, count - 1), (0, (hi - n) as u16)]
    } else {
        vec![(lo as u16, hi as u16)]
    }
}

// ============================================================================
// AUTOMATON CELLS
// ============================================================================

/// Mutable algorithm state attached to a hit, segment or triple.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AutomatonCell {
    /// Accumulated path value of the cellular automaton
    pub state: f64,
    taken: bool,
    background: bool,
    masked: bool,
}

impl AutomatonCell {
    pub fn is_taken(&self) -> bool {
        self.taken
    }

    pub fn is_background(&self) -> bool {
        self.background
    }

    pub fn is_masked(&self) -> bool {
        self.masked
    }

    /// Neither taken, background nor masked.
    pub fn is_available(&self) -> bool {
        !(self.taken || self.background || self.masked)
    }

    pub fn set_taken(&mut self, taken: bool) {
        self.taken = taken;
    }

    pub fn set_background(&mut self, background: bool) {
        self.background = background;
    }

    pub fn set_masked(&mut self, masked: bool) {
        self.masked = masked;
    }

    /// Claims the cell. Returns false if it was already taken.
    pub fn try_take(&mut self) -> bool {
        if self.taken {
            return false;
        }
        self.taken = true;
        true
    }
}

/// Side table of automaton cells, one per hit of the current event.
#[derive(Debug, Clone, Default)]
pub struct CellTable {
    cells: Vec<AutomatonCell>,
}

impl CellTable {
    pub fn new(len: usize) -> Self {
        Self {
            cells: vec![AutomatonCell::default(); len],
        }
    }

    /// Clears all flags and resizes for a new event.
    pub fn reset(&mut self, len: usize) {
        self.cells.clear();
        self.cells.resize(len, AutomatonCell::default());
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn get(&self, id: HitId) -> &AutomatonCell {
        &self.cells[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: HitId) -> &mut AutomatonCell {
        &mut self.cells[id.index()]
    }

    pub fn is_taken(&self, id: HitId) -> bool {
        self.get(id).is_taken()
    }

    pub fn is_available(&self, id: HitId) -> bool {
        self.get(id).is_available()
    }

    pub fn try_take(&mut self, id: HitId) -> bool {
        self.get_mut(id).try_take()
    }

    pub fn release(&mut self, id: HitId) {
        self.get_mut(id).set_taken(false);
    }

    /// Ids of all cells that are not taken.
    pub fn untaken(&self) -> impl Iterator<Item = HitId> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| !cell.is_taken())
            .map(|(i, _)| HitId(i as u32))
    }

    pub fn taken_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_taken()).count()
    }
}
