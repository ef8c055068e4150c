//! Hough transform pattern recognition over a quad tree.
//!
//! Every hit maps to a curve in a two dimensional track parameter space.
//! Axial hits become sinusoids in (phi0, curvature) for tracks from the
//! origin; stereo hits become lines in (tan lambda, z0) once the xy
//! trajectory is known. The [`QuadTreeSearch`] bisects the space and keeps
//! the boxes crossed by enough curves.

mod finder;
mod tree;

pub use finder::{HoughConfig, HoughTrackFinder};
pub use tree::{HoughOutcome, QuadTreeConfig, QuadTreeSearch, Seed};

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use crate::hits::{HitId, WireHit};

// ============================================================================
// BOXES
// ============================================================================

/// Closed rectangle `[x.0, x.1] × [y.0, y.1]` of the parameter space.
///
/// For the axial search `x` is phi0 and `y` the curvature. Phi bounds are
/// not wrapped; a box may extend past ±π.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoughBox {
    pub x: (f64, f64),
    pub y: (f64, f64),
}

impl HoughBox {
    pub fn new(x: (f64, f64), y: (f64, f64)) -> Self {
        Self { x, y }
    }

    pub fn width(&self) -> f64 {
        self.x.1 - self.x.0
    }

    pub fn height(&self) -> f64 {
        self.y.1 - self.y.0
    }

    pub fn center(&self) -> (f64, f64) {
        (0.5 * (self.x.0 + self.x.1), 0.5 * (self.y.0 + self.y.1))
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.x.0 <= x && x <= self.x.1 && self.y.0 <= y && y <= self.y.1
    }

    /// Box grown by `overlap` times its size, half on each side.
    pub fn expanded(&self, overlap: f64) -> Self {
        let dx = 0.5 * overlap * self.width();
        let dy = 0.5 * overlap * self.height();
        Self::new((self.x.0 - dx, self.x.1 + dx), (self.y.0 - dy, self.y.1 + dy))
    }

    /// The four quadrants: low/low, high/low, low/high, high/high in (x, y).
    pub fn split(&self) -> [HoughBox; 4] {
        let (cx, cy) = self.center();
        [
            Self::new((self.x.0, cx), (self.y.0, cy)),
            Self::new((cx, self.x.1), (self.y.0, cy)),
            Self::new((self.x.0, cx), (cy, self.y.1)),
            Self::new((cx, self.x.1), (cy, self.y.1)),
        ]
    }
}

// ============================================================================
// CURVES
// ============================================================================

/// A hit's constraint in parameter space.
pub trait HoughCurve {
    /// True if the curve passes through the closed box.
    fn crosses(&self, bounds: &HoughBox) -> bool;
}

/// Curvature of the circles from the origin that touch a drift circle,
/// as a function of the start direction phi:
///
/// `ω(φ) = (2r·sin(θ − φ) + 2σd) / (r² − d²)`
///
/// with wire position `(r, θ)`, drift length `d` and side `σ = ±1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinusoidCurve {
    amplitude: f64,
    offset: f64,
    theta: f64,
}

impl SinusoidCurve {
    pub fn new(radius: f64, theta: f64, drift_length: f64, side: f64) -> Self {
        let denominator = radius * radius - drift_length * drift_length;
        Self {
            amplitude: 2.0 * radius / denominator,
            offset: 2.0 * side * drift_length / denominator,
            theta,
        }
    }

    /// Both sides of an axial hit's drift circle; one curve without drift.
    pub fn for_hit(hit: &WireHit) -> Vec<Self> {
        let radius = hit.ref_position.norm();
        let theta = hit.ref_position.y.atan2(hit.ref_position.x);
        if hit.drift_length == 0.0 {
            vec![Self::new(radius, theta, 0.0, 1.0)]
        } else {
            vec![
                Self::new(radius, theta, hit.drift_length, 1.0),
                Self::new(radius, theta, hit.drift_length, -1.0),
            ]
        }
    }

    pub fn curvature_at(&self, phi: f64) -> f64 {
        self.amplitude * (self.theta - phi).sin() + self.offset
    }

    /// Phi in `[lo, lo + 2π)` where the sinusoid reaches the extremum
    /// `fraction` of a period after `theta` backwards: 0.25 is the maximum,
    /// 0.75 the minimum.
    fn extremum_after(&self, lo: f64, fraction: f64) -> f64 {
        let extremum = self.theta - fraction * TAU;
        lo + (extremum - lo).rem_euclid(TAU)
    }
}

impl HoughCurve for SinusoidCurve {
    fn crosses(&self, bounds: &HoughBox) -> bool {
        let (lo, hi) = bounds.y;
        let first = self.curvature_at(bounds.x.0);
        let last = self.curvature_at(bounds.x.1);

        let first_below = first < lo;
        let last_below = last < lo;
        let first_above = first > hi;
        let last_above = last > hi;

        if first_below && last_below {
            // Only the maximum can reach into the box
            let phi = self.extremum_after(bounds.x.0, 0.25);
            phi <= bounds.x.1 && self.amplitude + self.offset >= lo
        } else if first_above && last_above {
            let phi = self.extremum_after(bounds.x.0, 0.75);
            phi <= bounds.x.1 && self.offset - self.amplitude <= hi
        } else {
            // One end inside, or the ends on opposite sides
            true
        }
    }
}

/// The z0 of sz lines through a stereo position: `z0 = z − tanλ·s`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearCurve {
    pub s: f64,
    pub z: f64,
}

impl LinearCurve {
    pub fn new(s: f64, z: f64) -> Self {
        Self { s, z }
    }

    pub fn z0_at(&self, tan_lambda: f64) -> f64 {
        self.z - tan_lambda * self.s
    }
}

impl HoughCurve for LinearCurve {
    fn crosses(&self, bounds: &HoughBox) -> bool {
        let a = self.z0_at(bounds.x.0);
        let b = self.z0_at(bounds.x.1);
        a.min(b) <= bounds.y.1 && a.max(b) >= bounds.y.0
    }
}

// ============================================================================
// ITEMS
// ============================================================================

/// Something voting in the quad tree.
pub trait HoughItem {
    fn in_box(&self, bounds: &HoughBox) -> bool;

    /// Support the item adds to a box.
    fn weight(&self) -> usize {
        1
    }

    /// Hits the item stands for.
    fn hits(&self) -> Vec<HitId>;
}

/// A single hit with the curves of its drift ambiguities.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveItem<C> {
    pub hit: HitId,
    pub curves: Vec<C>,
}

impl<C> CurveItem<C> {
    pub fn new(hit: HitId, curves: Vec<C>) -> Self {
        Self { hit, curves }
    }
}

impl<C: HoughCurve> HoughItem for CurveItem<C> {
    fn in_box(&self, bounds: &HoughBox) -> bool {
        self.curves.iter().any(|c| c.crosses(bounds))
    }

    fn hits(&self) -> Vec<HitId> {
        vec![self.hit]
    }
}

/// An axial segment; inside a box when enough of its hits are.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentItem {
    pub hits: Vec<CurveItem<SinusoidCurve>>,
    pub ratio: f64,
}

impl SegmentItem {
    pub fn new(hits: Vec<CurveItem<SinusoidCurve>>, ratio: f64) -> Self {
        Self { hits, ratio }
    }
}

impl HoughItem for SegmentItem {
    fn in_box(&self, bounds: &HoughBox) -> bool {
        if self.hits.is_empty() {
            return false;
        }
        let inside = self.hits.iter().filter(|h| h.in_box(bounds)).count();
        inside as f64 > self.ratio * self.hits.len() as f64
    }

    fn weight(&self) -> usize {
        self.hits.len()
    }

    fn hits(&self) -> Vec<HitId> {
        self.hits.iter().map(|h| h.hit).collect()
    }
}
