//! Common types shared between the detector boundary and the tracking core.

use serde::{Deserialize, Serialize};

/// Identifier of a sense wire.
///
/// `layer` counts layers inside the superlayer, so `(superlayer, layer, wire)`
/// orders wires from the inside out and around the azimuth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WireId {
    pub superlayer: u8,
    pub layer: u8,
    pub wire: u16,
}

impl WireId {
    /// Creates a wire id.
    pub fn new(superlayer: u8, layer: u8, wire: u16) -> Self {
        Self {
            superlayer,
            layer,
            wire,
        }
    }
}

impl std::fmt::Display for WireId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SL{}/L{}/W{}", self.superlayer, self.layer, self.wire)
    }
}

/// A raw drift-chamber hit as delivered by the unpacker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    /// Wire that fired
    pub wire: WireId,

    /// Calibrated drift length in cm
    pub drift_length: f64,

    /// Drift length variance in cm²
    pub drift_length_variance: f64,

    /// Charge deposit (ADC counts)
    pub adc: u16,

    /// Raw drift time (TDC counts)
    pub tdc: i32,
}

impl RawHit {
    /// Creates a hit with the default drift resolution (200 µm) and no ADC/TDC.
    pub fn new(wire: WireId, drift_length: f64) -> Self {
        Self {
            wire,
            drift_length,
            drift_length_variance: 0.02 * 0.02,
            adc: 0,
            tdc: 0,
        }
    }
}

/// Ordered collection of hits for the current event.
pub trait HitSource {
    /// The hits, in the order the unpacker produced them.
    ///
    /// Positions in this slice are the indices used by [`crate::McTruthLookup`].
    fn raw_hits(&self) -> &[RawHit];
}

impl HitSource for Vec<RawHit> {
    fn raw_hits(&self) -> &[RawHit] {
        self
    }
}

impl HitSource for [RawHit] {
    fn raw_hits(&self) -> &[RawHit] {
        self
    }
}
