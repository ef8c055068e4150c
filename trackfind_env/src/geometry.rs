//! Wire geometry provider.
//!
//! Geometry is loaded once per run and is read-only afterwards; the tracking
//! core queries it synchronously from every event.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::EnvError;
use crate::types::WireId;

/// Orientation of the wires in a superlayer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StereoKind {
    /// Wires parallel to the beam axis
    Axial,
    /// Positive stereo angle
    StereoU,
    /// Negative stereo angle
    StereoV,
}

impl StereoKind {
    /// True for axial superlayers.
    pub fn is_axial(&self) -> bool {
        matches!(self, StereoKind::Axial)
    }
}

/// A sense wire as a straight line in 3D.
///
/// The xy position moves linearly with z: `position(z) = ref_position + skew * z`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireLine {
    /// xy position at z = 0
    pub ref_position: Vector2<f64>,

    /// xy displacement per unit z (zero for axial wires)
    pub skew: Vector2<f64>,

    /// z of the backward wire end
    pub backward_z: f64,

    /// z of the forward wire end
    pub forward_z: f64,
}

impl WireLine {
    /// xy position of the wire at the given z.
    #[inline]
    pub fn position_at(&self, z: f64) -> Vector2<f64> {
        self.ref_position + self.skew * z
    }

    /// True if z lies between the wire ends.
    #[inline]
    pub fn contains_z(&self, z: f64) -> bool {
        z >= self.backward_z && z <= self.forward_z
    }

    /// True if the wire has no stereo skew.
    pub fn is_axial(&self) -> bool {
        self.skew.norm_squared() == 0.0
    }
}

/// Read-only lookup from wire id to spatial position and resolution.
pub trait WireGeometry: Send + Sync {
    /// Number of superlayers.
    fn superlayer_count(&self) -> u8;

    /// Number of layers in a superlayer.
    fn layer_count(&self, superlayer: u8) -> u8;

    /// Number of wires in each layer of a superlayer.
    fn wire_count(&self, superlayer: u8) -> u16;

    /// Wire orientation of a superlayer.
    fn stereo_kind(&self, superlayer: u8) -> StereoKind;

    /// Radius of a layer at z = 0.
    fn layer_radius(&self, superlayer: u8, layer: u8) -> f64;

    /// Straight-line description of a wire, `None` for ids outside the detector.
    fn wire_line(&self, wire: WireId) -> Option<WireLine>;

    /// Intrinsic drift length resolution (cm).
    fn drift_resolution(&self) -> f64;

    /// Width of a drift cell at the given superlayer (cm).
    fn cell_width(&self, superlayer: u8) -> f64 {
        let radius = self.layer_radius(superlayer, 0);
        2.0 * PI * radius / self.wire_count(superlayer).max(1) as f64
    }

    /// Cyclic distance between two wire numbers of the same superlayer.
    fn wire_distance(&self, superlayer: u8, a: u16, b: u16) -> u16 {
        let n = self.wire_count(superlayer);
        let d = if a > b { a - b } else { b - a };
        d.min(n.saturating_sub(d))
    }
}

/// Parameters of a cylindrical drift chamber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Orientation of each superlayer, inside out
    pub superlayers: Vec<StereoKind>,

    /// Layers per superlayer
    pub layers_per_superlayer: u8,

    /// Wires per layer in the innermost superlayer
    pub base_wire_count: u16,

    /// Additional wires per layer for each superlayer step outwards
    pub wire_count_step: u16,

    /// Radius of the innermost layer (cm)
    pub inner_radius: f64,

    /// Radial distance between layers (cm)
    pub layer_spacing: f64,

    /// Extra radial gap between superlayers (cm)
    pub superlayer_gap: f64,

    /// Azimuthal twist between the backward and forward wire ends (rad)
    pub stereo_twist: f64,

    /// z of the backward endplate (cm)
    pub backward_z: f64,

    /// z of the forward endplate (cm)
    pub forward_z: f64,

    /// Drift length resolution (cm)
    pub drift_resolution: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        use StereoKind::*;
        Self {
            superlayers: vec![Axial, StereoU, Axial, StereoV, Axial, StereoU, Axial, StereoV, Axial],
            layers_per_superlayer: 6,
            base_wire_count: 160,
            wire_count_step: 32,
            inner_radius: 16.0,
            layer_spacing: 1.0,
            superlayer_gap: 1.0,
            stereo_twist: 0.4,
            backward_z: -70.0,
            forward_z: 120.0,
            drift_resolution: 0.02, // 200 µm
        }
    }
}

/// Cylindrical drift chamber with alternating axial and stereo superlayers.
///
/// Odd layers are staggered by half a cell. Stereo wires connect endplate
/// points rotated by ±`stereo_twist / 2` around the nominal wire azimuth.
#[derive(Debug, Clone)]
pub struct CylindricalGeometry {
    config: GeometryConfig,
}

impl CylindricalGeometry {
    /// Builds a geometry, validating its parameters.
    pub fn new(config: GeometryConfig) -> Result<Self, EnvError> {
        if config.superlayers.is_empty() {
            return Err(EnvError::invalid_geometry("no superlayers"));
        }
        if config.superlayers.len() > u8::MAX as usize {
            return Err(EnvError::invalid_geometry("too many superlayers"));
        }
        if config.layers_per_superlayer == 0 || config.base_wire_count < 3 {
            return Err(EnvError::invalid_geometry("empty superlayers"));
        }
        if config.inner_radius <= 0.0 || config.layer_spacing <= 0.0 {
            return Err(EnvError::invalid_geometry("non-positive radii"));
        }
        if config.forward_z <= config.backward_z {
            return Err(EnvError::invalid_geometry("forward endplate behind backward endplate"));
        }
        Ok(Self { config })
    }

    /// The parameters this geometry was built from.
    pub fn config(&self) -> &GeometryConfig {
        &self.config
    }

    /// Global layer index counted from the innermost layer.
    pub fn global_layer(&self, superlayer: u8, layer: u8) -> usize {
        superlayer as usize * self.config.layers_per_superlayer as usize + layer as usize
    }

    /// Nominal azimuth of a wire at z = 0.
    pub fn wire_phi(&self, wire: WireId) -> f64 {
        let n = self.wire_count(wire.superlayer) as f64;
        let stagger = if wire.layer % 2 == 1 { 0.5 } else { 0.0 };
        2.0 * PI * (wire.wire as f64 + stagger) / n
    }

    /// Wire closest in azimuth to `phi` in the given layer.
    pub fn closest_wire(&self, superlayer: u8, layer: u8, phi: f64) -> WireId {
        let n = self.wire_count(superlayer);
        let stagger = if layer % 2 == 1 { 0.5 } else { 0.0 };
        let raw = phi.rem_euclid(2.0 * PI) / (2.0 * PI) * n as f64 - stagger;
        let wire = (raw.round() as i64).rem_euclid(n as i64) as u16;
        WireId::new(superlayer, layer, wire)
    }

    fn twist(&self, superlayer: u8) -> f64 {
        match self.stereo_kind(superlayer) {
            StereoKind::Axial => 0.0,
            StereoKind::StereoU => self.config.stereo_twist,
            StereoKind::StereoV => -self.config.stereo_twist,
        }
    }
}

impl Default for CylindricalGeometry {
    fn default() -> Self {
        Self {
            config: GeometryConfig::default(),
        }
    }
}

impl WireGeometry for CylindricalGeometry {
    fn superlayer_count(&self) -> u8 {
        self.config.superlayers.len() as u8
    }

    fn layer_count(&self, superlayer: u8) -> u8 {
        if superlayer < self.superlayer_count() {
            self.config.layers_per_superlayer
        } else {
            0
        }
    }

    fn wire_count(&self, superlayer: u8) -> u16 {
        self.config.base_wire_count + self.config.wire_count_step * superlayer as u16
    }

    fn stereo_kind(&self, superlayer: u8) -> StereoKind {
        self.config
            .superlayers
            .get(superlayer as usize)
            .copied()
            .unwrap_or(StereoKind::Axial)
    }

    fn layer_radius(&self, superlayer: u8, layer: u8) -> f64 {
        let global = self.global_layer(superlayer, layer) as f64;
        self.config.inner_radius
            + global * self.config.layer_spacing
            + superlayer as f64 * self.config.superlayer_gap
    }

    fn wire_line(&self, wire: WireId) -> Option<WireLine> {
        if wire.superlayer >= self.superlayer_count()
            || wire.layer >= self.config.layers_per_superlayer
            || wire.wire >= self.wire_count(wire.superlayer)
        {
            return None;
        }

        let radius = self.layer_radius(wire.superlayer, wire.layer);
        let phi = self.wire_phi(wire);
        let half_twist = 0.5 * self.twist(wire.superlayer);
        let z_b = self.config.backward_z;
        let z_f = self.config.forward_z;

        let backward = Vector2::new((phi - half_twist).cos(), (phi - half_twist).sin()) * radius;
        let forward = Vector2::new((phi + half_twist).cos(), (phi + half_twist).sin()) * radius;

        let skew = (forward - backward) / (z_f - z_b);
        let ref_position = backward - skew * z_b;

        Some(WireLine {
            ref_position,
            skew,
            backward_z: z_b,
            forward_z: z_f,
        })
    }

    fn drift_resolution(&self) -> f64 {
        self.config.drift_resolution
    }
}
