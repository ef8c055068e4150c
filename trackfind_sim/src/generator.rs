//! Deterministic event generator.
//!
//! Produces drift-chamber hits of helices from the interaction point plus
//! random background, together with the truth the scenarios are judged by.
//! All randomness comes from a single seeded `ChaCha8Rng`.

use nalgebra::Vector2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::PI;
use tracing::debug;

use trackfind_core::{SzTrajectory, Trajectory2D};
use trackfind_env::{MapTruthLookup, McHitInfo, McTruthLookup, RawHit, WireGeometry, WireId};

/// Configuration for the EventGenerator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Range of |curvature| (1/cm); the sign is random
    pub curvature_range: (f64, f64),

    pub tan_lambda_range: (f64, f64),

    /// Spread of the production point along z (cm)
    pub z0_sigma: f64,

    /// Spread of the transverse impact parameter (cm)
    pub impact_sigma: f64,

    /// Probability that a crossed cell fires
    pub hit_efficiency: f64,

    /// Smear drift lengths with the geometry's resolution
    pub smear_drift: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            curvature_range: (0.002, 0.012),
            tan_lambda_range: (-0.8, 0.8),
            z0_sigma: 1.0,
            impact_sigma: 0.05,
            hit_efficiency: 0.97,
            smear_drift: true,
        }
    }
}

/// A simulated particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleTruth {
    pub id: u32,
    pub trajectory: Trajectory2D,
    pub sz: SzTrajectory,
    /// Hits the particle left
    pub hit_count: usize,
}

/// Hits and truth of one generated event.
#[derive(Debug, Clone, Default)]
pub struct GeneratedEvent {
    pub hits: Vec<RawHit>,
    pub truth: MapTruthLookup,
    pub particles: Vec<ParticleTruth>,
    /// Raw index of the hit on each fired wire
    occupied: HashMap<WireId, usize>,
}

impl GeneratedEvent {
    /// Number of hits without a particle.
    pub fn background_count(&self) -> usize {
        let signal: usize = self.particles.iter().map(|p| p.hit_count).sum();
        self.hits.len().saturating_sub(signal)
    }
}

/// Seeded generator of drift-chamber events.
pub struct EventGenerator {
    seed: u64,
    rng: ChaCha8Rng,
    config: GeneratorConfig,
    next_particle: u32,
}

impl EventGenerator {
    pub fn new(seed: u64, config: GeneratorConfig) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            config,
            next_particle: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// An event with `particles` random helices and `background` noise hits.
    pub fn generate(&mut self, geometry: &dyn WireGeometry, particles: usize, background: usize) -> GeneratedEvent {
        let mut event = GeneratedEvent::default();
        for _ in 0..particles {
            let (trajectory, sz) = self.random_helix();
            self.add_particle(&mut event, geometry, trajectory, sz);
        }
        self.add_background(&mut event, geometry, background);
        debug!(
            "Generated event: {} particles, {} hits ({} background)",
            event.particles.len(),
            event.hits.len(),
            event.background_count()
        );
        event
    }

    /// A particle crossing the whole chamber: two legs leaving the origin in
    /// opposite directions, recorded as two particles.
    pub fn back_to_back(&mut self, geometry: &dyn WireGeometry, background: usize) -> GeneratedEvent {
        let mut event = GeneratedEvent::default();
        let (trajectory, sz) = self.random_helix();
        self.add_particle(&mut event, geometry, trajectory, sz);
        let opposite = SzTrajectory::new(-sz.tan_lambda, sz.z0);
        self.add_particle(&mut event, geometry, trajectory.reversed(), opposite);
        self.add_background(&mut event, geometry, background);
        event
    }

    /// Random helix parameters within the configured ranges.
    pub fn random_helix(&mut self) -> (Trajectory2D, SzTrajectory) {
        let (lo, hi) = self.config.curvature_range;
        let magnitude = if hi > lo { self.rng.gen_range(lo..hi) } else { lo };
        let curvature = if self.rng.gen_bool(0.5) { magnitude } else { -magnitude };
        let phi0 = self.rng.gen_range(-PI..PI);
        let impact = self.gaussian(self.config.impact_sigma);

        let (lo, hi) = self.config.tan_lambda_range;
        let tan_lambda = if hi > lo { self.rng.gen_range(lo..hi) } else { lo };
        let z0 = self.gaussian(self.config.z0_sigma);

        (Trajectory2D::new(curvature, phi0, impact), SzTrajectory::new(tan_lambda, z0))
    }

    /// Adds the hits of one helix, layer by layer, until it curls back or
    /// leaves the chamber through an endplate.
    pub fn add_particle(
        &mut self,
        event: &mut GeneratedEvent,
        geometry: &dyn WireGeometry,
        trajectory: Trajectory2D,
        sz: SzTrajectory,
    ) -> u32 {
        let id = self.next_particle;
        self.next_particle += 1;
        let mut order = 0u32;

        'layers: for superlayer in 0..geometry.superlayer_count() {
            for layer in 0..geometry.layer_count(superlayer) {
                let radius = geometry.layer_radius(superlayer, layer);
                let Some(s) = crossing_arc_length(&trajectory, radius) else {
                    break 'layers;
                };
                let z = sz.z_at(s);
                let point = trajectory.point_at(s);
                let Some((wire, position)) = nearest_wire(geometry, superlayer, layer, &point, z) else {
                    break 'layers;
                };
                if !self.rng.gen_bool(self.config.hit_efficiency.clamp(0.0, 1.0)) {
                    continue;
                }

                let mut drift = trajectory.distance(&position).abs();
                let resolution = geometry.drift_resolution();
                if self.config.smear_drift {
                    drift = (drift + self.gaussian(resolution)).abs();
                }
                let mut hit = RawHit::new(wire, drift);
                hit.drift_length_variance = resolution * resolution;

                let info = McHitInfo {
                    particle_id: id,
                    order,
                };
                if self.place_hit(event, hit, Some(info)) {
                    order += 1;
                }
            }
        }

        event.particles.push(ParticleTruth {
            id,
            trajectory,
            sz,
            hit_count: order as usize,
        });
        id
    }

    /// Adds hits on random free wires with random drift lengths.
    pub fn add_background(&mut self, event: &mut GeneratedEvent, geometry: &dyn WireGeometry, count: usize) {
        let superlayers = geometry.superlayer_count();
        if superlayers == 0 {
            return;
        }
        for _ in 0..count {
            let superlayer = self.rng.gen_range(0..superlayers);
            let layers = geometry.layer_count(superlayer).max(1);
            let layer = self.rng.gen_range(0..layers);
            let wires = geometry.wire_count(superlayer).max(1);
            let wire = WireId::new(superlayer, layer, self.rng.gen_range(0..wires));
            let drift = self.rng.gen_range(0.0..0.5 * geometry.cell_width(superlayer));
            self.place_hit(event, RawHit::new(wire, drift), None);
        }
    }

    /// One hit per wire: the shorter drift length wins.
    fn place_hit(&mut self, event: &mut GeneratedEvent, hit: RawHit, info: Option<McHitInfo>) -> bool {
        match event.occupied.get(&hit.wire) {
            Some(&index) => {
                if info.is_none() || hit.drift_length >= event.hits[index].drift_length {
                    return false;
                }
                // The signal hit replaces whatever fired the wire before
                if let Some(previous) = event.truth.mc_hit(index) {
                    if let Some(particle) = event.particles.iter_mut().find(|p| p.id == previous.particle_id) {
                        particle.hit_count = particle.hit_count.saturating_sub(1);
                    }
                }
                event.hits[index] = hit;
                if let Some(info) = info {
                    event.truth.insert(index, info);
                }
                true
            }
            None => {
                let index = event.hits.len();
                event.hits.push(hit);
                event.occupied.insert(hit.wire, index);
                if let Some(info) = info {
                    event.truth.insert(index, info);
                }
                true
            }
        }
    }

    fn gaussian(&mut self, sigma: f64) -> f64 {
        if sigma <= 0.0 {
            return 0.0;
        }
        let unit: f64 = self.rng.sample(StandardNormal);
        unit * sigma
    }
}

/// Arc length at which the trajectory first reaches `radius`, `None` if it
/// curls back before.
pub fn crossing_arc_length(trajectory: &Trajectory2D, radius: f64) -> Option<f64> {
    // Circle through the perigee: chord length c gives s = 2/ω·asin(ωc/2)
    let d = trajectory.impact;
    let chord_sq = radius * radius - d * d;
    if chord_sq < 0.0 {
        return None;
    }
    let chord = chord_sq.sqrt() / (1.0 + trajectory.curvature * d).abs().sqrt().max(f64::MIN_POSITIVE);
    let omega = trajectory.curvature;
    if omega.abs() < 1e-12 {
        return Some(chord);
    }
    let x = 0.5 * omega * chord;
    if x.abs() > 1.0 {
        return None;
    }
    Some(2.0 * x.asin() / omega)
}

/// Wire of the layer closest to `point` at height `z`, `None` if `z` lies
/// outside the wires.
pub fn nearest_wire(
    geometry: &dyn WireGeometry,
    superlayer: u8,
    layer: u8,
    point: &Vector2<f64>,
    z: f64,
) -> Option<(WireId, Vector2<f64>)> {
    (0..geometry.wire_count(superlayer))
        .map(|w| WireId::new(superlayer, layer, w))
        .filter_map(|id| {
            let line = geometry.wire_line(id)?;
            line.contains_z(z).then(|| (id, line.position_at(z)))
        })
        .min_by(|a, b| (a.1 - point).norm().total_cmp(&(b.1 - point).norm()))
}
