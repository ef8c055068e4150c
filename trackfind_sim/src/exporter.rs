//! JSON exporter for event displays.
//!
//! Writes the hits of one event with their truth and the found tracks with
//! their truth match, in a flat layout a plotting script can read directly.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

use trackfind_core::{EventOutput, EventStats, TrackOrigin};
use trackfind_env::{McTruthLookup, WireGeometry};

use crate::generator::{GeneratedEvent, ParticleTruth};
use crate::matching::match_event;

/// A hit as drawn: wire position at z = 0 and drift circle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitRecord {
    pub index: usize,
    pub superlayer: u8,
    pub layer: u8,
    pub wire: u16,
    pub x: f64,
    pub y: f64,
    pub drift_length: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub particle: Option<u32>,
}

/// A found track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRecord {
    pub origin: TrackOrigin,
    pub curvature: f64,
    pub phi0: f64,
    pub impact: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tan_lambda: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z0: Option<f64>,
    pub chi2_per_ndf: f64,
    /// Raw hit indices in flight order
    pub hits: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub particle: Option<u32>,
    pub purity: f64,
}

/// Complete event export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    pub hits: Vec<HitRecord>,
    pub particles: Vec<ParticleTruth>,
    pub tracks: Vec<TrackRecord>,
    pub stats: EventStats,
}

impl EventExport {
    /// Collects hits, truth and tracks of one processed event.
    pub fn new(
        scenario: &str,
        seed: u64,
        event: &GeneratedEvent,
        output: &EventOutput,
        geometry: &dyn WireGeometry,
    ) -> Self {
        let hits = event
            .hits
            .iter()
            .enumerate()
            .map(|(index, hit)| {
                let position = geometry
                    .wire_line(hit.wire)
                    .map(|line| line.position_at(0.0))
                    .unwrap_or_else(Vector2::zeros);
                HitRecord {
                    index,
                    superlayer: hit.wire.superlayer,
                    layer: hit.wire.layer,
                    wire: hit.wire.wire,
                    x: position.x,
                    y: position.y,
                    drift_length: hit.drift_length,
                    particle: event.truth.mc_hit(index).map(|info| info.particle_id),
                }
            })
            .collect();

        let (_, matches) = match_event(output, &event.truth);
        let tracks = output
            .tracks
            .iter()
            .zip(matches)
            .map(|(track, m)| TrackRecord {
                origin: track.origin,
                curvature: track.trajectory.curvature,
                phi0: track.trajectory.phi0,
                impact: track.trajectory.impact,
                tan_lambda: track.sz.map(|sz| sz.tan_lambda),
                z0: track.sz.map(|sz| sz.z0),
                chi2_per_ndf: track.chi2_per_ndf(),
                hits: output.hits.raw_indices(&track.hits),
                particle: m.particle,
                purity: m.purity,
            })
            .collect();

        Self {
            scenario: scenario.to_string(),
            seed,
            hits,
            particles: event.particles.clone(),
            tracks,
            stats: output.stats.clone(),
        }
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
