//! Truth matching of found tracks.
//!
//! A track matches the particle holding the majority of its hits if that
//! majority reaches the purity threshold. A particle counts as found when
//! at least one track matches it; further matching tracks are clones.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use trackfind_core::EventOutput;
use trackfind_env::McTruthLookup;

/// Minimum share of a track's hits from its majority particle.
pub const MIN_MATCH_PURITY: f64 = 0.5;

/// Particles with fewer hits are not expected to be found.
pub const MIN_FINDABLE_HITS: usize = 8;

/// Truth classification of one track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackMatch {
    /// Majority particle, `None` if most hits are background
    pub particle: Option<u32>,
    /// Share of the track's hits from the majority particle
    pub purity: f64,
    pub matched: bool,
}

/// Matching counters, summed over events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub findable_particles: usize,
    pub found_particles: usize,
    pub tracks: usize,
    pub matched_tracks: usize,
    pub clone_tracks: usize,
    pub fake_tracks: usize,
    purity_sum: f64,
}

impl MatchSummary {
    pub fn accumulate(&mut self, other: &MatchSummary) {
        self.findable_particles += other.findable_particles;
        self.found_particles += other.found_particles;
        self.tracks += other.tracks;
        self.matched_tracks += other.matched_tracks;
        self.clone_tracks += other.clone_tracks;
        self.fake_tracks += other.fake_tracks;
        self.purity_sum += other.purity_sum;
    }

    /// Found over findable particles, 1 when nothing was findable.
    pub fn efficiency(&self) -> f64 {
        if self.findable_particles == 0 {
            1.0
        } else {
            self.found_particles as f64 / self.findable_particles as f64
        }
    }

    /// Mean purity of matched tracks.
    pub fn purity(&self) -> f64 {
        if self.matched_tracks == 0 {
            0.0
        } else {
            self.purity_sum / self.matched_tracks as f64
        }
    }

    pub fn fake_rate(&self) -> f64 {
        if self.tracks == 0 {
            0.0
        } else {
            self.fake_tracks as f64 / self.tracks as f64
        }
    }

    pub fn clone_rate(&self) -> f64 {
        if self.matched_tracks == 0 {
            0.0
        } else {
            self.clone_tracks as f64 / self.matched_tracks as f64
        }
    }
}

/// Classifies one track by the truth of its raw hits.
pub fn match_track(raw_indices: &[usize], truth: &dyn McTruthLookup) -> TrackMatch {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for &index in raw_indices {
        if let Some(info) = truth.mc_hit(index) {
            *counts.entry(info.particle_id).or_insert(0) += 1;
        }
    }
    // Ties go to the lower particle id
    let best = counts
        .iter()
        .fold(None, |best: Option<(u32, usize)>, (&id, &count)| match best {
            Some((_, c)) if c >= count => best,
            _ => Some((id, count)),
        });

    match best {
        Some((particle, count)) if !raw_indices.is_empty() => {
            let purity = count as f64 / raw_indices.len() as f64;
            TrackMatch {
                particle: Some(particle),
                purity,
                matched: purity >= MIN_MATCH_PURITY,
            }
        }
        _ => TrackMatch {
            particle: None,
            purity: 0.0,
            matched: false,
        },
    }
}

/// Matches all tracks of an event against the truth.
pub fn match_event(output: &EventOutput, truth: &dyn McTruthLookup) -> (MatchSummary, Vec<TrackMatch>) {
    let mut summary = MatchSummary {
        tracks: output.tracks.len(),
        ..Default::default()
    };
    let findable: BTreeSet<u32> = truth
        .particle_ids()
        .into_iter()
        .filter(|&id| truth.particle_hit_count(id) >= MIN_FINDABLE_HITS)
        .collect();
    summary.findable_particles = findable.len();

    let mut found: BTreeSet<u32> = BTreeSet::new();
    let matches: Vec<TrackMatch> = output
        .tracks
        .iter()
        .map(|track| match_track(&output.hits.raw_indices(&track.hits), truth))
        .collect();

    for m in &matches {
        match (m.matched, m.particle) {
            (true, Some(particle)) => {
                summary.matched_tracks += 1;
                summary.purity_sum += m.purity;
                if !found.insert(particle) {
                    summary.clone_tracks += 1;
                }
            }
            _ => summary.fake_tracks += 1,
        }
    }
    summary.found_particles = found.intersection(&findable).count();

    (summary, matches)
}
