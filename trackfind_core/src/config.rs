//! Pipeline configuration.
//!
//! Every section falls back to its defaults, so a configuration file only
//! needs the values it changes:
//!
//! ```json
//! {
//!   "hough": { "min_track_hits": 10 },
//!   "filters": { "tracks": { "name": "truth", "params": { "min_purity": 0.8 } } }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cluster::ClusterConfig;
use crate::error::ConfigError;
use crate::filter::FilterConfig;
use crate::fit::CircleFitter;
use crate::hough::HoughConfig;
use crate::quality::QualityConfig;
use crate::segment::SegmentFinderConfig;
use crate::triple::TripleConfig;

/// Filters selected for each pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSelection {
    pub hit_pairs: FilterConfig,
    pub segment_pairs: FilterConfig,
    pub triples: FilterConfig,
    pub triple_relations: FilterConfig,
    pub tracks: FilterConfig,
}

impl Default for FilterSelection {
    fn default() -> Self {
        Self {
            hit_pairs: FilterConfig::named("simple"),
            segment_pairs: FilterConfig::named("simple"),
            triples: FilterConfig::named("simple"),
            triple_relations: FilterConfig::named("simple"),
            tracks: FilterConfig::named("simple"),
        }
    }
}

/// Configuration for the TrackFinder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackFinderConfig {
    pub cluster: ClusterConfig,
    pub segments: SegmentFinderConfig,
    pub triples: TripleConfig,
    pub hough: HoughConfig,
    pub quality: QualityConfig,
    pub fit: CircleFitter,
    pub filters: FilterSelection,

    /// Build tracks from segment triple paths
    pub use_automaton: bool,

    /// Search the hits left by the automaton with the quad tree
    pub use_hough: bool,
}

impl Default for TrackFinderConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            segments: SegmentFinderConfig::default(),
            triples: TripleConfig::default(),
            hough: HoughConfig::default(),
            quality: QualityConfig::default(),
            fit: CircleFitter::default(),
            filters: FilterSelection::default(),
            use_automaton: true,
            use_hough: true,
        }
    }
}

impl TrackFinderConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks values serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segments.automaton.max_iterations == 0 || self.triples.automaton.max_iterations == 0 {
            return Err(ConfigError::Invalid("automaton max_iterations must be at least 1".into()));
        }
        for (name, range) in [
            ("phi_range", self.hough.phi_range),
            ("curvature_range", self.hough.curvature_range),
            ("tan_lambda_range", self.hough.tan_lambda_range),
            ("z0_range", self.hough.z0_range),
        ] {
            if !(range.0 < range.1) {
                return Err(ConfigError::Invalid(format!(
                    "hough {} must be ascending, got ({}, {})",
                    name, range.0, range.1
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.hough.segment_hit_ratio) {
            return Err(ConfigError::Invalid(format!(
                "hough segment_hit_ratio must lie in [0, 1], got {}",
                self.hough.segment_hit_ratio
            )));
        }
        if self.quality.drop_distance < 0.0 || self.quality.add_distance < 0.0 {
            return Err(ConfigError::Invalid("quality distances must not be negative".into()));
        }
        Ok(())
    }
}
