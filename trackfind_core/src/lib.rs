//! trackfind Core - Track Finding for Cylindrical Drift Chambers
//!
//! Two complementary pattern recognition strategies over the wire hits of
//! one event:
//! 1. **Cellular automaton**: hits → segments → segment triples, with the
//!    longest weighted paths extracted from each relation graph
//! 2. **Hough quad tree**: greedy refinement of (phi0, curvature) boxes over
//!    the hits the automaton left, with stereo hits found in (tanλ, z0)
//!
//! Candidates at every stage are graded by filters selected by name from a
//! [`FilterRegistry`]; finished tracks go through a quality assertion that
//! migrates hits, splits back-to-back tracks and merges fragments.

pub mod automaton;
pub mod cluster;
pub mod config;
pub mod error;
pub mod filter;
pub mod fit;
pub mod hits;
pub mod hough;
pub mod metrics;
pub mod pipeline;
pub mod quality;
pub mod relation;
pub mod segment;
pub mod track;
pub mod triple;

// Re-export key types for convenience
pub use config::{FilterSelection, TrackFinderConfig};
pub use error::{ConfigError, TrackingError};
pub use filter::{FilterConfig, FilterRegistry};
pub use fit::{SzTrajectory, Trajectory2D};
pub use hits::{HitId, HitStore};
pub use metrics::{EventStats, PipelineMetrics};
pub use pipeline::{EventOutput, TrackCollector, TrackFinder};
pub use track::{Track, TrackOrigin};
