//! trackfind Deterministic Simulation Harness
//!
//! Generates drift-chamber events from a single 64-bit seed, runs the
//! track finder on them and judges the result against the simulated truth.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  hits + truth   ┌──────────────┐  tracks  ┌──────────────┐
//! │EventGenerator│────────────────►│ TrackFinder  │─────────►│   Matching   │
//! │ (ChaCha8Rng) │                 │(trackfind_core)         │ (efficiency, │
//! └──────────────┘                 └──────────────┘          │ purity, fake)│
//!        ▲                                                    └──────┬───────┘
//!        │              ScenarioRunner (per scenario)                │
//!        └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use trackfind_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_events(20).run(ScenarioId::MultiTrack);
//! assert!(result.passed);
//! ```

mod exporter;
mod generator;
mod matching;
mod runner;
pub mod scenarios;

pub use exporter::{EventExport, HitRecord, TrackRecord};
pub use generator::{EventGenerator, GeneratedEvent, GeneratorConfig, ParticleTruth};
pub use matching::{match_event, match_track, MatchSummary, TrackMatch};
pub use runner::{ScenarioResult, ScenarioRunner};
