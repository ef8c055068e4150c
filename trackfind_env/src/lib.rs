//! trackfind Environment Layer
//!
//! Everything the tracking core consumes from the outside world lives here:
//!
//! - **Hit Source**: raw drift-chamber hits for the current event
//! - **Geometry Provider**: read-only wire positions, loaded once per run
//! - **MC Truth Lookup**: optional hit → simulated particle mapping
//!
//! The core never owns these; it borrows them for the duration of an event.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use trackfind_env::{CylindricalGeometry, RawHit, WireId};
//!
//! let geometry = Arc::new(CylindricalGeometry::default());
//! let hits = vec![RawHit::new(WireId::new(0, 0, 12), 0.21)];
//! ```

mod error;
mod geometry;
mod truth;
mod types;

pub use error::EnvError;
pub use geometry::{CylindricalGeometry, GeometryConfig, StereoKind, WireGeometry, WireLine};
pub use truth::{MapTruthLookup, McHitInfo, McTruthLookup};
pub use types::{HitSource, RawHit, WireId};
