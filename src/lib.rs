//! Objective calibration and mosaic stitching for stage-mapped microscopy.
//!
//! - `calibration`: the stage <-> camera affine mapping, its estimation
//!   from tracked features, and its JSON records
//! - `capture`: frames captured under one calibration and the mosaic built
//!   from them
//! - `geometry`: the 2x2 linear algebra both rely on

pub mod calibration;
pub mod capture;
pub mod config;
pub mod error;
pub mod geometry;

pub use calibration::{Calibration, CalibrationRegistry};
pub use capture::{CaptureRegistry, CaptureUnit, Mosaic};
pub use config::Settings;
pub use error::{Error, Result};
pub use geometry::{Mat2, Vec2};
