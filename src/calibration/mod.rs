/// Objective calibration module
///
/// This module handles:
/// - The affine mapping between stage millimetres and camera pixels (model.rs)
/// - Estimating that mapping from tracked feature positions (model.rs)
/// - JSON records, including the legacy schema (record.rs)
/// - A folder-backed registry of calibrations (registry.rs)

pub mod model;
pub mod record;
pub mod registry;

pub use model::{Calibration, STAGE_CAMERA_MIRROR};
pub use record::{CalibrationRecord, LegacyCalibrationRecord, StoredCalibration};
pub use registry::CalibrationRegistry;
