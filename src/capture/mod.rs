/// Capture units and mosaic stitching
///
/// This module handles:
/// - Frame samples and their column-wise record (sample.rs)
/// - Low-resolution thumbnails kept beside each sample (thumbnail.rs)
/// - Rotate / crop / paste primitives (raster.rs)
/// - The capture unit and its pixel <-> stage conversions (unit.rs)
/// - Mosaic synthesis (stitch.rs) and its background runner (worker.rs)
/// - The registry of units keyed by id and name (registry.rs)

pub mod raster;
pub mod registry;
pub mod sample;
pub mod stitch;
pub mod thumbnail;
pub mod unit;
pub mod worker;

pub use registry::CaptureRegistry;
pub use sample::{FrameSample, SampleRecord};
pub use stitch::Mosaic;
pub use unit::{CaptureUnit, MosaicRotation, UnitMetadata};

/// Timestamp string for a sample captured now (local time, microseconds)
pub fn timestamp_now() -> String {
    chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S%.6f")
        .to_string()
}
