/// Background stitching
///
/// Stitching many full-size frames is CPU-bound, so it runs on the tokio
/// blocking pool as one unit of work: it returns the whole mosaic or an error.

use tokio::task;

use super::stitch::Mosaic;
use super::unit::CaptureUnit;
use crate::error::{Error, Result};

/// Stitch `unit` off the calling thread
pub async fn stitch_in_background(unit: CaptureUnit, low_res: bool) -> Result<Mosaic> {
    // Spawn blocking because stitching is CPU-intensive
    task::spawn_blocking(move || unit.stitch_all(low_res))
        .await
        .map_err(|e| Error::Worker(format!("Task join error: {}", e)))?
}
