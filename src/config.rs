/// Application settings and the process-wide low-resolution ratio
///
/// Settings are stored as JSON. Missing fields fall back to defaults so an
/// older settings file keeps working after new fields are added.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{precondition, Error, Result};

/// Thumbnail ratio used when nothing has been configured
pub const DEFAULT_LOW_RESOLUTION_SCALE: f64 = 0.25;

static LOW_RESOLUTION_SCALE: OnceLock<f64> = OnceLock::new();

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Folder holding one `.json` record per objective calibration
    pub calibration_dir: PathBuf,
    /// Downscale ratio for thumbnails, in (0, 1)
    pub low_resolution_scale: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            calibration_dir: default_calibration_dir(),
            low_resolution_scale: DEFAULT_LOW_RESOLUTION_SCALE,
        }
    }
}

impl Settings {
    /// Read settings from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&text).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        check_low_resolution_scale(self.low_resolution_scale)
    }

    /// Install this configuration's low-resolution ratio process-wide
    pub fn apply(&self) -> Result<()> {
        init_low_resolution_scale(self.low_resolution_scale)
    }
}

/// Default calibration folder inside the user's data directory:
/// - Linux: ~/.local/share/stagemap/calibrations
/// - macOS: ~/Library/Application Support/stagemap/calibrations
/// - Windows: %APPDATA%\stagemap\calibrations
fn default_calibration_dir() -> PathBuf {
    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    path.push("stagemap");
    path.push("calibrations");
    path
}

fn check_low_resolution_scale(scale: f64) -> Result<()> {
    if scale.is_finite() && scale > 0.0 && scale < 1.0 {
        Ok(())
    } else {
        Err(precondition(format!(
            "low resolution scale must lie in (0, 1), got {scale}"
        )))
    }
}

/// Configure the low-resolution ratio once for the whole process.
///
/// Setting the same value again is accepted; changing it is not, since
/// thumbnails already generated would no longer match the ratio.
pub fn init_low_resolution_scale(scale: f64) -> Result<()> {
    check_low_resolution_scale(scale)?;
    let current = *LOW_RESOLUTION_SCALE.get_or_init(|| scale);
    if current == scale {
        log::debug!("low resolution scale set to {scale}");
        Ok(())
    } else {
        Err(precondition(format!(
            "low resolution scale already configured as {current}"
        )))
    }
}

/// Current low-resolution ratio (default until configured)
pub fn low_resolution_scale() -> f64 {
    LOW_RESOLUTION_SCALE
        .get()
        .copied()
        .unwrap_or(DEFAULT_LOW_RESOLUTION_SCALE)
}
