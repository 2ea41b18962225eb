/// Flat JSON records for calibrations
///
/// Two schemas are read:
/// - legacy: four keys in millimetres per pixel, no rotation, fixed flip
/// - current: every field plus both matrices as nested 2x2 arrays
///
/// Only the current schema is ever written.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use super::model::{generate_id, Calibration, DEFAULT_FLIP_Y};
use crate::error::{precondition, Error, Result};
use crate::geometry::{Mat2, Vec2};

/// File extension for calibration records
pub const RECORD_EXTENSION: &str = "json";

/// Current on-disk representation of a calibration.
///
/// Every key must be present; incomplete calibrations write `null`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CalibrationRecord {
    pub id: String,
    #[serde(deserialize_with = "Option::deserialize")]
    pub scale_x_pixel_per_mm: Option<f64>,
    #[serde(deserialize_with = "Option::deserialize")]
    pub scale_y_pixel_per_mm: Option<f64>,
    #[serde(deserialize_with = "Option::deserialize")]
    pub flip_y: Option<f64>,
    #[serde(deserialize_with = "Option::deserialize")]
    pub rotation_rad: Option<f64>,
    #[serde(deserialize_with = "Option::deserialize")]
    pub laser_coor_x_mm: Option<f64>,
    #[serde(deserialize_with = "Option::deserialize")]
    pub laser_coor_y_mm: Option<f64>,
    #[serde(deserialize_with = "Option::deserialize")]
    pub forward_matrix: Option<[[f64; 2]; 2]>,
    #[serde(deserialize_with = "Option::deserialize")]
    pub inverse_matrix: Option<[[f64; 2]; 2]>,
}

/// Older record format: inverse scales in mm per pixel, no rotation
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct LegacyCalibrationRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "scale_x_mmPerPixel")]
    pub scale_x_mm_per_pixel: f64,
    #[serde(rename = "scale_y_mmPerPixel")]
    pub scale_y_mm_per_pixel: f64,
    pub laser_coor_x_mm: f64,
    pub laser_coor_y_mm: f64,
}

/// A decoded record of either schema
#[derive(Debug, Clone, PartialEq)]
pub enum StoredCalibration {
    Legacy(LegacyCalibrationRecord),
    Current(CalibrationRecord),
}

impl StoredCalibration {
    /// Try the legacy schema first, then the current one.
    /// Returns `None` when the value matches neither.
    pub fn decode(value: &Value) -> Option<Self> {
        if let Ok(legacy) = LegacyCalibrationRecord::deserialize(value) {
            return Some(Self::Legacy(legacy));
        }
        CalibrationRecord::deserialize(value).ok().map(Self::Current)
    }

    pub fn into_calibration(self) -> Result<Calibration> {
        match self {
            Self::Legacy(legacy) => legacy.into_calibration(),
            Self::Current(record) => Ok(record.into_calibration()),
        }
    }
}

impl LegacyCalibrationRecord {
    pub fn into_calibration(self) -> Result<Calibration> {
        let scale_x = 1.0 / self.scale_x_mm_per_pixel;
        let scale_y = 1.0 / self.scale_y_mm_per_pixel;
        if !scale_x.is_finite() || !scale_y.is_finite() {
            return Err(Error::DegenerateGeometry(format!(
                "legacy record has zero mm-per-pixel scale ({}, {})",
                self.scale_x_mm_per_pixel, self.scale_y_mm_per_pixel
            )));
        }
        let flip_y = DEFAULT_FLIP_Y;
        let inverse = Mat2::diag(1.0 / scale_x, 1.0 / scale_y) * Mat2::diag(1.0, flip_y);
        let forward = inverse.inverse().ok_or_else(|| {
            Error::DegenerateGeometry("legacy inverse matrix is singular".into())
        })?;

        Ok(Calibration::from_parts(
            self.id.unwrap_or_else(|| generate_id("calibration")),
            Some(scale_x),
            Some(scale_y),
            Some(flip_y),
            Some(0.0),
            Some(Vec2::new(self.laser_coor_x_mm, self.laser_coor_y_mm)),
            Some(forward),
            Some(inverse),
        ))
    }
}

impl CalibrationRecord {
    pub fn into_calibration(self) -> Calibration {
        let laser = match (self.laser_coor_x_mm, self.laser_coor_y_mm) {
            (Some(x), Some(y)) => Some(Vec2::new(x, y)),
            _ => None,
        };
        Calibration::from_parts(
            self.id,
            self.scale_x_pixel_per_mm,
            self.scale_y_pixel_per_mm,
            self.flip_y,
            self.rotation_rad,
            laser,
            self.forward_matrix.map(Mat2::from_rows),
            self.inverse_matrix.map(Mat2::from_rows),
        )
    }
}

impl From<&Calibration> for CalibrationRecord {
    fn from(cal: &Calibration) -> Self {
        let laser = cal.laser_offset();
        Self {
            id: cal.id().to_string(),
            scale_x_pixel_per_mm: cal.scale_x(),
            scale_y_pixel_per_mm: cal.scale_y(),
            flip_y: cal.flip_y(),
            rotation_rad: cal.rotation_rad(),
            laser_coor_x_mm: laser.map(|l| l.x),
            laser_coor_y_mm: laser.map(|l| l.y),
            forward_matrix: cal.forward_matrix().map(|m| m.to_rows()),
            inverse_matrix: cal.inverse_matrix().map(|m| m.to_rows()),
        }
    }
}

impl Calibration {
    pub fn to_record(&self) -> CalibrationRecord {
        CalibrationRecord::from(self)
    }

    pub fn from_record(record: CalibrationRecord) -> Self {
        record.into_calibration()
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.to_record())?)
    }

    /// Decode a JSON value in either schema
    pub fn from_value(value: &Value) -> Result<Self> {
        StoredCalibration::decode(value)
            .ok_or_else(|| precondition("value matches no known calibration schema"))?
            .into_calibration()
    }

    /// Write this calibration to `path`, creating missing directories.
    ///
    /// Fails if the calibration is incomplete or the file already exists.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        if !self.is_complete(false) {
            return Err(precondition(format!(
                "cannot save incomplete calibration '{}'",
                self.id()
            )));
        }
        check_extension(path)?;
        if path.exists() {
            return Err(Error::AlreadyExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(&self.to_record())?;
        // create_new closes the gap between the exists() check and the write
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => Error::AlreadyExists(path.to_path_buf()),
                _ => Error::Io(e),
            })?;
        file.write_all(json.as_bytes())?;

        log::info!("💾 Saved calibration '{}' to {}", self.id(), path.display());
        Ok(())
    }

    /// Read a calibration record (current or legacy) from `path`
    pub fn load_json(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        check_extension(path)?;

        let text = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let stored = StoredCalibration::decode(&value).ok_or_else(|| Error::UnrecognizedRecord {
            path: path.to_path_buf(),
        })?;
        if let StoredCalibration::Legacy(_) = stored {
            log::debug!("{} uses the legacy calibration schema", path.display());
        }
        let mut calibration = stored.clone().into_calibration()?;

        // legacy files carry no id; name them after the file
        if let StoredCalibration::Legacy(LegacyCalibrationRecord { id: None, .. }) = stored {
            if let Some(stem) = path.file_stem() {
                calibration.set_id(stem.to_string_lossy());
            }
        }
        Ok(calibration)
    }
}

fn check_extension(path: &Path) -> Result<()> {
    let ok = path
        .extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(RECORD_EXTENSION))
        .unwrap_or(false);
    if ok {
        Ok(())
    } else {
        Err(Error::UnsupportedExtension(path.to_path_buf()))
    }
}
