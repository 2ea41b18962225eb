use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::sample::{FrameSample, SampleRecord};
use super::stitch::{self, Mosaic};
use super::thumbnail::generate_thumbnail;
use crate::calibration::model::generate_id;
use crate::calibration::{Calibration, CalibrationRecord};
use crate::config;
use crate::error::{precondition, Result};
use crate::geometry::{Mat2, Vec2};

/// Rotation between the raw camera frame and the rotation-corrected
/// (stitched) frame, derived from the calibration's rotation alone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MosaicRotation {
    /// Stitched pixel -> raw camera pixel
    pub stitch_to_original: Mat2,
    /// Raw camera pixel -> stitched pixel
    pub original_to_stitch: Mat2,
}

impl MosaicRotation {
    pub fn from_rotation(rotation_rad: f64) -> Self {
        Self {
            stitch_to_original: Mat2::rotation(rotation_rad),
            original_to_stitch: Mat2::rotation(-rotation_rad),
        }
    }
}

/// The four fields the persistence layer stores for a unit
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UnitMetadata {
    pub id: String,
    pub name: String,
    pub calibration_id: String,
    pub calibration: CalibrationRecord,
}

/// A set of frames captured under one calibration
///
/// Thumbnails are kept parallel to the samples (one per sample). Derived
/// state (rotation matrices, metadata) is rebuilt eagerly whenever the name
/// or calibration changes, so it is never stale.
///
/// Not internally synchronized: callers sharing a unit across threads must
/// serialize access themselves (e.g. one `Mutex` per unit).
#[derive(Debug, Clone)]
pub struct CaptureUnit {
    id: String,
    name: String,
    calibration: Calibration,
    samples: Vec<FrameSample>,
    thumbnails: Vec<RgbImage>,
    rotation: Option<MosaicRotation>,
    metadata: UnitMetadata,
}

impl CaptureUnit {
    /// Create a unit with a generated id; the calibration must be complete
    pub fn new(name: impl Into<String>, calibration: Calibration) -> Result<Self> {
        if !calibration.is_complete(false) {
            return Err(precondition(format!(
                "capture unit needs a complete calibration, '{}' is not",
                calibration.id()
            )));
        }
        Ok(Self::reconstruct(generate_id("unit"), name, calibration))
    }

    /// Rebuild a stored unit; the calibration is not validated here
    pub fn reconstruct(id: impl Into<String>, name: impl Into<String>, calibration: Calibration) -> Self {
        let id = id.into();
        let name = name.into();
        let rotation = calibration.rotation_rad().map(MosaicRotation::from_rotation);
        let metadata = build_metadata(&id, &name, &calibration);
        Self {
            id,
            name,
            calibration,
            samples: Vec::new(),
            thumbnails: Vec::new(),
            rotation,
            metadata,
        }
    }

    /// Rebuild a unit from its stored metadata record.
    ///
    /// `calibration_id` must name the embedded calibration.
    pub fn from_metadata(metadata: UnitMetadata) -> Result<Self> {
        let calibration = metadata.calibration.into_calibration();
        if calibration.id() != metadata.calibration_id {
            return Err(precondition(format!(
                "unit '{}' refers to calibration '{}' but stores '{}'",
                metadata.name,
                metadata.calibration_id,
                calibration.id()
            )));
        }
        Ok(Self::reconstruct(metadata.id, metadata.name, calibration))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.refresh_metadata();
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Swap the calibration; rotation matrices and metadata follow
    pub fn set_calibration(&mut self, calibration: Calibration) -> Result<()> {
        if !calibration.is_complete(false) {
            return Err(precondition(format!(
                "set_calibration: calibration '{}' is not complete",
                calibration.id()
            )));
        }
        self.calibration = calibration;
        self.rotation = self.calibration.rotation_rad().map(MosaicRotation::from_rotation);
        self.refresh_metadata();
        log::debug!("unit '{}' now uses calibration '{}'", self.name, self.calibration.id());
        Ok(())
    }

    pub fn metadata(&self) -> &UnitMetadata {
        &self.metadata
    }

    /// Rebuild the metadata record from the current name and calibration
    pub fn refresh_metadata(&mut self) -> &UnitMetadata {
        self.metadata = build_metadata(&self.id, &self.name, &self.calibration);
        &self.metadata
    }

    pub fn samples(&self) -> &[FrameSample] {
        &self.samples
    }

    pub fn thumbnails(&self) -> &[RgbImage] {
        &self.thumbnails
    }

    pub fn rotation(&self) -> Option<MosaicRotation> {
        self.rotation
    }

    /// Append one frame and its thumbnail
    pub fn add_sample(
        &mut self,
        timestamp: impl Into<String>,
        x: f64,
        y: f64,
        z: f64,
        image: RgbImage,
    ) -> Result<()> {
        let sample = FrameSample::new(timestamp, x, y, z, image)?;
        let thumbnail = generate_thumbnail(&sample.image);
        self.samples.push(sample);
        self.thumbnails.push(thumbnail);
        Ok(())
    }

    /// Column-wise copy of every sample
    pub fn sample_record(&self) -> SampleRecord {
        self.samples.iter().collect()
    }

    /// Replace all samples; thumbnails are regenerated from scratch
    pub fn set_samples(&mut self, record: SampleRecord) -> Result<()> {
        let samples = record.into_samples()?;
        let thumbnails = samples.iter().map(|s| generate_thumbnail(&s.image)).collect();
        self.samples = samples;
        self.thumbnails = thumbnails;
        log::debug!("unit '{}' loaded {} samples", self.name, self.samples.len());
        Ok(())
    }

    /// Samples exist, the calibration is complete and every sample has a thumbnail
    pub fn check_ready_for_processing(&self) -> bool {
        !self.samples.is_empty()
            && self.calibration.is_complete(false)
            && self.samples.len() == self.thumbnails.len()
    }

    fn mosaic_rotation(&self) -> Result<MosaicRotation> {
        self.rotation.ok_or_else(|| {
            precondition(format!(
                "unit '{}': calibration has no rotation, cannot correct for it",
                self.name
            ))
        })
    }

    /// Stage coordinate of a pixel in a frame captured at `stage_origin`.
    ///
    /// `correct_rotation` treats `pixel` as a coordinate in the
    /// rotation-corrected (stitched) image; `low_res` as a thumbnail pixel.
    pub fn image_point_to_stage(
        &self,
        pixel: Vec2,
        stage_origin: Vec2,
        correct_rotation: bool,
        low_res: bool,
    ) -> Result<Vec2> {
        let mut p = pixel;
        if low_res {
            p = p * (1.0 / config::low_resolution_scale());
        }
        if correct_rotation {
            p = self.mosaic_rotation()?.stitch_to_original * p;
        }
        self.calibration.image_point_to_stage(p, stage_origin)
    }

    /// Pixel of `point_stage` in a frame captured at `stage_origin`
    pub fn stage_to_image_point(
        &self,
        stage_origin: Vec2,
        point_stage: Vec2,
        correct_rotation: bool,
        low_res: bool,
    ) -> Result<Vec2> {
        let mut p = self.calibration.stage_to_image_point(stage_origin, point_stage)?;
        if correct_rotation {
            p = self.mosaic_rotation()?.original_to_stitch * p;
        }
        if low_res {
            p = p * config::low_resolution_scale();
        }
        Ok(p)
    }

    pub fn stage_to_measurement(&self, stage: Vec2) -> Result<Vec2> {
        self.calibration.stage_delta_to_measurement(stage)
    }

    pub fn measurement_to_stage(&self, measurement: Vec2) -> Result<Vec2> {
        self.calibration.measurement_to_stage_delta(measurement)
    }

    /// Compose every frame into one rotation-corrected mosaic
    pub fn stitch_all(&self, low_res: bool) -> Result<Mosaic> {
        stitch::stitch(self, low_res)
    }
}

fn build_metadata(id: &str, name: &str, calibration: &Calibration) -> UnitMetadata {
    UnitMetadata {
        id: id.to_string(),
        name: name.to_string(),
        calibration_id: calibration.id().to_string(),
        calibration: calibration.to_record(),
    }
}
