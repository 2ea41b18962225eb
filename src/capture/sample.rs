/// Captured frames and their parallel-array record form

use image::RgbImage;

use crate::error::{precondition, Result};
use crate::geometry::Vec2;

/// One observation: where the stage was and what the camera saw
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSample {
    pub timestamp: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub image: RgbImage,
}

impl FrameSample {
    /// Validate and build a sample
    pub fn new(timestamp: impl Into<String>, x: f64, y: f64, z: f64, image: RgbImage) -> Result<Self> {
        let timestamp = timestamp.into();
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return Err(precondition(format!(
                "sample coordinates must be finite, got ({x}, {y}, {z})"
            )));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(precondition(format!(
                "sample image at {timestamp} is empty ({}x{})",
                image.width(),
                image.height()
            )));
        }
        Ok(Self {
            timestamp,
            x,
            y,
            z,
            image,
        })
    }

    /// Stage x/y of the frame
    pub fn stage_xy(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Column-wise view of a sample list, as the persistence layer stores it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleRecord {
    pub timestamp: Vec<String>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub image: Vec<RgbImage>,
}

impl SampleRecord {
    pub fn len(&self) -> usize {
        self.timestamp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamp.is_empty()
    }

    /// Split rows back into samples; every column must have the same length
    pub fn into_samples(self) -> Result<Vec<FrameSample>> {
        let n = self.timestamp.len();
        let lengths = [self.x.len(), self.y.len(), self.z.len(), self.image.len()];
        if lengths.iter().any(|&len| len != n) {
            return Err(precondition(format!(
                "sample record columns differ in length: timestamp={n}, x/y/z/image={lengths:?}"
            )));
        }

        self.timestamp
            .into_iter()
            .zip(self.x)
            .zip(self.y)
            .zip(self.z)
            .zip(self.image)
            .map(|((((t, x), y), z), image)| FrameSample::new(t, x, y, z, image))
            .collect()
    }
}

impl<'a> FromIterator<&'a FrameSample> for SampleRecord {
    fn from_iter<I: IntoIterator<Item = &'a FrameSample>>(iter: I) -> Self {
        let mut record = SampleRecord::default();
        for s in iter {
            record.timestamp.push(s.timestamp.clone());
            record.x.push(s.x);
            record.y.push(s.y);
            record.z.push(s.z);
            record.image.push(s.image.clone());
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_samples() {
        assert!(FrameSample::new("t", f64::NAN, 0.0, 0.0, RgbImage::new(2, 2)).is_err());
        assert!(FrameSample::new("t", 0.0, 0.0, 0.0, RgbImage::new(0, 2)).is_err());
        assert!(FrameSample::new("t", 1.0, 2.0, 3.0, RgbImage::new(2, 2)).is_ok());
    }

    #[test]
    fn test_record_columns_must_match() {
        let record = SampleRecord {
            timestamp: vec!["a".into(), "b".into()],
            x: vec![0.0, 1.0],
            y: vec![0.0],
            z: vec![0.0, 0.0],
            image: vec![RgbImage::new(1, 1), RgbImage::new(1, 1)],
        };
        assert!(record.into_samples().is_err());
    }

    #[test]
    fn test_record_from_samples() {
        let samples = vec![
            FrameSample::new("a", 1.0, 2.0, 3.0, RgbImage::new(4, 3)).unwrap(),
            FrameSample::new("b", 4.0, 5.0, 6.0, RgbImage::new(4, 3)).unwrap(),
        ];
        let record: SampleRecord = samples.iter().collect();
        assert_eq!(record.len(), 2);
        assert_eq!(record.x, vec![1.0, 4.0]);
        assert_eq!(record.into_samples().unwrap(), samples);
    }
}
