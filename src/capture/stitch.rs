/// Mosaic synthesis
///
/// Every frame is rotated so the camera axes line up with the stage axes,
/// cropped to drop the black corners the rotation leaves behind, and pasted
/// onto one canvas at the pixel position its stage coordinate maps to.
/// Frames are pasted in recording order; later frames win where they overlap.

use image::RgbImage;

use super::raster::{self, CropRect};
use super::unit::CaptureUnit;
use crate::error::{precondition, Result};
use crate::geometry::Vec2;

/// Layout convention for placing frames on the canvas.
///
/// Frame placement is the pixel offset of the stage origin seen from the
/// frame's stage position, with both axes negated.
pub const MOSAIC_LAYOUT_SIGN: f64 = -1.0;

/// Refuse to allocate canvases beyond this many pixels
const MAX_CANVAS_PIXELS: u64 = 1 << 31;

/// A stitched image and the stage coordinates of its two corners
#[derive(Debug, Clone, PartialEq)]
pub struct Mosaic {
    pub image: RgbImage,
    /// Stage coordinate (mm) of canvas pixel (0, 0)
    pub min_mm: Vec2,
    /// Stage coordinate (mm) of canvas pixel (width, height)
    pub max_mm: Vec2,
}

impl Mosaic {
    pub fn into_parts(self) -> (RgbImage, Vec2, Vec2) {
        (self.image, self.min_mm, self.max_mm)
    }
}

/// Camera-to-stage rotation in degrees, normalized into (-180, 180]
pub fn rotation_degrees(rotation_rad: f64) -> f64 {
    let mut deg = -rotation_rad.to_degrees();
    while deg <= -180.0 {
        deg += 360.0;
    }
    while deg > 180.0 {
        deg -= 360.0;
    }
    deg
}

/// Crop rectangle that removes the black corners left after rotating a
/// `width` x `height` frame, and the pixel shift of the new frame origin.
pub fn crop_for_rotation(width: u32, height: u32, rotation_rad: f64) -> Result<(CropRect, Vec2)> {
    let sin = rotation_rad.sin().abs();
    let crop_x = (height as f64 * sin).ceil() as u32;
    let crop_y = (width as f64 * sin).ceil() as u32;
    if crop_x >= width || crop_y >= height {
        return Err(precondition(format!(
            "rotation of {:.2} deg leaves nothing of a {width}x{height} frame after cropping",
            rotation_rad.to_degrees()
        )));
    }

    let (rect, shift) = if rotation_degrees(rotation_rad) < 0.0 {
        // rotated content leaves the left and bottom edges uncovered
        (
            CropRect {
                x: crop_x,
                y: 0,
                width: width - crop_x,
                height: height - crop_y,
            },
            Vec2::new(crop_x as f64, 0.0),
        )
    } else {
        // top and right edges uncovered
        (
            CropRect {
                x: 0,
                y: crop_y,
                width: width - crop_x,
                height: height - crop_y,
            },
            Vec2::new(0.0, crop_y as f64),
        )
    };
    Ok((rect, shift))
}

pub fn stitch(unit: &CaptureUnit, low_res: bool) -> Result<Mosaic> {
    let samples = unit.samples();
    if samples.is_empty() {
        return Err(precondition(format!("unit '{}' has no samples to stitch", unit.name())));
    }
    let calibration = unit.calibration();
    if !calibration.is_complete(false) {
        return Err(precondition(format!(
            "unit '{}': calibration '{}' is not complete",
            unit.name(),
            calibration.id()
        )));
    }
    let rotation_rad = calibration
        .rotation_rad()
        .ok_or_else(|| precondition("calibration has no rotation"))?;

    let frames: Vec<&RgbImage> = if low_res {
        if unit.thumbnails().len() != samples.len() {
            return Err(precondition(format!(
                "unit '{}' has {} thumbnails for {} samples",
                unit.name(),
                unit.thumbnails().len(),
                samples.len()
            )));
        }
        unit.thumbnails().iter().collect()
    } else {
        samples.iter().map(|s| &s.image).collect()
    };

    let (width, height) = frames[0].dimensions();
    if let Some(odd) = frames.iter().find(|f| f.dimensions() != (width, height)) {
        return Err(precondition(format!(
            "frames differ in size: {width}x{height} vs {}x{}",
            odd.width(),
            odd.height()
        )));
    }

    let rot_deg = rotation_degrees(rotation_rad);
    let (crop, shift_px) = crop_for_rotation(width, height, rotation_rad)?;
    let shift_mm = unit.image_point_to_stage(shift_px, Vec2::ZERO, true, low_res)?;
    log::debug!(
        "stitching {} frames: rotation={rot_deg:.3} deg crop={crop:?} shift={shift_mm:?} mm",
        frames.len()
    );

    let shifted: Vec<Vec2> = samples.iter().map(|s| s.stage_xy() + shift_mm).collect();

    let tiles: Vec<RgbImage> = frames
        .iter()
        .map(|frame| raster::crop(&raster::rotate_about_origin(frame, -rot_deg), crop))
        .collect();

    let placements = shifted
        .iter()
        .map(|&stage| {
            unit.stage_to_image_point(stage, Vec2::ZERO, true, low_res)
                .map(|p| p * MOSAIC_LAYOUT_SIGN)
        })
        .collect::<Result<Vec<Vec2>>>()?;

    let min = placements.iter().fold(
        Vec2::new(f64::INFINITY, f64::INFINITY),
        |acc, p| Vec2::new(acc.x.min(p.x), acc.y.min(p.y)),
    );
    let offsets: Vec<(i64, i64)> = placements
        .iter()
        .map(|&p| {
            let rel = p - min;
            (rel.x.round() as i64, rel.y.round() as i64)
        })
        .collect();

    let max_x = offsets.iter().map(|o| o.0.abs()).max().unwrap_or(0);
    let max_y = offsets.iter().map(|o| o.1.abs()).max().unwrap_or(0);
    let canvas_w = max_x as u64 + crop.width as u64;
    let canvas_h = max_y as u64 + crop.height as u64;
    let too_large = canvas_w
        .checked_mul(canvas_h)
        .map_or(true, |n| n > MAX_CANVAS_PIXELS);
    if too_large || canvas_w > u32::MAX as u64 || canvas_h > u32::MAX as u64 {
        return Err(precondition(format!(
            "mosaic of {canvas_w}x{canvas_h} pixels is too large"
        )));
    }

    let mut canvas = RgbImage::new(canvas_w as u32, canvas_h as u32);
    for (tile, &(x, y)) in tiles.iter().zip(&offsets) {
        raster::paste(&mut canvas, tile, x, y);
    }

    let first = Vec2::new(offsets[0].0 as f64, offsets[0].1 as f64);
    let min_mm = unit.image_point_to_stage(-first, shifted[0], true, low_res)?;
    let max_mm = unit.image_point_to_stage(
        Vec2::new(canvas_w as f64, canvas_h as f64),
        min_mm,
        true,
        low_res,
    )?;

    log::info!(
        "🧩 Stitched {} frames into {}x{} mosaic for '{}'",
        tiles.len(),
        canvas_w,
        canvas_h,
        unit.name()
    );

    Ok(Mosaic {
        image: canvas,
        min_mm,
        max_mm,
    })
}
