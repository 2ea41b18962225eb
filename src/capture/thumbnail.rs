use image::{imageops::FilterType, RgbImage};

use crate::config;

/// Downscale `image` by the process-wide low-resolution ratio
pub fn generate_thumbnail(image: &RgbImage) -> RgbImage {
    downscale(image, config::low_resolution_scale())
}

/// Resize by `scale`, keeping the aspect ratio and at least one pixel per side
pub fn downscale(image: &RgbImage, scale: f64) -> RgbImage {
    let (width, height) = thumbnail_size(image.width(), image.height(), scale);
    image::imageops::resize(image, width, height, FilterType::Lanczos3)
}

pub fn thumbnail_size(width: u32, height: u32, scale: f64) -> (u32, u32) {
    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    (w, h)
}
