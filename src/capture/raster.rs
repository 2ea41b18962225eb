/// Raster operations used by mosaic stitching
///
/// - rotation about the pixel origin without expanding the canvas
/// - rectangular crop
/// - opaque paste (later pastes overwrite earlier ones)

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{rotate, Interpolation};

/// Axis-aligned pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Rotate counter-clockwise (as displayed) by `angle_deg` about pixel (0, 0).
///
/// The output keeps the input size; content rotated out of the frame is
/// lost and uncovered pixels are black. Nearest-neighbour sampling.
pub fn rotate_about_origin(image: &RgbImage, angle_deg: f64) -> RgbImage {
    if angle_deg == 0.0 {
        return image.clone();
    }
    // imageproc turns clockwise for positive angles (y axis points down)
    rotate(
        image,
        (0.0, 0.0),
        (-angle_deg.to_radians()) as f32,
        Interpolation::Nearest,
        Rgb([0, 0, 0]),
    )
}

pub fn crop(image: &RgbImage, rect: CropRect) -> RgbImage {
    image::imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image()
}

/// Paste `top` onto `canvas` with its top-left corner at (x, y)
pub fn paste(canvas: &mut RgbImage, top: &RgbImage, x: i64, y: i64) {
    image::imageops::replace(canvas, top, x, y);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([x as u8, y as u8, 255]))
    }

    #[test]
    fn test_zero_rotation_is_identity() {
        let image = gradient(16, 8);
        assert_eq!(rotate_about_origin(&image, 0.0), image);
    }

    #[test]
    fn test_rotation_keeps_size_and_origin() {
        let image = gradient(32, 16);
        let rotated = rotate_about_origin(&image, 5.0);
        assert_eq!(rotated.dimensions(), (32, 16));
        assert_eq!(rotated.get_pixel(0, 0), image.get_pixel(0, 0));
    }

    #[test]
    fn test_positive_rotation_blackens_left_and_bottom() {
        let image = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
        let rotated = rotate_about_origin(&image, 10.0);
        // left edge near the bottom and bottom edge near the right are uncovered
        assert_eq!(rotated.get_pixel(0, 99), &Rgb([0, 0, 0]));
        assert_eq!(rotated.get_pixel(99, 99), &Rgb([0, 0, 0]));
        // the opposite corner stays covered
        assert_eq!(rotated.get_pixel(99, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_negative_rotation_blackens_top_and_right() {
        let image = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
        let rotated = rotate_about_origin(&image, -10.0);
        assert_eq!(rotated.get_pixel(99, 0), &Rgb([0, 0, 0]));
        assert_eq!(rotated.get_pixel(99, 99), &Rgb([0, 0, 0]));
        assert_eq!(rotated.get_pixel(0, 99), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_crop_and_paste() {
        let image = gradient(10, 10);
        let cropped = crop(
            &image,
            CropRect {
                x: 2,
                y: 3,
                width: 4,
                height: 5,
            },
        );
        assert_eq!(cropped.dimensions(), (4, 5));
        assert_eq!(cropped.get_pixel(0, 0), image.get_pixel(2, 3));

        let mut canvas = RgbImage::new(20, 20);
        paste(&mut canvas, &cropped, 7, 1);
        assert_eq!(canvas.get_pixel(7, 1), image.get_pixel(2, 3));
        assert_eq!(canvas.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }
}
