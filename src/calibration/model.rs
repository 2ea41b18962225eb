use std::f64::consts::{FRAC_PI_2, PI};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{precondition, Error, Result};
use crate::geometry::{Mat2, Vec2};

/// Stage and camera see motion with opposite sign: when a feature moves
/// right in the camera, the stage actually moved left. Stage displacements
/// are multiplied by this before they are compared to camera displacements.
pub const STAGE_CAMERA_MIRROR: f64 = -1.0;

/// Minimum stage travel (mm) along the axis an estimation step divides by
const MIN_STAGE_TRAVEL_MM: f64 = 1e-9;

/// Flip applied to freshly constructed calibrations
pub const DEFAULT_FLIP_Y: f64 = -1.0;

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate an id unique within this process and readable in a folder listing
pub(crate) fn generate_id(prefix: &str) -> String {
    let n = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}_{}_{:03}",
        prefix,
        chrono::Local::now().format("%Y%m%d_%H%M%S%3f"),
        n % 1000
    )
}

/// One objective's optical mapping between stage millimetres and camera pixels
///
/// The forward matrix maps a stage displacement (mm) to a pixel displacement:
/// `forward = R(rotation) * diag(1, flip_y) * diag(scale_x, scale_y)`.
/// Both matrices are derived from the scalar fields and rebuilt whenever one
/// of them changes; they are never set on their own.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    id: String,
    scale_x: Option<f64>,
    scale_y: Option<f64>,
    flip_y: Option<f64>,
    rotation_rad: Option<f64>,
    laser_offset: Option<Vec2>,
    forward: Option<Mat2>,
    inverse: Option<Mat2>,
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new()
    }
}

impl Calibration {
    /// Create an empty calibration with a generated id
    pub fn new() -> Self {
        Self::with_id(generate_id("calibration"))
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            scale_x: None,
            scale_y: None,
            flip_y: Some(DEFAULT_FLIP_Y),
            rotation_rad: None,
            laser_offset: None,
            forward: None,
            inverse: None,
        }
    }

    /// Assemble a calibration from stored fields without re-deriving anything
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: String,
        scale_x: Option<f64>,
        scale_y: Option<f64>,
        flip_y: Option<f64>,
        rotation_rad: Option<f64>,
        laser_offset: Option<Vec2>,
        forward: Option<Mat2>,
        inverse: Option<Mat2>,
    ) -> Self {
        Self {
            id,
            scale_x,
            scale_y,
            flip_y,
            rotation_rad,
            laser_offset,
            forward,
            inverse,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Pixels per millimetre along the camera x axis (signed)
    pub fn scale_x(&self) -> Option<f64> {
        self.scale_x
    }

    /// Pixels per millimetre along the camera y axis (signed)
    pub fn scale_y(&self) -> Option<f64> {
        self.scale_y
    }

    pub fn flip_y(&self) -> Option<f64> {
        self.flip_y
    }

    pub fn rotation_rad(&self) -> Option<f64> {
        self.rotation_rad
    }

    pub fn rotation_deg(&self) -> Option<f64> {
        self.rotation_rad.map(f64::to_degrees)
    }

    pub fn laser_offset(&self) -> Option<Vec2> {
        self.laser_offset
    }

    /// Stage delta (mm) -> pixel delta
    pub fn forward_matrix(&self) -> Option<Mat2> {
        self.forward
    }

    /// Pixel delta -> stage delta (mm)
    pub fn inverse_matrix(&self) -> Option<Mat2> {
        self.inverse
    }

    /// True when every field is set. With `exclude_laser` the laser offset
    /// is not required; the object itself is left untouched either way.
    pub fn is_complete(&self, exclude_laser: bool) -> bool {
        self.scale_x.is_some()
            && self.scale_y.is_some()
            && self.flip_y.is_some()
            && self.rotation_rad.is_some()
            && self.forward.is_some()
            && self.inverse.is_some()
            && (exclude_laser || self.laser_offset.is_some())
    }

    fn require_complete(&self, exclude_laser: bool, op: &str) -> Result<()> {
        if self.is_complete(exclude_laser) {
            Ok(())
        } else {
            Err(precondition(format!(
                "{op}: calibration '{}' is not complete{}",
                self.id,
                if exclude_laser { " (laser excluded)" } else { "" }
            )))
        }
    }

    fn matrices(&self, op: &str) -> Result<(Mat2, Mat2)> {
        self.require_complete(true, op)?;
        match (self.forward, self.inverse) {
            (Some(f), Some(i)) => Ok((f, i)),
            _ => Err(precondition(format!("{op}: transform matrices missing"))),
        }
    }

    fn laser(&self, op: &str) -> Result<Vec2> {
        self.require_complete(false, op)?;
        self.laser_offset
            .ok_or_else(|| precondition(format!("{op}: laser offset missing")))
    }

    /// Stage coordinate -> measurement frame coordinate
    pub fn stage_delta_to_measurement(&self, v: Vec2) -> Result<Vec2> {
        check_finite(v, "stage_delta_to_measurement")?;
        Ok(v + self.laser("stage_delta_to_measurement")?)
    }

    /// Measurement frame coordinate -> stage coordinate
    pub fn measurement_to_stage_delta(&self, v: Vec2) -> Result<Vec2> {
        check_finite(v, "measurement_to_stage_delta")?;
        Ok(v - self.laser("measurement_to_stage_delta")?)
    }

    /// Pixel delta of `point_stage` as seen from a frame captured at `stage_origin`
    pub fn stage_to_image_point(&self, stage_origin: Vec2, point_stage: Vec2) -> Result<Vec2> {
        check_finite(stage_origin, "stage_to_image_point")?;
        check_finite(point_stage, "stage_to_image_point")?;
        let (forward, _) = self.matrices("stage_to_image_point")?;
        Ok(forward * (point_stage - stage_origin))
    }

    /// Stage coordinate of a pixel delta in a frame captured at `stage_origin`
    pub fn image_point_to_stage(&self, pixel_delta: Vec2, stage_origin: Vec2) -> Result<Vec2> {
        check_finite(pixel_delta, "image_point_to_stage")?;
        check_finite(stage_origin, "image_point_to_stage")?;
        let (_, inverse) = self.matrices("image_point_to_stage")?;
        Ok(inverse * pixel_delta + stage_origin)
    }

    /// Assign every parameter by hand and rebuild both matrices.
    ///
    /// `flip_y = None` keeps the current flip.
    pub fn set_params(
        &mut self,
        scale_x: f64,
        scale_y: f64,
        laser_x: f64,
        laser_y: f64,
        rotation_rad: f64,
        flip_y: Option<f64>,
    ) -> Result<()> {
        for (name, v) in [
            ("scale_x", scale_x),
            ("scale_y", scale_y),
            ("laser_x", laser_x),
            ("laser_y", laser_y),
            ("rotation_rad", rotation_rad),
        ] {
            if !v.is_finite() {
                return Err(precondition(format!("set_params: {name} is not finite ({v})")));
            }
        }
        check_rotation(rotation_rad)?;
        let flip_y = match flip_y.or(self.flip_y) {
            Some(f) => check_flip(f)?,
            None => DEFAULT_FLIP_Y,
        };

        let (forward, inverse) = build_matrices(scale_x, scale_y, flip_y, rotation_rad)?;
        self.scale_x = Some(scale_x);
        self.scale_y = Some(scale_y);
        self.flip_y = Some(flip_y);
        self.rotation_rad = Some(rotation_rad);
        self.laser_offset = Some(Vec2::new(laser_x, laser_y));
        self.forward = Some(forward);
        self.inverse = Some(inverse);
        Ok(())
    }

    /// Change the y flip and rebuild the matrices if the other scalars are known
    pub fn set_flip_y(&mut self, flip_y: f64) -> Result<()> {
        let flip_y = check_flip(flip_y)?;
        if let (Some(sx), Some(sy), Some(rot)) = (self.scale_x, self.scale_y, self.rotation_rad) {
            let (forward, inverse) = build_matrices(sx, sy, flip_y, rot)?;
            self.forward = Some(forward);
            self.inverse = Some(inverse);
        }
        self.flip_y = Some(flip_y);
        Ok(())
    }

    /// Estimate scale, flip and rotation from three tracked stage/camera
    /// position pairs, then derive the laser offset from the spot pixel `vlc`.
    ///
    /// The stage must have moved along x only between `v1s` and `v2s`, then
    /// along y only between `v2s` and `v3s`. That is the caller's job; only
    /// the travel along the axis each step divides by is checked here.
    #[allow(clippy::too_many_arguments)]
    pub fn estimate_from_vectors(
        &mut self,
        v1s: Vec2,
        v2s: Vec2,
        v3s: Vec2,
        v1c: Vec2,
        v2c: Vec2,
        v3c: Vec2,
        vlc: Vec2,
    ) -> Result<()> {
        for v in [v1s, v2s, v3s, v1c, v2c, v3c, vlc] {
            check_finite(v, "estimate_from_vectors")?;
        }

        let (v1s, v2s, v3s) = (
            v1s * STAGE_CAMERA_MIRROR,
            v2s * STAGE_CAMERA_MIRROR,
            v3s * STAGE_CAMERA_MIRROR,
        );

        let dvs_12 = v2s - v1s;
        let dvs_23 = v3s - v2s;
        let dvc_12 = v2c - v1c;
        let dvc_23 = v3c - v2c;

        if dvs_12.x.abs() < MIN_STAGE_TRAVEL_MM {
            return Err(Error::DegenerateGeometry(format!(
                "horizontal stage travel too small ({} mm)",
                dvs_12.x
            )));
        }
        if dvs_23.y.abs() < MIN_STAGE_TRAVEL_MM {
            return Err(Error::DegenerateGeometry(format!(
                "vertical stage travel too small ({} mm)",
                dvs_23.y
            )));
        }

        let theta_sign = dvs_12.x.signum();
        let mut theta = (dvc_12.y * theta_sign).atan2(dvc_12.x * theta_sign);
        let cos_theta = theta.cos();
        if cos_theta.abs() < 1e-12 {
            return Err(Error::DegenerateGeometry(format!(
                "rotation estimate {theta} rad is perpendicular to the stage axes"
            )));
        }

        let mut scale_x = dvc_12.x / (dvs_12.x * cos_theta);
        let flip_ratio = dvc_23.y / (dvs_23.y * cos_theta);
        if flip_ratio == 0.0 || !flip_ratio.is_finite() {
            return Err(Error::DegenerateGeometry(
                "camera did not move vertically between the 2nd and 3rd positions".into(),
            ));
        }
        let flip_y = flip_ratio.signum();
        let mut scale_y = dvc_23.y / (dvs_23.y * flip_y * cos_theta);

        // fold the 180-degree-rotated solution back into (-pi/2, pi/2]
        if theta.abs() > FRAC_PI_2 {
            theta -= theta.signum() * PI;
            scale_x = -scale_x;
            scale_y = -scale_y;
        }

        log::debug!(
            "estimated scale=({scale_x:.4}, {scale_y:.4}) px/mm flip_y={flip_y} rotation={:.4} deg",
            theta.to_degrees()
        );

        let (forward, inverse) = build_matrices(scale_x, scale_y, flip_y, theta)?;
        self.scale_x = Some(scale_x);
        self.scale_y = Some(scale_y);
        self.flip_y = Some(flip_y);
        self.rotation_rad = Some(theta);
        self.forward = Some(forward);
        self.inverse = Some(inverse);

        self.set_laser_offset(vlc)
    }

    /// Store the stage coordinate of the reference spot seen at pixel `spot_px`
    pub fn set_laser_offset(&mut self, spot_px: Vec2) -> Result<()> {
        let offset = self.image_point_to_stage(spot_px, Vec2::ZERO)?;
        self.laser_offset = Some(offset);
        Ok(())
    }

    /// One-line description for listings
    pub fn summary(&self) -> String {
        fn fmt(v: Option<f64>) -> String {
            v.map(|v| format!("{v:.4}")).unwrap_or_else(|| "-".into())
        }
        let laser = self
            .laser_offset
            .map(|l| format!("({:.4}, {:.4})", l.x, l.y))
            .unwrap_or_else(|| "-".into());
        format!(
            "{}: scale=({}, {}) px/mm flip_y={} rotation={} deg laser={} mm",
            self.id,
            fmt(self.scale_x),
            fmt(self.scale_y),
            fmt(self.flip_y),
            fmt(self.rotation_deg()),
            laser
        )
    }
}

/// `R(theta) * diag(1, flip_y) * diag(scale_x, scale_y)` and its inverse
pub(crate) fn build_matrices(
    scale_x: f64,
    scale_y: f64,
    flip_y: f64,
    rotation_rad: f64,
) -> Result<(Mat2, Mat2)> {
    let forward =
        Mat2::rotation(rotation_rad) * Mat2::diag(1.0, flip_y) * Mat2::diag(scale_x, scale_y);
    let inverse = forward.inverse().ok_or_else(|| {
        Error::DegenerateGeometry(format!(
            "transform with scale ({scale_x}, {scale_y}) is not invertible"
        ))
    })?;
    Ok((forward, inverse))
}

fn check_finite(v: Vec2, op: &str) -> Result<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(precondition(format!("{op}: non-finite input ({}, {})", v.x, v.y)))
    }
}

fn check_flip(flip_y: f64) -> Result<f64> {
    if flip_y == 1.0 || flip_y == -1.0 {
        Ok(flip_y)
    } else {
        Err(precondition(format!("flip_y must be -1 or +1, got {flip_y}")))
    }
}

fn check_rotation(rotation_rad: f64) -> Result<()> {
    if rotation_rad > -PI && rotation_rad <= PI {
        Ok(())
    } else {
        Err(precondition(format!(
            "rotation must lie in (-pi, pi], got {rotation_rad}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Dummy objective used throughout the tests
    fn dummy() -> Calibration {
        let mut cal = Calibration::with_id("dummy");
        cal.set_params(19.0, 24.0, 0.03, 0.02, 0.02, Some(-1.0)).unwrap();
        cal
    }

    /// Camera position of the tracked feature for a given stage position
    fn camera_point(forward: Mat2, stage: Vec2) -> Vec2 {
        forward * (stage * STAGE_CAMERA_MIRROR) + Vec2::new(320.0, 240.0)
    }

    fn estimate(scale_x: f64, scale_y: f64, flip_y: f64, theta: f64, dx: f64, dy: f64) -> Calibration {
        let (forward, _) = build_matrices(scale_x, scale_y, flip_y, theta).unwrap();
        let v1s = Vec2::new(1.0, 2.0);
        let v2s = v1s + Vec2::new(dx, 0.0);
        let v3s = v2s + Vec2::new(0.0, dy);
        let mut cal = Calibration::with_id("estimated");
        cal.estimate_from_vectors(
            v1s,
            v2s,
            v3s,
            camera_point(forward, v1s),
            camera_point(forward, v2s),
            camera_point(forward, v3s),
            Vec2::new(12.0, -7.0),
        )
        .unwrap();
        cal
    }

    #[test]
    fn test_dummy_calibration_roundtrips_points() {
        let cal = dummy();
        assert!(cal.is_complete(false));

        let zero = cal.stage_to_image_point(Vec2::ZERO, Vec2::ZERO).unwrap();
        assert_eq!(zero, Vec2::ZERO);

        let origin = Vec2::new(3.5, -1.25);
        let point = Vec2::new(1.0, 0.5);
        let px = cal.stage_to_image_point(origin, point).unwrap();
        let back = cal.image_point_to_stage(px, origin).unwrap();
        assert_relative_eq!(back.x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(back.y, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_inverse_law_for_pixels() {
        let cal = dummy();
        for (p, origin) in [
            (Vec2::new(0.0, 0.0), Vec2::new(0.0, 0.0)),
            (Vec2::new(640.0, -12.5), Vec2::new(10.0, 20.0)),
            (Vec2::new(-33.3, 480.0), Vec2::new(-5.5, 0.001)),
        ] {
            let stage = cal.image_point_to_stage(p, origin).unwrap();
            let px = cal.stage_to_image_point(origin, stage).unwrap();
            assert_relative_eq!(px.x, p.x, epsilon = 1e-9);
            assert_relative_eq!(px.y, p.y, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_forward_matrix_formula() {
        let cal = dummy();
        let (s, c) = 0.02f64.sin_cos();
        let expected = Mat2::new(c * 19.0, s * 24.0, s * 19.0, -c * 24.0);
        assert!(cal.forward_matrix().unwrap().approx_eq(&expected, 1e-12));
        let product = cal.forward_matrix().unwrap() * cal.inverse_matrix().unwrap();
        assert!(product.approx_eq(&Mat2::IDENTITY, 1e-12));
    }

    #[test]
    fn test_measurement_frame_offsets_by_laser() {
        let cal = dummy();
        let m = cal.stage_delta_to_measurement(Vec2::new(1.0, 1.0)).unwrap();
        assert_relative_eq!(m.x, 1.03);
        assert_relative_eq!(m.y, 1.02);
        let s = cal.measurement_to_stage_delta(m).unwrap();
        assert_relative_eq!(s.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(s.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_incomplete_calibration_is_gated() {
        let cal = Calibration::with_id("empty");
        assert!(!cal.is_complete(false));
        assert!(!cal.is_complete(true));
        assert!(matches!(
            cal.stage_to_image_point(Vec2::ZERO, Vec2::ZERO),
            Err(Error::Precondition(_))
        ));
        assert!(cal.image_point_to_stage(Vec2::ZERO, Vec2::ZERO).is_err());
        assert!(cal.stage_delta_to_measurement(Vec2::ZERO).is_err());
        assert!(cal.measurement_to_stage_delta(Vec2::ZERO).is_err());
    }

    #[test]
    fn test_exclude_laser_check_has_no_side_effect() {
        let mut cal = dummy();
        cal.laser_offset = None;
        let before = cal.clone();

        assert!(cal.is_complete(true));
        assert!(!cal.is_complete(false));
        assert_eq!(cal, before);
        assert!(cal.laser_offset().is_none());

        // transforms that never need the laser still work
        assert!(cal.stage_to_image_point(Vec2::ZERO, Vec2::new(1.0, 1.0)).is_ok());
        assert!(cal.stage_delta_to_measurement(Vec2::ZERO).is_err());
    }

    #[test]
    fn test_set_params_rejects_bad_values() {
        let mut cal = Calibration::with_id("bad");
        assert!(cal.set_params(f64::NAN, 1.0, 0.0, 0.0, 0.0, None).is_err());
        assert!(cal.set_params(1.0, 1.0, 0.0, 0.0, 4.0, None).is_err());
        assert!(cal.set_params(1.0, 1.0, 0.0, 0.0, 0.0, Some(0.5)).is_err());
        assert!(matches!(
            cal.set_params(0.0, 1.0, 0.0, 0.0, 0.0, None),
            Err(Error::DegenerateGeometry(_))
        ));
        assert!(!cal.is_complete(false));
    }

    #[test]
    fn test_set_params_keeps_flip_when_omitted() {
        let mut cal = Calibration::with_id("flip");
        cal.set_flip_y(1.0).unwrap();
        cal.set_params(10.0, 10.0, 0.0, 0.0, 0.0, None).unwrap();
        assert_eq!(cal.flip_y(), Some(1.0));
        assert!(cal.forward_matrix().unwrap().approx_eq(&Mat2::diag(10.0, 10.0), 1e-12));
    }

    #[test]
    fn test_set_flip_rebuilds_matrices() {
        let mut cal = dummy();
        cal.set_flip_y(1.0).unwrap();
        let (expected, _) = build_matrices(19.0, 24.0, 1.0, 0.02).unwrap();
        assert!(cal.forward_matrix().unwrap().approx_eq(&expected, 1e-12));
    }

    #[test]
    fn test_estimation_recovers_known_parameters() {
        for &(sx, sy, flip, theta, dx, dy) in &[
            (19.0, 24.0, -1.0, 0.02, 0.5, 0.4),
            (19.0, 24.0, -1.0, 0.02, -0.5, -0.4),
            (5.0, 5.5, 1.0, -0.3, 1.0, -2.0),
            (120.0, 118.0, -1.0, 1.2, -0.05, 0.05),
        ] {
            let cal = estimate(sx, sy, flip, theta, dx, dy);
            assert_relative_eq!(cal.scale_x().unwrap(), sx, max_relative = 1e-9);
            assert_relative_eq!(cal.scale_y().unwrap(), sy, max_relative = 1e-9);
            assert_eq!(cal.flip_y(), Some(flip));
            assert_relative_eq!(cal.rotation_rad().unwrap(), theta, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_estimation_folds_large_rotation() {
        let theta = 2.0;
        let cal = estimate(19.0, 24.0, -1.0, theta, 0.5, 0.4);

        assert_relative_eq!(cal.rotation_rad().unwrap(), theta - PI, epsilon = 1e-9);
        assert_relative_eq!(cal.scale_x().unwrap(), -19.0, max_relative = 1e-9);
        assert_relative_eq!(cal.scale_y().unwrap(), -24.0, max_relative = 1e-9);

        // the folded parameters describe the same mapping
        let (expected, _) = build_matrices(19.0, 24.0, -1.0, theta).unwrap();
        assert!(cal.forward_matrix().unwrap().approx_eq(&expected, 1e-9));
    }

    #[test]
    fn test_estimation_sets_laser_offset() {
        let cal = estimate(19.0, 24.0, -1.0, 0.02, 0.5, 0.4);
        let laser = cal.laser_offset().unwrap();
        let spot = cal.stage_to_image_point(Vec2::ZERO, laser).unwrap();
        assert_relative_eq!(spot.x, 12.0, epsilon = 1e-9);
        assert_relative_eq!(spot.y, -7.0, epsilon = 1e-9);
    }

    #[test]
    fn test_estimation_rejects_zero_travel() {
        let mut cal = Calibration::with_id("degenerate");
        let p = Vec2::new(1.0, 1.0);
        let err = cal
            .estimate_from_vectors(p, p, p + Vec2::new(0.0, 1.0), p, p, p, p)
            .unwrap_err();
        assert!(matches!(err, Error::DegenerateGeometry(_)));

        let err = cal
            .estimate_from_vectors(
                p,
                p + Vec2::new(1.0, 0.0),
                p + Vec2::new(1.0, 0.0),
                Vec2::new(0.0, 0.0),
                Vec2::new(-10.0, 0.0),
                Vec2::new(-10.0, 0.0),
                p,
            )
            .unwrap_err();
        assert!(matches!(err, Error::DegenerateGeometry(_)));
        assert!(!cal.is_complete(true));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = Calibration::new();
        let b = Calibration::new();
        assert_ne!(a.id(), b.id());
    }
}
