use super::Vec2;
use std::ops::Mul;

/// Determinants below this magnitude are treated as singular
const SINGULAR_EPS: f64 = 1e-12;

/// Row-major 2x2 matrix
///
/// ```text
/// | a  b |
/// | c  d |
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat2 {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl Mat2 {
    pub const IDENTITY: Mat2 = Mat2 {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
    };

    pub const fn new(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self { a, b, c, d }
    }

    pub const fn diag(x: f64, y: f64) -> Self {
        Self::new(x, 0.0, 0.0, y)
    }

    /// Standard counter-clockwise rotation by `theta` radians
    pub fn rotation(theta: f64) -> Self {
        let (s, c) = theta.sin_cos();
        Self::new(c, -s, s, c)
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    /// Matrix inverse, `None` when the matrix is (numerically) singular
    pub fn inverse(&self) -> Option<Mat2> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < SINGULAR_EPS {
            return None;
        }
        let inv = Mat2::new(self.d / det, -self.b / det, -self.c / det, self.a / det);
        inv.is_finite().then_some(inv)
    }

    pub fn is_finite(&self) -> bool {
        self.a.is_finite() && self.b.is_finite() && self.c.is_finite() && self.d.is_finite()
    }

    pub fn to_rows(&self) -> [[f64; 2]; 2] {
        [[self.a, self.b], [self.c, self.d]]
    }

    pub fn from_rows(rows: [[f64; 2]; 2]) -> Self {
        Self::new(rows[0][0], rows[0][1], rows[1][0], rows[1][1])
    }

    /// Element-wise comparison within an absolute tolerance
    pub fn approx_eq(&self, other: &Mat2, tol: f64) -> bool {
        (self.a - other.a).abs() <= tol
            && (self.b - other.b).abs() <= tol
            && (self.c - other.c).abs() <= tol
            && (self.d - other.d).abs() <= tol
    }
}

impl Default for Mat2 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Mat2 {
    type Output = Mat2;
    fn mul(self, o: Mat2) -> Mat2 {
        Mat2::new(
            self.a * o.a + self.b * o.c,
            self.a * o.b + self.b * o.d,
            self.c * o.a + self.d * o.c,
            self.c * o.b + self.d * o.d,
        )
    }
}

impl Mul<Vec2> for Mat2 {
    type Output = Vec2;
    fn mul(self, v: Vec2) -> Vec2 {
        Vec2::new(self.a * v.x + self.b * v.y, self.c * v.x + self.d * v.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_inverse_roundtrip() {
        let m = Mat2::new(3.0, 1.5, -2.0, 4.0);
        let inv = m.inverse().unwrap();
        assert!((m * inv).approx_eq(&Mat2::IDENTITY, 1e-12));
        assert!((inv * m).approx_eq(&Mat2::IDENTITY, 1e-12));
    }

    #[test]
    fn test_singular_has_no_inverse() {
        assert!(Mat2::new(1.0, 2.0, 2.0, 4.0).inverse().is_none());
        assert!(Mat2::diag(0.0, 1.0).inverse().is_none());
    }

    #[test]
    fn test_rotation_quarter_turn() {
        let v = Mat2::rotation(FRAC_PI_2) * Vec2::new(1.0, 0.0);
        assert_relative_eq!(v.x, 0.0, epsilon = 1e-15);
        assert_relative_eq!(v.y, 1.0, epsilon = 1e-15);
    }

    #[test]
    fn test_rows_roundtrip() {
        let m = Mat2::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(m.to_rows(), [[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(Mat2::from_rows(m.to_rows()), m);
    }
}
