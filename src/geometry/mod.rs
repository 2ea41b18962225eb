/// Fixed-size linear algebra for the stage/camera transforms
///
/// Every transform in this crate is a 2x2 matrix acting on 2-vectors, so a
/// pair of small `Copy` structs covers all of it:
/// - `vec2.rs` - points and displacements (pixels or millimetres)
/// - `mat2.rs` - 2x2 matrices with product and inverse

pub mod mat2;
pub mod vec2;

pub use mat2::Mat2;
pub use vec2::Vec2;
