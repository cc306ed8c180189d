//! Math helpers shared by poses and nodes:
//! - [`Transform`] composition, inversion and blending
//! - [`EasingOperation`] curves
//! - keyed [`FloatCurve`]s
//! - [`FloatRange`] and range remapping
//! - scalar helpers (`lerp_f32`, `saturate`)

mod curve;
mod easing;
mod range;
mod transform;

pub use curve::{CurveInterpolation, CurveKey, FloatCurve};
pub use easing::EasingOperation;
pub use range::{remap_range, FloatRange};
pub use transform::Transform;

/// Linear interpolation of scalars.
#[inline]
pub fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Clamp to `[0, 1]`.
#[inline]
pub fn saturate(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}
