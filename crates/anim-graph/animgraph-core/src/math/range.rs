use serde::{Deserialize, Serialize};

use super::{lerp_f32, saturate};

/// Closed float interval `[min, max]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FloatRange {
    pub min: f32,
    pub max: f32,
}

impl FloatRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// A degenerate range sitting on `value`.
    pub fn at(value: f32) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    #[inline]
    pub fn length(&self) -> f32 {
        self.max - self.min
    }

    pub fn contains(&self, value: f32, inclusive: bool) -> bool {
        if inclusive {
            value >= self.min && value <= self.max
        } else {
            value > self.min && value < self.max
        }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.max(self.min).min(self.max)
    }

    /// Normalised position of `value` inside the range, clamped to `[0, 1]`.
    pub fn percentage_through_clamped(&self, value: f32) -> f32 {
        let length = self.length();
        if length == 0.0 {
            return if value >= self.max { 1.0 } else { 0.0 };
        }
        saturate((value - self.min) / length)
    }
}

/// Map `x` from `[in_min, in_max]` onto `[out_min, out_max]` without clamping.
/// A degenerate input range maps everything to `in_max` before the output lerp.
pub fn remap_range(x: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    let t = if in_min == in_max {
        in_max
    } else {
        (x - in_min) / (in_max - in_min)
    };
    lerp_f32(out_min, out_max, t)
}
