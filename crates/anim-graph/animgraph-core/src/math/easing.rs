//! Penner easing curves used by transitions and easing value nodes.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EasingOperation {
    #[default]
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    InCubic,
    OutCubic,
    InOutCubic,
    InQuart,
    OutQuart,
    InOutQuart,
    InQuint,
    OutQuint,
    InOutQuint,
    InSine,
    OutSine,
    InOutSine,
    InExpo,
    OutExpo,
    InOutExpo,
    InCirc,
    OutCirc,
    InOutCirc,
    /// Identity curve. Float selectors treat it as "no easing at all".
    None,
}

impl EasingOperation {
    /// Evaluate the curve at `t` in `[0, 1]`.
    pub fn ease(self, t: f32) -> f32 {
        debug_assert!((0.0..=1.0).contains(&t), "easing parameter {t} out of [0,1]");
        use EasingOperation::*;
        match self {
            Linear | None => t,

            InQuad => t * t,
            OutQuad => t * (2.0 - t),
            InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }

            InCubic => t * t * t,
            OutCubic => (t - 1.0).powi(3) + 1.0,
            InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }

            InQuart => t * t * t * t,
            OutQuart => 1.0 - (t - 1.0).powi(4),
            InOutQuart => {
                if t < 0.5 {
                    8.0 * t * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(4) / 2.0
                }
            }

            InQuint => t * t * t * t * t,
            OutQuint => (t - 1.0).powi(5) + 1.0,
            InOutQuint => {
                if t < 0.5 {
                    16.0 * t * t * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(5) / 2.0
                }
            }

            InSine => 1.0 - (t * PI / 2.0).cos(),
            OutSine => (t * PI / 2.0).sin(),
            InOutSine => 0.5 * (1.0 - (PI * t).cos()),

            InExpo => {
                if t <= 0.0 {
                    0.0
                } else {
                    2f32.powf(10.0 * (t - 1.0))
                }
            }
            OutExpo => {
                if t >= 1.0 {
                    1.0
                } else {
                    1.0 - 2f32.powf(-10.0 * t)
                }
            }
            InOutExpo => {
                if t <= 0.0 {
                    0.0
                } else if t >= 1.0 {
                    1.0
                } else if t < 0.5 {
                    2f32.powf(20.0 * t - 10.0) / 2.0
                } else {
                    (2.0 - 2f32.powf(-20.0 * t + 10.0)) / 2.0
                }
            }

            InCirc => 1.0 - (1.0 - t * t).sqrt(),
            OutCirc => (1.0 - (t - 1.0) * (t - 1.0)).sqrt(),
            InOutCirc => {
                if t < 0.5 {
                    (1.0 - (1.0 - 4.0 * t * t).sqrt()) / 2.0
                } else {
                    ((1.0 - (-2.0 * t + 2.0) * (-2.0 * t + 2.0)).sqrt() + 1.0) / 2.0
                }
            }
        }
    }
}
