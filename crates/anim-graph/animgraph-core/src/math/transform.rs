//! Bone transforms: translation, rotation and uniform scale.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::lerp_f32;

/// A similarity transform. Scale is uniform, so composition stays closed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: 1.0,
    };

    pub fn new(translation: Vec3, rotation: Quat, scale: f32) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    /// Apply `child` first, then `parent`.
    ///
    /// This is how a bone's parent-space transform is lifted into model space:
    /// `model[i] = compose(parent_space[i], model[parent(i)])`. Not commutative.
    #[inline]
    pub fn compose(child: &Transform, parent: &Transform) -> Transform {
        Transform {
            translation: parent.rotation * (child.translation * parent.scale) + parent.translation,
            rotation: (parent.rotation * child.rotation).normalize(),
            scale: child.scale * parent.scale,
        }
    }

    /// Inverse such that `compose(t, t.inverse())` is the identity.
    pub fn inverse(&self) -> Transform {
        let scale = if self.scale != 0.0 {
            self.scale.recip()
        } else {
            0.0
        };
        let rotation = self.rotation.inverse();
        Transform {
            translation: rotation * (-self.translation * scale),
            rotation,
            scale,
        }
    }

    /// The transform `d` for which `compose(d, from) == to`.
    pub fn delta(from: &Transform, to: &Transform) -> Transform {
        Transform::compose(to, &from.inverse())
    }

    /// Component-wise blend: linear translation/scale, shortest-arc NLERP rotation.
    #[inline]
    pub fn interpolate(a: &Transform, b: &Transform, t: f32) -> Transform {
        Transform {
            translation: a.translation.lerp(b.translation, t),
            rotation: a.rotation.lerp(b.rotation, t),
            scale: lerp_f32(a.scale, b.scale, t),
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation * (point * self.scale) + self.translation
    }

    pub fn abs_diff_eq(&self, other: &Transform, max_abs_diff: f32) -> bool {
        // q and -q encode the same rotation.
        let rotation_matches = self.rotation.abs_diff_eq(other.rotation, max_abs_diff)
            || self.rotation.abs_diff_eq(-other.rotation, max_abs_diff);
        self.translation.abs_diff_eq(other.translation, max_abs_diff)
            && rotation_matches
            && (self.scale - other.scale).abs() <= max_abs_diff
    }
}
