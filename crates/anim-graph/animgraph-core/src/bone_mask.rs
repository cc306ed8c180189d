//! Per-bone weight tables used to restrict layer contributions.

use crate::math::lerp_f32;

#[derive(Clone, Debug, PartialEq)]
pub struct BoneMask {
    weights: Vec<f32>,
}

impl BoneMask {
    pub fn uniform(num_bones: usize, weight: f32) -> Self {
        Self {
            weights: vec![weight; num_bones],
        }
    }

    pub fn from_weights(weights: Vec<f32>) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    pub fn weight(&self, bone_idx: usize) -> f32 {
        self.weights.get(bone_idx).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Per-bone lerp from `a` to `b`, reusing this mask's storage.
    pub fn set_to_blend(&mut self, a: &BoneMask, b: &BoneMask, t: f32) {
        let len = a.len().max(b.len());
        self.weights.clear();
        self.weights
            .extend((0..len).map(|i| lerp_f32(a.weight(i), b.weight(i), t)));
    }

    pub fn blend(a: &BoneMask, b: &BoneMask, t: f32) -> BoneMask {
        let mut out = BoneMask::from_weights(Vec::with_capacity(a.len().max(b.len())));
        out.set_to_blend(a, b, t);
        out
    }

    /// Multiply another mask into this one (nested layers narrow the mask).
    pub fn combine_with(&mut self, other: &BoneMask) {
        for (i, w) in self.weights.iter_mut().enumerate() {
            *w *= other.weight(i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_and_combine() {
        let a = BoneMask::from_weights(vec![0.0, 1.0, 0.5]);
        let b = BoneMask::uniform(3, 1.0);
        let mid = BoneMask::blend(&a, &b, 0.5);
        assert_eq!(mid.weights(), &[0.5, 1.0, 0.75]);

        let mut narrowed = b.clone();
        narrowed.combine_with(&a);
        assert_eq!(narrowed, a);
        assert_eq!(a.weight(10), 0.0);
    }
}
