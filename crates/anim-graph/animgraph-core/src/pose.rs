//! Per-instance skeletal pose buffers.
//!
//! A [`Pose`] stores parent-space transforms for every bone of its skeleton and lazily derives
//! model-space transforms. Any parent-space write invalidates the model-space cache.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bone_mask::BoneMask;
use crate::math::Transform;
use crate::skeleton::Skeleton;

/// Provenance tag for a pose buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoseType {
    #[default]
    Unset,
    Pose,
    ReferencePose,
    ZeroPose,
    AdditivePose,
}

#[derive(Clone, Debug)]
pub struct Pose {
    skeleton: Arc<Skeleton>,
    parent_space: Vec<Transform>,
    model_space: Vec<Transform>,
    model_space_valid: bool,
    pose_type: PoseType,
}

impl Pose {
    pub fn new(skeleton: Arc<Skeleton>, initial: PoseType) -> Self {
        let num_bones = skeleton.num_bones();
        let mut pose = Self {
            skeleton,
            parent_space: vec![Transform::IDENTITY; num_bones],
            model_space: Vec::with_capacity(num_bones),
            model_space_valid: false,
            pose_type: PoseType::Unset,
        };
        pose.reset(initial, false);
        pose
    }

    pub fn skeleton(&self) -> &Arc<Skeleton> {
        &self.skeleton
    }

    #[inline]
    pub fn num_bones(&self) -> usize {
        self.parent_space.len()
    }

    pub fn pose_type(&self) -> PoseType {
        self.pose_type
    }

    pub fn set_pose_type(&mut self, pose_type: PoseType) {
        self.pose_type = pose_type;
    }

    pub fn is_model_space_valid(&self) -> bool {
        self.model_space_valid
    }

    /// Reset to a reference or zero pose. Any other type only retags the buffer.
    pub fn reset(&mut self, initial: PoseType, calculate_model_space: bool) {
        match initial {
            PoseType::ReferencePose => self.set_to_reference_pose(calculate_model_space),
            PoseType::ZeroPose => self.set_to_zero_pose(calculate_model_space),
            _ => {
                self.model_space_valid = false;
                self.pose_type = PoseType::Unset;
            }
        }
    }

    pub fn set_to_reference_pose(&mut self, calculate_model_space: bool) {
        self.parent_space
            .copy_from_slice(self.skeleton.parent_space_reference_pose());
        if calculate_model_space {
            self.model_space.clear();
            self.model_space
                .extend_from_slice(self.skeleton.model_space_reference_pose());
            self.model_space_valid = true;
        } else {
            self.model_space_valid = false;
        }
        self.pose_type = PoseType::ReferencePose;
    }

    pub fn set_to_zero_pose(&mut self, calculate_model_space: bool) {
        self.parent_space.fill(Transform::IDENTITY);
        if calculate_model_space {
            self.model_space.clear();
            self.model_space.extend_from_slice(&self.parent_space);
            self.model_space_valid = true;
        } else {
            self.model_space_valid = false;
        }
        self.pose_type = PoseType::ZeroPose;
    }

    /// Copy another pose into this buffer, reusing allocations.
    pub fn copy_from(&mut self, other: &Pose) {
        if !Arc::ptr_eq(&self.skeleton, &other.skeleton) {
            self.skeleton = Arc::clone(&other.skeleton);
        }
        self.parent_space.clone_from(&other.parent_space);
        self.model_space.clone_from(&other.model_space);
        self.model_space_valid = other.model_space_valid;
        self.pose_type = other.pose_type;
    }

    pub fn swap_with(&mut self, other: &mut Pose) {
        std::mem::swap(self, other);
    }

    pub fn change_skeleton(&mut self, skeleton: Arc<Skeleton>) {
        if Arc::ptr_eq(&self.skeleton, &skeleton) {
            return;
        }
        self.parent_space = vec![Transform::IDENTITY; skeleton.num_bones()];
        self.model_space.clear();
        self.model_space_valid = false;
        self.pose_type = PoseType::Unset;
        self.skeleton = skeleton;
    }

    pub fn parent_space_transforms(&self) -> &[Transform] {
        &self.parent_space
    }

    #[inline]
    pub fn transform(&self, bone_idx: usize) -> Transform {
        self.parent_space[bone_idx]
    }

    pub fn set_transform(&mut self, bone_idx: usize, transform: Transform) {
        self.parent_space[bone_idx] = transform;
        self.model_space_valid = false;
        self.pose_type = PoseType::Pose;
    }

    /// Mutable access to every parent-space transform. Invalidates the model-space cache.
    pub fn parent_space_transforms_mut(&mut self) -> &mut [Transform] {
        self.model_space_valid = false;
        self.pose_type = PoseType::Pose;
        &mut self.parent_space
    }

    /// Write every parent-space transform from a slice of equal length.
    pub fn set_transforms(&mut self, transforms: &[Transform]) {
        self.parent_space.copy_from_slice(transforms);
        self.model_space_valid = false;
        self.pose_type = PoseType::Pose;
    }

    /// Eagerly compute model-space transforms for the first `num_relevant_bones` bones (all when
    /// `None`). Bones past the limit are left at identity.
    pub fn calculate_model_space_transforms(&mut self, num_relevant_bones: Option<usize>) {
        let num_bones = self.parent_space.len();
        let relevant = num_relevant_bones.map_or(num_bones, |n| n.min(num_bones));

        self.model_space.clear();
        self.model_space.resize(num_bones, Transform::IDENTITY);
        for bone_idx in 0..relevant {
            self.model_space[bone_idx] = match self.skeleton.parent(bone_idx) {
                Some(parent) => {
                    debug_assert!(parent < bone_idx);
                    Transform::compose(&self.parent_space[bone_idx], &self.model_space[parent])
                }
                None => self.parent_space[bone_idx],
            };
        }
        self.model_space_valid = true;
    }

    /// Cached model-space transforms, if they are current.
    pub fn model_space_transforms(&self) -> Option<&[Transform]> {
        self.model_space_valid.then_some(self.model_space.as_slice())
    }

    /// Model-space transform of one bone. Uses the cache when valid, otherwise walks the parent
    /// chain from the root down, composing in the same order as the eager pass.
    pub fn get_model_space_transform(&self, bone_idx: usize) -> Transform {
        if self.model_space_valid {
            return self.model_space[bone_idx];
        }

        let mut chain = Vec::new();
        let mut parent = self.skeleton.parent(bone_idx);
        while let Some(idx) = parent {
            chain.push(idx);
            parent = self.skeleton.parent(idx);
        }

        let local = self.parent_space[bone_idx];
        let Some((&root, rest)) = chain.split_last() else {
            return local;
        };

        let mut parent_model = self.parent_space[root];
        for &idx in rest.iter().rev() {
            parent_model = Transform::compose(&self.parent_space[idx], &parent_model);
        }
        Transform::compose(&local, &parent_model)
    }

    /// Overwrite this pose with `source` blended toward `target` by `weight`.
    pub fn set_to_blend(&mut self, source: &Pose, target: &Pose, weight: f32) {
        debug_assert_eq!(source.num_bones(), target.num_bones());
        self.parent_space.clear();
        self.parent_space.extend(
            source
                .parent_space
                .iter()
                .zip(&target.parent_space)
                .map(|(a, b)| Transform::interpolate(a, b, weight)),
        );
        self.model_space_valid = false;
        self.pose_type = PoseType::Pose;
    }

    /// Blend this pose toward `target` in place, optionally scaling the weight per bone.
    pub fn blend_toward(&mut self, target: &Pose, weight: f32, mask: Option<&BoneMask>) {
        for (bone_idx, (current, layer)) in self
            .parent_space
            .iter_mut()
            .zip(&target.parent_space)
            .enumerate()
        {
            let w = match mask {
                Some(mask) => weight * mask.weight(bone_idx),
                None => weight,
            };
            if w > 0.0 {
                *current = Transform::interpolate(current, layer, w);
            }
        }
        self.model_space_valid = false;
        self.pose_type = PoseType::Pose;
    }

    /// Apply an additive pose on top of this one, scaled by `weight` and an optional mask.
    pub fn add_additive(&mut self, additive: &Pose, weight: f32, mask: Option<&BoneMask>) {
        for (bone_idx, (current, delta)) in self
            .parent_space
            .iter_mut()
            .zip(&additive.parent_space)
            .enumerate()
        {
            let w = match mask {
                Some(mask) => weight * mask.weight(bone_idx),
                None => weight,
            };
            if w <= 0.0 {
                continue;
            }
            let scaled = Transform::interpolate(&Transform::IDENTITY, delta, w);
            current.translation += scaled.translation;
            current.rotation = (scaled.rotation * current.rotation).normalize();
            current.scale *= scaled.scale;
        }
        self.model_space_valid = false;
        self.pose_type = PoseType::Pose;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    fn branching_skeleton() -> Arc<Skeleton> {
        Arc::new(
            Skeleton::new(
                vec![
                    "root".into(),
                    "hips".into(),
                    "spine".into(),
                    "l_leg".into(),
                    "head".into(),
                ],
                vec![None, Some(0), Some(1), Some(1), Some(2)],
                vec![
                    Transform::new(Vec3::new(0.0, 0.1, 0.0), Quat::from_rotation_y(0.2), 1.0),
                    Transform::new(Vec3::new(0.0, 1.0, 0.0), Quat::from_rotation_x(0.1), 1.0),
                    Transform::new(Vec3::new(0.0, 0.4, 0.1), Quat::from_rotation_z(-0.3), 1.1),
                    Transform::new(Vec3::new(0.2, -0.5, 0.0), Quat::from_rotation_x(0.9), 1.0),
                    Transform::new(Vec3::new(0.0, 0.3, 0.0), Quat::from_rotation_y(1.3), 0.9),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn eager_and_lazy_model_space_are_bitwise_identical() {
        let mut pose = Pose::new(branching_skeleton(), PoseType::ReferencePose);
        pose.set_transform(
            3,
            Transform::new(Vec3::new(0.3, -0.4, 0.2), Quat::from_rotation_z(0.77), 1.0),
        );

        let lazy: Vec<Transform> = (0..pose.num_bones())
            .map(|i| pose.get_model_space_transform(i))
            .collect();
        pose.calculate_model_space_transforms(None);
        let eager = pose.model_space_transforms().unwrap().to_vec();

        for (l, e) in lazy.iter().zip(&eager) {
            assert_eq!(l.translation.to_array(), e.translation.to_array());
            assert_eq!(l.rotation.to_array(), e.rotation.to_array());
            assert_eq!(l.scale.to_bits(), e.scale.to_bits());
        }
        assert_eq!(eager[0], pose.transform(0));
    }

    #[test]
    fn writes_invalidate_model_space_cache() {
        let mut pose = Pose::new(branching_skeleton(), PoseType::ReferencePose);
        pose.calculate_model_space_transforms(None);
        assert!(pose.is_model_space_valid());
        pose.set_transform(1, Transform::IDENTITY);
        assert!(!pose.is_model_space_valid());
        assert!(pose.model_space_transforms().is_none());
        assert_eq!(pose.pose_type(), PoseType::Pose);
    }

    #[test]
    fn reference_pose_model_space_matches_skeleton() {
        let skeleton = branching_skeleton();
        let mut pose = Pose::new(Arc::clone(&skeleton), PoseType::Unset);
        pose.set_to_reference_pose(true);
        assert_eq!(
            pose.model_space_transforms().unwrap(),
            skeleton.model_space_reference_pose()
        );
        pose.set_to_zero_pose(false);
        assert_eq!(pose.pose_type(), PoseType::ZeroPose);
        assert!(pose
            .parent_space_transforms()
            .iter()
            .all(|t| *t == Transform::IDENTITY));
    }

    #[test]
    fn masked_blend_only_moves_weighted_bones() {
        let skeleton = branching_skeleton();
        let mut base = Pose::new(Arc::clone(&skeleton), PoseType::ZeroPose);
        let layer = Pose::new(Arc::clone(&skeleton), PoseType::ReferencePose);
        let mask = BoneMask::from_weights(vec![0.0, 0.0, 1.0, 0.0, 1.0]);
        base.blend_toward(&layer, 1.0, Some(&mask));

        assert_eq!(base.transform(0), Transform::IDENTITY);
        assert!(base.transform(2).abs_diff_eq(&layer.transform(2), 1e-6));
        assert!(base.transform(4).abs_diff_eq(&layer.transform(4), 1e-6));
    }

    #[test]
    fn swap_exchanges_buffers() {
        let skeleton = branching_skeleton();
        let mut a = Pose::new(Arc::clone(&skeleton), PoseType::ZeroPose);
        let mut b = Pose::new(skeleton, PoseType::ReferencePose);
        a.swap_with(&mut b);
        assert_eq!(a.pose_type(), PoseType::ReferencePose);
        assert_eq!(b.pose_type(), PoseType::ZeroPose);
    }
}
