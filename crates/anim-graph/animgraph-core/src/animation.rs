//! Animation sources: the boundary through which clip data reaches the graph.
//!
//! The graph never decodes clip data itself. Hosts implement [`AnimationSource`] over whatever
//! storage they use; [`KeyframeClip`] is a small in-memory implementation backed by dense
//! per-frame bone transforms.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};
use crate::events::TransitionMarker;
use crate::math::Transform;
use crate::pose::Pose;
use crate::skeleton::Skeleton;

/// Read-only clip sampler bound to a graph data slot.
pub trait AnimationSource: Send + Sync + Debug {
    /// Clip length in seconds.
    fn duration(&self) -> f32;

    fn frame_count(&self) -> u32;

    /// Fill `pose` with the clip sampled at a normalised time in `[0, 1]`.
    fn sample_pose_at_percentage(&self, percentage: f32, pose: &mut Pose);

    fn sample_pose_at_frame(&self, frame: u32, pose: &mut Pose);

    /// Root displacement between two normalised times, `from <= to`.
    fn root_motion_delta(&self, _from: f32, _to: f32) -> Transform {
        Transform::IDENTITY
    }

    /// Append the transition markers overlapping `[from, to]` (normalised, `from <= to`).
    fn sample_transition_markers(&self, _from: f32, _to: f32, _out: &mut Vec<TransitionMarker>) {}
}

/// Serialized keyframe clip: one full parent-space pose per frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyframeClipData {
    pub name: String,
    pub fps: f32,
    pub frames: Vec<Vec<Transform>>,
    /// Optional model-space root track, one entry per frame.
    #[serde(default)]
    pub root_motion: Vec<Transform>,
    #[serde(default)]
    pub transition_markers: Vec<TransitionMarker>,
}

#[derive(Clone, Debug)]
pub struct KeyframeClip {
    data: KeyframeClipData,
}

impl KeyframeClip {
    /// Validate clip data against the skeleton it will be sampled into.
    pub fn new(data: KeyframeClipData, skeleton: &Skeleton) -> GraphResult<Self> {
        let invalid = |reason: String| GraphError::InvalidClip {
            name: data.name.clone(),
            reason,
        };
        if data.frames.is_empty() {
            return Err(invalid("clip has no frames".into()));
        }
        if !(data.fps > 0.0) {
            return Err(invalid(format!("fps must be positive, got {}", data.fps)));
        }
        if let Some((idx, frame)) = data
            .frames
            .iter()
            .enumerate()
            .find(|(_, f)| f.len() != skeleton.num_bones())
        {
            return Err(invalid(format!(
                "frame {idx} has {} transforms for {} bones",
                frame.len(),
                skeleton.num_bones()
            )));
        }
        if !data.root_motion.is_empty() && data.root_motion.len() != data.frames.len() {
            return Err(invalid(format!(
                "root track has {} entries for {} frames",
                data.root_motion.len(),
                data.frames.len()
            )));
        }
        Ok(Self { data })
    }

    pub fn from_json(json: &str, skeleton: &Skeleton) -> GraphResult<Self> {
        let data: KeyframeClipData = serde_json::from_str(json)?;
        Self::new(data, skeleton)
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    /// Frame pair and blend factor for a normalised time.
    fn frame_span(&self, percentage: f32) -> (usize, usize, f32) {
        let last = self.data.frames.len() - 1;
        let frame_time = percentage.clamp(0.0, 1.0) * last as f32;
        let lower = (frame_time.floor() as usize).min(last);
        let upper = (lower + 1).min(last);
        (lower, upper, frame_time - lower as f32)
    }

    fn root_at(&self, percentage: f32) -> Transform {
        let (lower, upper, t) = self.frame_span(percentage);
        Transform::interpolate(&self.data.root_motion[lower], &self.data.root_motion[upper], t)
    }
}

impl AnimationSource for KeyframeClip {
    fn duration(&self) -> f32 {
        (self.data.frames.len() - 1) as f32 / self.data.fps
    }

    fn frame_count(&self) -> u32 {
        self.data.frames.len() as u32
    }

    fn sample_pose_at_percentage(&self, percentage: f32, pose: &mut Pose) {
        let (lower, upper, t) = self.frame_span(percentage);
        let (a, b) = (&self.data.frames[lower], &self.data.frames[upper]);
        for (bone, out) in pose.parent_space_transforms_mut().iter_mut().enumerate() {
            *out = Transform::interpolate(&a[bone], &b[bone], t);
        }
    }

    fn sample_pose_at_frame(&self, frame: u32, pose: &mut Pose) {
        let idx = (frame as usize).min(self.data.frames.len() - 1);
        pose.set_transforms(&self.data.frames[idx]);
    }

    fn root_motion_delta(&self, from: f32, to: f32) -> Transform {
        if self.data.root_motion.is_empty() {
            return Transform::IDENTITY;
        }
        Transform::delta(&self.root_at(from), &self.root_at(to))
    }

    fn sample_transition_markers(&self, from: f32, to: f32, out: &mut Vec<TransitionMarker>) {
        out.extend(
            self.data
                .transition_markers
                .iter()
                .filter(|m| m.overlaps(from, to))
                .cloned(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::PoseType;
    use glam::Vec3;
    use std::sync::Arc;

    fn skeleton() -> Arc<Skeleton> {
        Arc::new(
            Skeleton::new(
                vec!["root".into(), "child".into()],
                vec![None, Some(0)],
                vec![Transform::IDENTITY; 2],
            )
            .unwrap(),
        )
    }

    fn clip(skel: &Skeleton) -> KeyframeClip {
        let frames = (0..3)
            .map(|f| {
                vec![
                    Transform::IDENTITY,
                    Transform::from_translation(Vec3::X * f as f32),
                ]
            })
            .collect();
        let root_motion = (0..3)
            .map(|f| Transform::from_translation(Vec3::Z * f as f32))
            .collect();
        KeyframeClip::new(
            KeyframeClipData {
                name: "walk".into(),
                fps: 2.0,
                frames,
                root_motion,
                transition_markers: vec![],
            },
            skel,
        )
        .unwrap()
    }

    #[test]
    fn duration_and_sampling() {
        let skel = skeleton();
        let clip = clip(&skel);
        assert_eq!(clip.duration(), 1.0);
        assert_eq!(clip.frame_count(), 3);

        let mut pose = Pose::new(Arc::clone(&skel), PoseType::ReferencePose);
        clip.sample_pose_at_percentage(0.25, &mut pose);
        assert!((pose.transform(1).translation.x - 0.5).abs() < 1e-6);
        assert_eq!(pose.pose_type(), PoseType::Pose);

        clip.sample_pose_at_frame(2, &mut pose);
        assert_eq!(pose.transform(1).translation, Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn root_motion_is_relative() {
        let skel = skeleton();
        let clip = clip(&skel);
        let delta = clip.root_motion_delta(0.5, 1.0);
        assert!(delta.translation.abs_diff_eq(Vec3::Z, 1e-6));
    }

    #[test]
    fn rejects_mismatched_frames() {
        let skel = skeleton();
        let err = KeyframeClip::new(
            KeyframeClipData {
                name: "bad".into(),
                fps: 30.0,
                frames: vec![vec![Transform::IDENTITY]],
                root_motion: vec![],
                transition_markers: vec![],
            },
            &skel,
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::InvalidClip { .. }));
    }
}
