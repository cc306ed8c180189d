//! Leaf pose nodes (clips, pose-at-time) and clip selectors.

use crate::animation::AnimationSource;
use crate::context::GraphContext;
use crate::events::{SampledEvent, SampledEventData};
use crate::math::{saturate, FloatRange, Transform};

use super::handle::{BoolNodeIdx, ClipReferenceNodeIdx, FloatNodeIdx, NodeHandle, PoseNodeIdx};
use super::layer::LayerBlendSettings;
use super::state::StateSettings;
use super::state_machine::StateMachineSettings;
use super::transition::TransitionSettings;
use super::{Evaluator, GraphPoseNodeResult, PoseRuntime};

#[derive(Debug)]
pub(crate) enum PoseNode {
    ReferencePose,
    ZeroPose,
    Clip(ClipSettings),
    AnimationPose(AnimationPoseSettings),
    ClipSelector {
        options: Vec<ClipReferenceNodeIdx>,
        conditions: Vec<BoolNodeIdx>,
    },
    ParameterizedClipSelector {
        options: Vec<ClipReferenceNodeIdx>,
        parameter: FloatNodeIdx,
        /// Per-option weights, all non-zero.
        weights: Option<Vec<u8>>,
    },
    TargetSelector {
        options: Vec<ClipReferenceNodeIdx>,
    },
    LayerBlend(LayerBlendSettings),
    State(StateSettings),
    Transition(TransitionSettings),
    StateMachine(StateMachineSettings),
}

#[derive(Debug)]
pub(crate) struct ClipSettings {
    /// Data slot of the sampled animation.
    pub source: usize,
    pub speed_multiplier: f32,
    pub allow_looping: bool,
    pub sample_root_motion: bool,
    pub reset_time: Option<BoolNodeIdx>,
    pub play_in_reverse: Option<BoolNodeIdx>,
}

#[derive(Debug)]
pub(crate) struct AnimationPoseSettings {
    pub source: usize,
    pub pose_time: Option<FloatNodeIdx>,
    pub user_specified_time: f32,
    pub remap_range: Option<FloatRange>,
    pub use_frames_as_input: bool,
}

/// Root displacement from `from` to `to`, passing through `loops` clip boundaries.
fn looping_root_motion(source: &dyn AnimationSource, from: f32, to: f32, loops: i32) -> Transform {
    if loops <= 0 {
        return source.root_motion_delta(from, to);
    }
    let mut delta = source.root_motion_delta(from, 1.0);
    if loops > 1 {
        let full_loop = source.root_motion_delta(0.0, 1.0);
        for _ in 1..loops {
            delta = Transform::compose(&full_loop, &delta);
        }
    }
    Transform::compose(&source.root_motion_delta(0.0, to), &delta)
}

/// Index picked by a parameterized selector for `parameter`.
pub(crate) fn parameterized_option(parameter: f32, num_options: usize, weights: Option<&[u8]>) -> Option<usize> {
    if num_options == 0 {
        return None;
    }
    let seed = parameter.abs().floor() as u64;
    let Some(weights) = weights else {
        return Some((seed % num_options as u64) as usize);
    };

    let total: u64 = weights.iter().map(|w| u64::from(*w)).sum();
    let roll = seed % total;
    let mut boundary = 0;
    for (i, weight) in weights.iter().enumerate() {
        boundary += u64::from(*weight);
        if boundary > roll {
            return Some(i);
        }
    }
    None
}

impl<'g> Evaluator<'g> {
    pub(crate) fn update_clip(
        &mut self,
        idx: PoseNodeIdx,
        settings: &'g ClipSettings,
        ctx: &mut GraphContext<'_>,
    ) -> GraphPoseNodeResult {
        let graph = self.graph;
        let source = graph.animation(settings.source);

        if source.frame_count() <= 1 || source.duration() <= 0.0 {
            source.sample_pose_at_frame(0, self.pose_mut(idx));
            return GraphPoseNodeResult::new(idx);
        }

        let reset_time = match settings.reset_time {
            Some(node) => self.bool_value(node, ctx),
            None => false,
        };
        // Reverse playback isn't supported; the input still updates.
        if let Some(node) = settings.play_in_reverse {
            self.bool_value(node, ctx);
        }

        let timing = self.timing_mut(idx);
        timing.duration = source.duration();
        if reset_time {
            timing.current_time = 0.0;
            timing.previous_time = 0.0;
        }

        timing.previous_time = timing.current_time;
        timing.current_time += ctx.delta_time * settings.speed_multiplier / timing.duration;

        let mut loops = 0;
        if settings.allow_looping {
            if timing.current_time > 1.0 {
                loops = timing.current_time.floor() as i32;
                timing.loop_count += loops;
                timing.current_time -= loops as f32;
            }
            timing.current_time = timing.current_time.max(0.0);
        } else {
            timing.current_time = saturate(timing.current_time);
        }
        let (from, to) = (timing.previous_time, timing.current_time);

        let markers = &mut self.scratch.transition_markers;
        markers.clear();
        if loops > 0 {
            source.sample_transition_markers(from, 1.0, markers);
            source.sample_transition_markers(0.0, to, markers);
        } else {
            source.sample_transition_markers(from.min(to), from.max(to), markers);
        }
        for marker in markers.drain(..) {
            ctx.events.push(SampledEvent {
                source_node: idx.index(),
                is_from_active_branch: ctx.is_active_branch(),
                data: SampledEventData::Transition {
                    rule: marker.rule,
                    id: marker.id,
                },
            });
        }

        source.sample_pose_at_percentage(to, self.pose_mut(idx));

        let root_motion_delta = if settings.sample_root_motion {
            looping_root_motion(source, from, to, loops)
        } else {
            Transform::IDENTITY
        };
        GraphPoseNodeResult {
            pose: idx,
            root_motion_delta,
        }
    }

    pub(crate) fn update_animation_pose(
        &mut self,
        idx: PoseNodeIdx,
        settings: &'g AnimationPoseSettings,
        ctx: &mut GraphContext<'_>,
    ) -> GraphPoseNodeResult {
        let graph = self.graph;
        let source = graph.animation(settings.source);

        if source.frame_count() <= 1 {
            source.sample_pose_at_frame(0, self.pose_mut(idx));
            return GraphPoseNodeResult::new(idx);
        }

        let mut time = match settings.pose_time {
            Some(node) => self.float_value(node, ctx),
            None => settings.user_specified_time,
        };
        if let Some(range) = settings.remap_range {
            time = range.percentage_through_clamped(time);
        }
        if settings.use_frames_as_input {
            time /= (source.frame_count() - 1) as f32;
        }
        let time = saturate(time);

        let timing = self.timing_mut(idx);
        timing.duration = source.duration();
        timing.current_time = time;
        timing.previous_time = time;

        source.sample_pose_at_percentage(time, self.pose_mut(idx));
        GraphPoseNodeResult::new(idx)
    }

    fn select_option(
        &mut self,
        idx: PoseNodeIdx,
        ctx: &mut GraphContext<'_>,
    ) -> Option<ClipReferenceNodeIdx> {
        match self.pose_node(idx) {
            PoseNode::ClipSelector {
                options,
                conditions,
            } => {
                for (option, &condition) in options.iter().zip(conditions) {
                    if self.bool_value(condition, ctx) {
                        return Some(*option);
                    }
                }
                None
            }
            PoseNode::ParameterizedClipSelector {
                options,
                parameter,
                weights,
            } => {
                let value = self.float_value(*parameter, ctx);
                parameterized_option(value, options.len(), weights.as_deref()).map(|i| options[i])
            }
            // Target selection isn't supported.
            PoseNode::TargetSelector { .. } => None,
            _ => unreachable!("node {} is not a clip selector", idx.index()),
        }
    }

    /// Reselect, then forward to the chosen option and mirror its timing.
    pub(crate) fn update_selector(
        &mut self,
        idx: PoseNodeIdx,
        ctx: &mut GraphContext<'_>,
    ) -> GraphPoseNodeResult {
        let selected = self.select_option(idx, ctx);
        if let PoseRuntime::Selector(previous) = &mut self.pose_state_mut(idx).runtime {
            if *previous != selected {
                log::trace!(
                    "selector {}: option {:?} -> {:?}",
                    idx.index(),
                    previous.map(|o| o.index()),
                    selected.map(|o| o.index())
                );
            }
            *previous = selected;
        }

        match selected {
            Some(option) => {
                let result = self.update_pose(option.into(), ctx);
                self.copy_timing(option, idx);
                result
            }
            None => {
                self.pose_mut(idx).set_to_reference_pose(false);
                GraphPoseNodeResult::new(idx)
            }
        }
    }
}
