//! Transitions: a timed blend from a source (a state, another transition, or a cached pose) into
//! a target state.

use serde::{Deserialize, Serialize};

use std::sync::Arc;

use crate::context::{BranchState, GraphContext, LayerContext};
use crate::definition::{RootMotionBlendMode, TransitionDurationKind};
use crate::math::{lerp_f32, saturate, EasingOperation, Transform};
use crate::pose::{Pose, PoseType};

use super::handle::{FloatNodeIdx, NodeHandle, StateNodeIdx, TransitionNodeIdx};
use super::state::TransitionPhase;
use super::{pose_of, Evaluator, GraphPoseNodeResult, NodeState, PoseNode, PoseRuntime, PoseTiming};

/// What a transition blends out of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionSource {
    State(StateNodeIdx),
    Transition(TransitionNodeIdx),
    /// The source pose captured when the transition started.
    CachedPose,
}

#[derive(Debug, Default)]
pub(crate) struct TransitionRuntime {
    pub source: Option<TransitionSource>,
    pub progress: f32,
    pub blend_weight: f32,
    /// Resolved duration in seconds.
    pub duration: f32,
    pub cached_pose: Option<Pose>,
    pub cached_timing: PoseTiming,
}

#[derive(Debug)]
pub(crate) struct TransitionSettings {
    pub target: StateNodeIdx,
    pub duration: f32,
    pub duration_kind: TransitionDurationKind,
    pub duration_override: Option<FloatNodeIdx>,
    pub easing: EasingOperation,
    pub root_motion_blend: RootMotionBlendMode,
    pub clamp_duration: bool,
    pub cache_source_pose: bool,
}

/// How a state machine hands its current output to a starting transition.
#[derive(Clone, Debug)]
pub(crate) struct TransitionStart {
    pub source: TransitionSource,
    pub source_result: GraphPoseNodeResult,
    /// Layer context the source was updated under, before the source folded its weights in.
    pub incoming_layer: Option<LayerContext>,
}

impl TransitionStart {
    pub fn new(source: TransitionSource, source_result: GraphPoseNodeResult) -> Self {
        Self {
            source,
            source_result,
            incoming_layer: None,
        }
    }
}

impl RootMotionBlendMode {
    pub fn blend(self, source: &Transform, target: &Transform, weight: f32) -> Transform {
        match self {
            RootMotionBlendMode::Blend => Transform::interpolate(source, target, weight),
            RootMotionBlendMode::Additive => {
                let scaled = Transform::interpolate(&Transform::IDENTITY, target, weight);
                Transform::compose(&scaled, source)
            }
            RootMotionBlendMode::IgnoreSource => *target,
            RootMotionBlendMode::IgnoreTarget => *source,
        }
    }
}

impl<'g> Evaluator<'g> {
    pub(crate) fn transition_settings(&self, idx: TransitionNodeIdx) -> &'g TransitionSettings {
        match self.pose_node(idx.into()) {
            PoseNode::Transition(settings) => settings,
            _ => unreachable!("node {} is not a transition", idx.index()),
        }
    }

    pub(crate) fn transition_runtime(&self, idx: TransitionNodeIdx) -> &TransitionRuntime {
        match &self.pose_state(idx).runtime {
            PoseRuntime::Transition(runtime) => runtime,
            _ => unreachable!("node {} has no transition runtime", idx.index()),
        }
    }

    pub(crate) fn transition_runtime_mut(&mut self, idx: TransitionNodeIdx) -> &mut TransitionRuntime {
        match &mut self.pose_state_mut(idx).runtime {
            PoseRuntime::Transition(runtime) => runtime,
            _ => unreachable!("node {} has no transition runtime", idx.index()),
        }
    }

    /// Whether the next update with `ctx.delta_time` finishes the blend.
    pub(crate) fn is_transition_complete(&self, idx: TransitionNodeIdx, ctx: &GraphContext<'_>) -> bool {
        let runtime = self.transition_runtime(idx);
        if runtime.duration <= 0.0 {
            return true;
        }
        runtime.progress + ctx.delta_time / runtime.duration >= 1.0
    }

    /// Release the source chain and clear the target's transition flags.
    pub(crate) fn stop_transition(&mut self, idx: TransitionNodeIdx) {
        let target = self.transition_settings(idx).target;
        let runtime = self.transition_runtime_mut(idx);
        let source = runtime.source.take();
        runtime.cached_pose = None;
        if let Some(source) = source {
            self.release_transition_source(source);
        }
        self.stop_state(target);
        log::debug!("transition {}: complete", idx.index());
    }

    /// Clear the transition flags of everything a source was still blending out of.
    ///
    /// A source state is only stopped while it is transitioning out: if it has been re-entered
    /// as the target of a newer transition it keeps its phase.
    fn release_transition_source(&mut self, source: TransitionSource) {
        match source {
            TransitionSource::State(state) => {
                if self.state_runtime(state).phase == TransitionPhase::TransitioningOut {
                    self.stop_state(state);
                }
            }
            TransitionSource::Transition(transition) => self.stop_transition(transition),
            TransitionSource::CachedPose => {}
        }
    }

    /// Seconds the transition lasts when started from `source_timing`.
    fn resolve_transition_duration(
        &mut self,
        settings: &TransitionSettings,
        source_timing: PoseTiming,
        ctx: &mut GraphContext<'_>,
    ) -> f32 {
        let mut duration = match settings.duration_override {
            Some(node) => self.float_value(node, ctx),
            None => settings.duration,
        };
        // The whole source clip counts as one sync event.
        if settings.duration_kind == TransitionDurationKind::SyncEventPercentage {
            duration *= source_timing.duration;
        }
        if settings.clamp_duration {
            let remaining = (1.0 - source_timing.current_time) * source_timing.duration;
            duration = duration.min(remaining);
        }
        duration.max(0.0)
    }

    fn source_timing(&self, idx: TransitionNodeIdx, source: TransitionSource) -> PoseTiming {
        match source {
            TransitionSource::State(state) => self.timing(state),
            TransitionSource::Transition(transition) => self.timing(transition),
            TransitionSource::CachedPose => self.transition_runtime(idx).cached_timing,
        }
    }

    /// Start blending from `start.source` into the target state and produce the first blended
    /// result at zero progress.
    pub(crate) fn initialize_target_state_and_update_transition(
        &mut self,
        idx: TransitionNodeIdx,
        start: TransitionStart,
        ctx: &mut GraphContext<'_>,
    ) -> GraphPoseNodeResult {
        let settings = self.transition_settings(idx);
        let source_timing = self.source_timing(idx, start.source);
        let duration = self.resolve_transition_duration(settings, source_timing, ctx);

        match start.source {
            TransitionSource::State(state) => self.start_transition_out(state, ctx),
            TransitionSource::Transition(transition) => {
                let inner_target = self.transition_settings(transition).target;
                self.start_transition_out(inner_target, ctx);
            }
            TransitionSource::CachedPose => {}
        }

        self.start_state(settings.target, ctx);
        self.start_transition_in(settings.target);

        let mut source = start.source;
        let cached_pose = if settings.cache_source_pose {
            let mut pose = match self.transition_runtime_mut(idx).cached_pose.take() {
                Some(pose) => pose,
                None => Pose::new(Arc::clone(ctx.skeleton), PoseType::Unset),
            };
            pose.copy_from(pose_of(&*self.states, start.source_result.pose));
            // The captured pose stands in for the source from now on, so nothing upstream is
            // blending out any more.
            self.release_transition_source(start.source);
            source = TransitionSource::CachedPose;
            Some(pose)
        } else {
            None
        };

        *self.transition_runtime_mut(idx) = TransitionRuntime {
            source: Some(source),
            progress: 0.0,
            blend_weight: saturate(settings.easing.ease(0.0)),
            duration,
            cached_pose,
            cached_timing: source_timing,
        };
        log::debug!(
            "transition {}: {:?} -> state {} over {:.3}s",
            idx.index(),
            start.source,
            settings.target.index(),
            duration
        );

        // The source already folded its weights into the current layer context.
        let source_layer = ctx.layer_context.clone();
        let (target_result, target_layer) = ctx.with_layer_context(start.incoming_layer.clone(), |ctx| {
            self.update_state(settings.target, ctx)
        });
        if start.incoming_layer.is_some() {
            ctx.layer_context = if duration <= 0.0 {
                target_layer
            } else {
                Some(LayerContext::blend(
                    &source_layer.unwrap_or_default(),
                    &target_layer.unwrap_or_default(),
                    self.transition_runtime(idx).blend_weight,
                    ctx.skeleton.num_bones(),
                ))
            };
        }

        if duration <= 0.0 {
            if let Some(source) = self.transition_runtime_mut(idx).source.take() {
                self.release_transition_source(source);
            }
            self.copy_timing(settings.target, idx);
            return target_result;
        }

        self.blend_transition(idx, start.source_result, target_result, source_timing)
    }

    pub(crate) fn update_transition(
        &mut self,
        idx: TransitionNodeIdx,
        ctx: &mut GraphContext<'_>,
    ) -> GraphPoseNodeResult {
        let settings = self.transition_settings(idx);
        let runtime = self.transition_runtime(idx);
        let (duration, source) = (runtime.duration, runtime.source);

        let Some(mut source) = source.filter(|_| duration > 0.0) else {
            let result = self.update_state(settings.target, ctx);
            self.copy_timing(settings.target, idx);
            return result;
        };

        // A finished nested transition is replaced by the state it was blending into.
        if let TransitionSource::Transition(inner) = source {
            if self.is_transition_complete(inner, ctx) {
                let inner_target = self.transition_settings(inner).target;
                self.stop_transition(inner);
                self.state_runtime_mut(inner_target).phase = TransitionPhase::TransitioningOut;
                source = TransitionSource::State(inner_target);
                self.transition_runtime_mut(idx).source = Some(source);
            }
        }

        let runtime = self.transition_runtime_mut(idx);
        runtime.progress = saturate(runtime.progress + ctx.delta_time / duration);
        runtime.blend_weight = saturate(settings.easing.ease(runtime.progress));
        let blend_weight = runtime.blend_weight;

        let incoming_layer = ctx.layer_context.clone();
        let (source_result, source_layer) = ctx.with_layer_context(incoming_layer.clone(), |ctx| {
            ctx.with_branch_state(BranchState::Inactive, |ctx| match source {
                TransitionSource::State(state) => self.update_state(state, ctx),
                TransitionSource::Transition(transition) => self.update_transition(transition, ctx),
                TransitionSource::CachedPose => GraphPoseNodeResult::new(idx.into()),
            })
        });
        let (target_result, target_layer) = ctx.with_layer_context(incoming_layer.clone(), |ctx| {
            self.update_state(settings.target, ctx)
        });
        if incoming_layer.is_some() {
            ctx.layer_context = Some(LayerContext::blend(
                &source_layer.unwrap_or_default(),
                &target_layer.unwrap_or_default(),
                blend_weight,
                ctx.skeleton.num_bones(),
            ));
        }

        let source_timing = self.source_timing(idx, source);
        self.blend_transition(idx, source_result, target_result, source_timing)
    }

    /// Blend source and target into this transition's buffer at the current blend weight.
    fn blend_transition(
        &mut self,
        idx: TransitionNodeIdx,
        source: GraphPoseNodeResult,
        target: GraphPoseNodeResult,
        source_timing: PoseTiming,
    ) -> GraphPoseNodeResult {
        let settings = self.transition_settings(idx);
        let weight = self.transition_runtime(idx).blend_weight;

        self.write_pose_with(idx, |out, states| {
            let source_pose = match &states[idx.index()] {
                NodeState::Pose(state) => match &state.runtime {
                    PoseRuntime::Transition(TransitionRuntime {
                        source: Some(TransitionSource::CachedPose),
                        cached_pose: Some(cached),
                        ..
                    }) => cached,
                    _ => pose_of(states, source.pose),
                },
                _ => unreachable!("node {} has no pose state", idx.index()),
            };
            out.set_to_blend(source_pose, pose_of(states, target.pose), weight);
        });

        let target_timing = self.timing(settings.target);
        let timing = self.timing_mut(idx);
        timing.duration = lerp_f32(source_timing.duration, target_timing.duration, weight);
        timing.previous_time = lerp_f32(source_timing.previous_time, target_timing.previous_time, weight);
        timing.current_time = lerp_f32(source_timing.current_time, target_timing.current_time, weight);

        GraphPoseNodeResult {
            pose: idx.into(),
            root_motion_delta: settings.root_motion_blend.blend(
                &source.root_motion_delta,
                &target.root_motion_delta,
                weight,
            ),
        }
    }
}
