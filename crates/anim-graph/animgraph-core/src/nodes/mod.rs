//! Node settings, per-instance node state and the evaluator that walks them.
//!
//! A built [`Graph`] holds one [`NodeSettings`] per node: immutable configuration with children
//! resolved to typed handles. Each instance keeps a parallel table of [`NodeState`]. The
//! [`Evaluator`] borrows both (settings shared, state mutable) for the duration of one update;
//! the per-kind `impl Evaluator` blocks live in the submodules.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::GraphContext;
use crate::graph::Graph;
use crate::math::Transform;
use crate::pose::{Pose, PoseType};
use crate::scratch::Scratch;
use crate::skeleton::Skeleton;

mod bone_mask_nodes;
mod bool_nodes;
mod build;
mod float_nodes;
mod handle;
mod id_nodes;
mod layer;
mod pose_nodes;
mod state;
mod state_machine;
mod transition;

pub use build::GraphBuildContext;
pub use handle::{
    BoneMaskNodeIdx, BoolNodeIdx, ClipReferenceNodeIdx, FloatNodeIdx, IdNodeIdx, NodeHandle,
    PoseNodeIdx, StateNodeIdx, TransitionNodeIdx,
};
pub use state::TransitionPhase;
pub use transition::TransitionSource;

pub(crate) use bone_mask_nodes::{BoneMaskNode, BoneMaskSelectorState};
pub(crate) use bool_nodes::BoolNode;
pub(crate) use float_nodes::{EaseState, FloatNode};
pub(crate) use id_nodes::IdNode;
pub(crate) use pose_nodes::{AnimationPoseSettings, ClipSettings, PoseNode};
pub(crate) use state::StateRuntime;
pub(crate) use state_machine::StateMachineRuntime;
pub(crate) use transition::TransitionRuntime;

#[derive(Debug)]
pub(crate) enum NodeSettings {
    Bool(BoolNode),
    Float(FloatNode),
    Id(IdNode),
    BoneMask(BoneMaskNode),
    Pose(PoseNode),
}

/// Timing shared by every pose node. Times are normalised to `[0, 1]`; duration is in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseTiming {
    pub loop_count: i32,
    pub duration: f32,
    pub current_time: f32,
    pub previous_time: f32,
}

/// Output of a pose node update: the node whose buffer holds the pose, and the root displacement
/// accumulated this update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GraphPoseNodeResult {
    pub pose: PoseNodeIdx,
    pub root_motion_delta: Transform,
}

impl GraphPoseNodeResult {
    #[inline]
    pub fn new(pose: PoseNodeIdx) -> Self {
        Self {
            pose,
            root_motion_delta: Transform::IDENTITY,
        }
    }
}

/// Value kept by cached value nodes until their next reset.
#[derive(Clone, Debug, Default)]
pub(crate) struct CachedValue<T> {
    pub value: T,
    pub has_cached: bool,
}

#[derive(Debug)]
pub(crate) enum NodeState {
    Stateless,
    CachedBool(CachedValue<bool>),
    CachedFloat(CachedValue<f32>),
    CachedId(CachedValue<String>),
    Ease(EaseState),
    BoneMaskSelector(BoneMaskSelectorState),
    Pose(Box<PoseNodeState>),
}

#[derive(Debug)]
pub(crate) struct PoseNodeState {
    pub timing: PoseTiming,
    pub pose: Pose,
    pub runtime: PoseRuntime,
}

#[derive(Debug)]
pub(crate) enum PoseRuntime {
    Leaf,
    Selector(Option<ClipReferenceNodeIdx>),
    State(StateRuntime),
    StateMachine(StateMachineRuntime),
    Transition(TransitionRuntime),
}

impl NodeState {
    pub(crate) fn new(settings: &NodeSettings, skeleton: &Arc<Skeleton>) -> Self {
        match settings {
            NodeSettings::Bool(BoolNode::Cached { .. }) => NodeState::CachedBool(CachedValue::default()),
            NodeSettings::Float(FloatNode::Cached { .. }) => {
                NodeState::CachedFloat(CachedValue::default())
            }
            NodeSettings::Float(FloatNode::Ease { .. } | FloatNode::Selector { .. }) => {
                NodeState::Ease(EaseState::default())
            }
            NodeSettings::Id(IdNode::Cached { .. }) => NodeState::CachedId(CachedValue::default()),
            NodeSettings::BoneMask(BoneMaskNode::Selector { .. }) => {
                NodeState::BoneMaskSelector(BoneMaskSelectorState::default())
            }
            NodeSettings::Pose(node) => {
                let runtime = match node {
                    PoseNode::ClipSelector { .. }
                    | PoseNode::ParameterizedClipSelector { .. }
                    | PoseNode::TargetSelector { .. } => PoseRuntime::Selector(None),
                    PoseNode::State(_) => PoseRuntime::State(StateRuntime::default()),
                    PoseNode::StateMachine(settings) => {
                        PoseRuntime::StateMachine(StateMachineRuntime::new(settings.default_state))
                    }
                    PoseNode::Transition(_) => PoseRuntime::Transition(TransitionRuntime::default()),
                    _ => PoseRuntime::Leaf,
                };
                NodeState::Pose(Box::new(PoseNodeState {
                    timing: PoseTiming::default(),
                    pose: Pose::new(Arc::clone(skeleton), PoseType::ReferencePose),
                    runtime,
                }))
            }
            _ => NodeState::Stateless,
        }
    }
}

/// Pose buffer of a pose node inside a state table.
pub(crate) fn pose_of(states: &[NodeState], idx: PoseNodeIdx) -> &Pose {
    match &states[idx.index()] {
        NodeState::Pose(state) => &state.pose,
        _ => unreachable!("node {} is not a pose node", idx.index()),
    }
}

fn pose_slot(states: &mut [NodeState], idx: PoseNodeIdx) -> &mut Pose {
    match &mut states[idx.index()] {
        NodeState::Pose(state) => &mut state.pose,
        _ => unreachable!("node {} is not a pose node", idx.index()),
    }
}

pub(crate) struct Evaluator<'g> {
    pub graph: &'g Graph,
    pub states: &'g mut [NodeState],
    pub scratch: &'g mut Scratch,
}

impl<'g> Evaluator<'g> {
    pub fn new(graph: &'g Graph, states: &'g mut [NodeState], scratch: &'g mut Scratch) -> Self {
        Self {
            graph,
            states,
            scratch,
        }
    }

    #[inline]
    pub(crate) fn node(&self, idx: usize) -> &'g NodeSettings {
        let graph: &'g Graph = self.graph;
        &graph.nodes[idx]
    }

    #[inline]
    pub(crate) fn pose_node(&self, idx: PoseNodeIdx) -> &'g PoseNode {
        match self.node(idx.index()) {
            NodeSettings::Pose(node) => node,
            _ => unreachable!("node {} is not a pose node", idx.index()),
        }
    }

    #[inline]
    pub(crate) fn pose_state(&self, idx: impl Into<PoseNodeIdx>) -> &PoseNodeState {
        let idx = idx.into();
        match &self.states[idx.index()] {
            NodeState::Pose(state) => state,
            _ => unreachable!("node {} has no pose state", idx.index()),
        }
    }

    #[inline]
    pub(crate) fn pose_state_mut(&mut self, idx: impl Into<PoseNodeIdx>) -> &mut PoseNodeState {
        let idx = idx.into();
        match &mut self.states[idx.index()] {
            NodeState::Pose(state) => state,
            _ => unreachable!("node {} has no pose state", idx.index()),
        }
    }

    #[inline]
    pub(crate) fn timing(&self, idx: impl Into<PoseNodeIdx>) -> PoseTiming {
        self.pose_state(idx).timing
    }

    #[inline]
    pub(crate) fn timing_mut(&mut self, idx: impl Into<PoseNodeIdx>) -> &mut PoseTiming {
        &mut self.pose_state_mut(idx).timing
    }

    /// Mirror `from`'s timing onto `to`.
    #[inline]
    pub(crate) fn copy_timing(&mut self, from: impl Into<PoseNodeIdx>, to: impl Into<PoseNodeIdx>) {
        let timing = self.timing(from);
        *self.timing_mut(to) = timing;
    }

    #[inline]
    pub(crate) fn pose_mut(&mut self, idx: impl Into<PoseNodeIdx>) -> &mut Pose {
        &mut self.pose_state_mut(idx).pose
    }

    /// Run `f` with mutable access to `dest`'s pose buffer and shared access to every node state.
    ///
    /// The buffer is parked in the scratch pose while `f` runs, so `f` can read other nodes'
    /// buffers (and `dest`'s own runtime) through the state table.
    pub(crate) fn write_pose_with<R>(
        &mut self,
        dest: impl Into<PoseNodeIdx>,
        f: impl FnOnce(&mut Pose, &[NodeState]) -> R,
    ) -> R {
        let dest = dest.into();
        let Self { states, scratch, .. } = self;
        std::mem::swap(&mut scratch.pose, pose_slot(&mut **states, dest));
        let out = f(&mut scratch.pose, &**states);
        std::mem::swap(&mut scratch.pose, pose_slot(&mut **states, dest));
        out
    }

    pub(crate) fn update_pose(
        &mut self,
        idx: PoseNodeIdx,
        ctx: &mut GraphContext<'_>,
    ) -> GraphPoseNodeResult {
        match self.pose_node(idx) {
            PoseNode::ReferencePose => {
                self.pose_mut(idx).set_to_reference_pose(false);
                GraphPoseNodeResult::new(idx)
            }
            PoseNode::ZeroPose => {
                self.pose_mut(idx).set_to_zero_pose(false);
                GraphPoseNodeResult::new(idx)
            }
            PoseNode::Clip(settings) => self.update_clip(idx, settings, ctx),
            PoseNode::AnimationPose(settings) => self.update_animation_pose(idx, settings, ctx),
            PoseNode::ClipSelector { .. }
            | PoseNode::ParameterizedClipSelector { .. }
            | PoseNode::TargetSelector { .. } => self.update_selector(idx, ctx),
            PoseNode::LayerBlend(settings) => self.update_layer_blend(idx, settings, ctx),
            PoseNode::State(_) => self.update_state(StateNodeIdx(idx.0), ctx),
            PoseNode::Transition(_) => self.update_transition(TransitionNodeIdx(idx.0), ctx),
            PoseNode::StateMachine(settings) => self.update_state_machine(idx, settings, ctx),
        }
    }

    /// Reset each node in `nodes`, in order. Lists built by the graph are children-first, so a
    /// node's inputs are already reset when it resets.
    pub(crate) fn reset_subgraph(&mut self, nodes: &[usize], ctx: &mut GraphContext<'_>) {
        for &idx in nodes {
            self.reset_node(idx, ctx);
        }
    }

    fn reset_node(&mut self, idx: usize, ctx: &mut GraphContext<'_>) {
        match self.node(idx) {
            NodeSettings::Bool(_) => {
                if let NodeState::CachedBool(cached) = &mut self.states[idx] {
                    *cached = CachedValue::default();
                }
            }
            NodeSettings::Id(_) => {
                if let NodeState::CachedId(cached) = &mut self.states[idx] {
                    *cached = CachedValue::default();
                }
            }
            NodeSettings::Float(node) => self.reset_float(idx, node, ctx),
            NodeSettings::BoneMask(node) => self.reset_bone_mask(idx, node, ctx),
            NodeSettings::Pose(node) => self.reset_pose(PoseNodeIdx(idx as u16), node, ctx),
        }
    }

    fn reset_pose(&mut self, idx: PoseNodeIdx, node: &'g PoseNode, ctx: &mut GraphContext<'_>) {
        *self.timing_mut(idx) = PoseTiming::default();
        match node {
            PoseNode::ReferencePose => self.pose_mut(idx).set_to_reference_pose(false),
            PoseNode::ZeroPose => self.pose_mut(idx).set_to_zero_pose(false),
            PoseNode::Clip(ClipSettings { source, .. })
            | PoseNode::AnimationPose(AnimationPoseSettings { source, .. }) => {
                let duration = self.graph.animation(*source).duration();
                self.timing_mut(idx).duration = duration;
            }
            PoseNode::ClipSelector { .. }
            | PoseNode::ParameterizedClipSelector { .. }
            | PoseNode::TargetSelector { .. } => {
                if let PoseRuntime::Selector(selected) = &mut self.pose_state_mut(idx).runtime {
                    *selected = None;
                }
            }
            PoseNode::LayerBlend(_) => {}
            PoseNode::State(_) => self.start_state(StateNodeIdx(idx.0), ctx),
            PoseNode::Transition(_) => {
                *self.transition_runtime_mut(TransitionNodeIdx(idx.0)) = TransitionRuntime::default();
            }
            PoseNode::StateMachine(settings) => self.reset_state_machine(idx, settings, ctx),
        }
    }
}

/// Typed access to a cached value node's slot in the state table.
pub(crate) trait CachedSlot: Clone {
    fn slot(state: &mut NodeState) -> &mut CachedValue<Self>;
}

macro_rules! cached_slot {
    ($ty:ty, $variant:ident) => {
        impl CachedSlot for $ty {
            #[inline]
            fn slot(state: &mut NodeState) -> &mut CachedValue<Self> {
                match state {
                    NodeState::$variant(cached) => cached,
                    _ => unreachable!(concat!("expected ", stringify!($variant), " state")),
                }
            }
        }
    };
}

cached_slot!(bool, CachedBool);
cached_slot!(f32, CachedFloat);
cached_slot!(String, CachedId);

impl<'g> Evaluator<'g> {
    /// Shared cached-value logic for bool, float and id nodes.
    ///
    /// `OnEntry` keeps the first value produced after a reset. `OnExit` follows the input while
    /// the branch is active and freezes on the first inactive evaluation.
    pub(crate) fn cached_value<T: CachedSlot>(
        &mut self,
        idx: usize,
        mode: crate::definition::CachedValueMode,
        ctx: &mut GraphContext<'_>,
        input: impl FnOnce(&mut Self, &mut GraphContext<'_>) -> T,
    ) -> T {
        use crate::definition::CachedValueMode;

        let slot = T::slot(&mut self.states[idx]);
        if slot.has_cached {
            return slot.value.clone();
        }
        match mode {
            CachedValueMode::OnEntry => {
                let value = input(self, ctx);
                let slot = T::slot(&mut self.states[idx]);
                slot.value = value.clone();
                slot.has_cached = true;
                value
            }
            CachedValueMode::OnExit if ctx.is_active_branch() => {
                let value = input(self, ctx);
                T::slot(&mut self.states[idx]).value = value.clone();
                value
            }
            CachedValueMode::OnExit => {
                slot.has_cached = true;
                slot.value.clone()
            }
        }
    }
}
