//! Small skeleton, clip set and evaluation harness shared by the unit tests.

use std::sync::Arc;

use glam::Vec3;

use crate::animation::{KeyframeClip, KeyframeClipData};
use crate::context::GraphContext;
use crate::definition::{GraphDefinition, NodeDefinition, TransitionRule};
use crate::events::{SampledEventsBuffer, TransitionMarker};
use crate::graph::{Graph, GraphDataSet};
use crate::math::Transform;
use crate::nodes::{pose_of, Evaluator, NodeHandle, NodeState, PoseNodeIdx, PoseTiming};
use crate::parameters::ParameterStore;
use crate::pose::Pose;
use crate::scratch::Scratch;
use crate::skeleton::{BoneMaskDefinition, Skeleton};

/// `root -> spine -> head`, translation-only reference pose, plus an "upper" mask without the root.
pub(crate) fn skeleton() -> Arc<Skeleton> {
    let mut skeleton = Skeleton::new(
        vec!["root".into(), "spine".into(), "head".into()],
        vec![None, Some(0), Some(1)],
        vec![
            Transform::IDENTITY,
            Transform::from_translation(Vec3::Y),
            Transform::from_translation(Vec3::Y * 0.5),
        ],
    )
    .unwrap();
    skeleton
        .add_bone_mask(BoneMaskDefinition {
            id: "upper".into(),
            weights: vec![0.0, 1.0, 1.0],
        })
        .unwrap();
    Arc::new(skeleton)
}

fn clip(
    skeleton: &Skeleton,
    name: &str,
    frames: usize,
    root_step: f32,
    transition_markers: Vec<TransitionMarker>,
) -> Arc<KeyframeClip> {
    let frame_poses = (0..frames)
        .map(|f| {
            vec![
                Transform::IDENTITY,
                Transform::from_translation(Vec3::new(f as f32, 1.0, 0.0)),
                Transform::from_translation(Vec3::Y * 0.5),
            ]
        })
        .collect();
    let root_motion = (0..frames)
        .map(|f| Transform::from_translation(Vec3::X * root_step * f as f32))
        .collect();
    let data = KeyframeClipData {
        name: name.into(),
        fps: 1.0,
        frames: frame_poses,
        root_motion,
        transition_markers,
    };
    Arc::new(KeyframeClip::new(data, skeleton).unwrap())
}

/// Slots: 0 "walk" (2s, root moves 1/s along x), 1 "run" (1s, 2/s), 2 a single frame pose,
/// 3 a 1s clip whose second half carries an "exit" transition marker.
pub(crate) fn data_set() -> GraphDataSet {
    let skeleton = skeleton();
    let marker = TransitionMarker {
        start: 0.5,
        end: 1.0,
        rule: TransitionRule::AllowTransition,
        id: Some("exit".into()),
    };
    GraphDataSet::new(Arc::clone(&skeleton))
        .with_animation(clip(&skeleton, "walk", 3, 1.0, vec![]))
        .with_animation(clip(&skeleton, "run", 2, 2.0, vec![]))
        .with_animation(clip(&skeleton, "pose", 1, 0.0, vec![]))
        .with_animation(clip(&skeleton, "marked", 2, 0.0, vec![marker]))
}

/// A graph built from a bare node list, with direct access to the evaluator.
///
/// A reference pose root is appended so any node list builds. Control parameter nodes must
/// come first; they are named after `parameters` in order.
pub(crate) struct Harness {
    graph: Arc<Graph>,
    states: Vec<NodeState>,
    scratch: Scratch,
    pub parameters: ParameterStore,
    pub events: SampledEventsBuffer,
}

impl Harness {
    pub fn new(nodes: Vec<NodeDefinition>) -> Self {
        Self::with_parameters(nodes, &[])
    }

    pub fn with_parameters(mut nodes: Vec<NodeDefinition>, parameters: &[&str]) -> Self {
        let root_node_idx = nodes.len() as i16;
        nodes.push(NodeDefinition::ReferencePose);
        let definition = GraphDefinition {
            id: "harness".into(),
            root_node_idx,
            control_parameter_ids: parameters.iter().map(|p| p.to_string()).collect(),
            virtual_parameter_ids: vec![],
            virtual_parameter_node_indices: vec![],
            nodes,
        };
        let graph = Graph::new(&definition, data_set()).unwrap();
        let states = graph
            .nodes
            .iter()
            .map(|node| NodeState::new(node, graph.skeleton()))
            .collect();
        let mut harness = Self {
            scratch: Scratch::new(graph.skeleton()),
            parameters: ParameterStore::from_layout(graph.parameters()),
            events: SampledEventsBuffer::new(64),
            states,
            graph,
        };
        harness.reset();
        harness
    }

    /// Reset every node, in index order.
    pub fn reset(&mut self) {
        let all: Vec<usize> = (0..self.graph.num_nodes()).collect();
        self.eval(0.0, |ev, ctx| ev.reset_subgraph(&all, ctx));
    }

    /// Run `f` as one update of `delta_time` seconds. Events from the previous call are dropped.
    pub fn eval<R>(
        &mut self,
        delta_time: f32,
        f: impl FnOnce(&mut Evaluator<'_>, &mut GraphContext<'_>) -> R,
    ) -> R {
        self.events.clear();
        self.scratch.begin_frame();
        let mut ctx = GraphContext::new(
            delta_time,
            &self.parameters,
            self.graph.skeleton(),
            &mut self.events,
        );
        let mut evaluator = Evaluator::new(&self.graph, &mut self.states, &mut self.scratch);
        f(&mut evaluator, &mut ctx)
    }

    pub fn timing(&self, idx: PoseNodeIdx) -> PoseTiming {
        match &self.states[idx.index()] {
            NodeState::Pose(state) => state.timing,
            _ => panic!("node {} is not a pose node", idx.index()),
        }
    }

    pub fn pose(&self, idx: PoseNodeIdx) -> &Pose {
        pose_of(&self.states, idx)
    }

    pub fn skeleton(&self) -> &Arc<Skeleton> {
        self.graph.skeleton()
    }
}
