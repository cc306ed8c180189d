//! Per-character runtime: node state, parameters and the output pose of one graph.

use std::sync::Arc;

use crate::config::GraphConfig;
use crate::context::GraphContext;
use crate::error::GraphResult;
use crate::events::{SampledEvent, SampledEventsBuffer};
use crate::graph::Graph;
use crate::math::Transform;
use crate::nodes::{
    pose_of, Evaluator, GraphPoseNodeResult, NodeState, PoseRuntime, PoseTiming, TransitionPhase,
};
use crate::parameters::{ParameterStore, ParameterValue};
use crate::pose::{Pose, PoseType};
use crate::scratch::Scratch;

/// One evaluation of a shared [`Graph`].
///
/// The instance owns everything that changes while the graph plays: node runtimes, pose buffers,
/// control parameter values and the events sampled during the last update.
#[derive(Debug)]
pub struct GraphInstance {
    graph: Arc<Graph>,
    config: GraphConfig,
    states: Vec<NodeState>,
    scratch: Scratch,
    parameters: ParameterStore,
    events: SampledEventsBuffer,
    output: Pose,
    root_motion_delta: Transform,
}

impl GraphInstance {
    /// Allocate node state, apply the configured parameter overrides and reset the graph.
    pub fn new(graph: Arc<Graph>, config: GraphConfig) -> GraphResult<Self> {
        let skeleton = Arc::clone(graph.skeleton());
        let states = graph
            .nodes
            .iter()
            .map(|node| NodeState::new(node, &skeleton))
            .collect();

        let mut parameters = ParameterStore::from_layout(graph.parameters());
        for (name, value) in &config.initial_bool_parameters {
            parameters.set_bool(name, *value)?;
        }
        for (name, value) in &config.initial_float_parameters {
            parameters.set_float(name, *value)?;
        }
        for (name, value) in &config.initial_id_parameters {
            parameters.set_id(name, value.as_str())?;
        }

        let mut instance = Self {
            scratch: Scratch::new(&skeleton),
            events: SampledEventsBuffer::new(config.max_sampled_events),
            output: Pose::new(skeleton, PoseType::ReferencePose),
            root_motion_delta: Transform::IDENTITY,
            graph,
            config,
            states,
            parameters,
        };
        instance.reset();
        Ok(instance)
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Re-initialise every node reachable from the root, as if the instance was just created.
    /// Parameter values are kept.
    pub fn reset(&mut self) {
        self.events.clear();
        self.scratch.begin_frame();
        let graph = Arc::clone(&self.graph);
        let mut ctx = GraphContext::new(0.0, &self.parameters, graph.skeleton(), &mut self.events);
        let mut evaluator = Evaluator::new(&graph, &mut self.states, &mut self.scratch);
        evaluator.reset_subgraph(&graph.root_subgraph, &mut ctx);

        self.output.set_to_reference_pose(self.config.calculate_model_space_pose);
        self.root_motion_delta = Transform::IDENTITY;
        log::debug!("graph `{}`: reset {} node(s)", graph.id(), graph.root_subgraph.len());
    }

    /// Advance the graph by `delta_time` seconds and refresh the output pose.
    pub fn update(&mut self, delta_time: f32) -> GraphPoseNodeResult {
        self.events.clear();
        self.scratch.begin_frame();

        let result = {
            let mut ctx = GraphContext::new(
                delta_time,
                &self.parameters,
                self.graph.skeleton(),
                &mut self.events,
            );
            let mut evaluator = Evaluator::new(&self.graph, &mut self.states, &mut self.scratch);
            evaluator.update_pose(self.graph.root(), &mut ctx)
        };

        self.output.copy_from(pose_of(&self.states, result.pose));
        if self.config.calculate_model_space_pose {
            self.output
                .calculate_model_space_transforms(self.config.num_relevant_bones);
        }
        self.root_motion_delta = result.root_motion_delta;
        result
    }

    // --- Parameters ---

    pub fn parameters(&self) -> &ParameterStore {
        &self.parameters
    }

    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters.index_of(name)
    }

    pub fn set_parameter(&mut self, name: &str, value: ParameterValue) -> GraphResult<()> {
        self.parameters.set(name, value)
    }

    pub fn set_bool(&mut self, name: &str, value: bool) -> GraphResult<()> {
        self.parameters.set_bool(name, value)
    }

    pub fn set_float(&mut self, name: &str, value: f32) -> GraphResult<()> {
        self.parameters.set_float(name, value)
    }

    pub fn set_id(&mut self, name: &str, value: impl Into<String>) -> GraphResult<()> {
        self.parameters.set_id(name, value)
    }

    pub fn bool(&self, name: &str) -> GraphResult<bool> {
        self.parameters.bool(name)
    }

    pub fn float(&self, name: &str) -> GraphResult<f32> {
        self.parameters.float(name)
    }

    pub fn id(&self, name: &str) -> GraphResult<&str> {
        self.parameters.id(name)
    }

    // --- Output and inspection ---

    /// Pose produced by the last update.
    pub fn output_pose(&self) -> &Pose {
        &self.output
    }

    /// Buffer referenced by an update result. Only valid until the next update.
    pub fn pose(&self, result: &GraphPoseNodeResult) -> &Pose {
        pose_of(&self.states, result.pose)
    }

    /// Root displacement accumulated by the last update.
    pub fn root_motion_delta(&self) -> Transform {
        self.root_motion_delta
    }

    /// Events sampled during the last update, in sampling order.
    pub fn sampled_events(&self) -> &[SampledEvent] {
        self.events.events()
    }

    fn pose_runtime(&self, node: usize) -> Option<&PoseRuntime> {
        match self.states.get(node)? {
            NodeState::Pose(state) => Some(&state.runtime),
            _ => None,
        }
    }

    /// Timing of the pose node at `node`, or `None` for other node kinds.
    pub fn pose_node_timing(&self, node: usize) -> Option<PoseTiming> {
        match self.states.get(node)? {
            NodeState::Pose(state) => Some(state.timing),
            _ => None,
        }
    }

    /// Index (into the machine's state list) of the active state of the state machine at `node`.
    pub fn active_state_index(&self, node: usize) -> Option<usize> {
        match self.pose_runtime(node)? {
            PoseRuntime::StateMachine(runtime) => Some(runtime.active_state),
            _ => None,
        }
    }

    /// Progress in `[0, 1]` of the transition at `node`. `None` while it is not blending.
    pub fn transition_progress(&self, node: usize) -> Option<f32> {
        match self.pose_runtime(node)? {
            PoseRuntime::Transition(runtime) if runtime.source.is_some() => Some(runtime.progress),
            _ => None,
        }
    }

    pub fn state_phase(&self, node: usize) -> Option<TransitionPhase> {
        match self.pose_runtime(node)? {
            PoseRuntime::State(runtime) => Some(runtime.phase),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::test_support;
    use approx::assert_relative_eq;
    use glam::Vec3;

    const LOCOMOTION: &str = r#"{
        "id": "locomotion",
        "root_node_idx": 9,
        "control_parameter_ids": ["speed"],
        "nodes": [
            { "type": "ControlParameterFloat" },
            { "type": "FloatComparison", "input_value_node_idx": 0, "comparand": 0.5,
              "comparison": "GreaterThanEqual" },
            { "type": "Not", "input_value_node_idx": 1 },
            { "type": "Clip", "data_slot_idx": 0 },
            { "type": "State", "child_node_idx": 3, "entry_events": ["walk"] },
            { "type": "Clip", "data_slot_idx": 1 },
            { "type": "State", "child_node_idx": 5, "entry_events": ["run"] },
            { "type": "Transition", "target_state_node_idx": 6, "duration": 0.2 },
            { "type": "Transition", "target_state_node_idx": 4, "duration": 0.2 },
            { "type": "StateMachine", "states": [
                { "state_node_idx": 4, "transitions": [
                    { "transition_node_idx": 7, "condition_node_idx": 1, "target_state_idx": 1 } ] },
                { "state_node_idx": 6, "transitions": [
                    { "transition_node_idx": 8, "condition_node_idx": 2, "target_state_idx": 0 } ] }
            ] }
        ]
    }"#;

    fn instance(config: GraphConfig) -> GraphInstance {
        let graph = Graph::from_json(LOCOMOTION, test_support::data_set()).unwrap();
        GraphInstance::new(graph, config).unwrap()
    }

    #[test]
    fn update_plays_the_entry_state() {
        let mut inst = instance(GraphConfig::default());
        let result = inst.update(0.5);
        assert_eq!(inst.active_state_index(9), Some(0));
        assert_relative_eq!(inst.pose_node_timing(3).unwrap().current_time, 0.25);
        assert!(inst.root_motion_delta().translation.abs_diff_eq(Vec3::X * 0.5, 1e-5));
        assert_eq!(inst.pose(&result).transform(1), inst.output_pose().transform(1));
        assert_eq!(inst.sampled_events()[0].graph_event().map(|e| e.1), Some("walk"));
    }

    #[test]
    fn parameter_drives_a_transition() {
        let mut inst = instance(GraphConfig::default());
        inst.update(0.1);
        inst.set_float("speed", 1.0).unwrap();
        inst.update(0.1);
        assert_eq!(inst.active_state_index(9), Some(1));
        assert_eq!(inst.transition_progress(7), Some(0.0));
        assert_eq!(inst.state_phase(4), Some(TransitionPhase::TransitioningOut));

        inst.update(0.1);
        assert_relative_eq!(inst.transition_progress(7).unwrap(), 0.5);
        inst.update(0.1);
        inst.update(0.1);
        assert_eq!(inst.transition_progress(7), None);
        assert_eq!(inst.state_phase(6), Some(TransitionPhase::None));
        assert_eq!(inst.state_phase(4), Some(TransitionPhase::None));
    }

    #[test]
    fn walk_run_walk_round_trip() {
        let mut inst = instance(GraphConfig::default());
        inst.update(0.1);
        for (speed, state, transition) in [(1.0, 1, 7), (0.0, 0, 8), (1.0, 1, 7)] {
            inst.set_float("speed", speed).unwrap();
            inst.update(0.1);
            assert_eq!(inst.active_state_index(9), Some(state));
            assert_eq!(inst.transition_progress(transition), Some(0.0));
            for _ in 0..4 {
                inst.update(0.1);
            }
            assert_eq!(inst.transition_progress(transition), None);
            assert_eq!(inst.state_phase(4), Some(TransitionPhase::None));
            assert_eq!(inst.state_phase(6), Some(TransitionPhase::None));
        }
    }

    #[test]
    fn initial_parameters_apply_before_reset() {
        let mut config = GraphConfig::default();
        config.initial_float_parameters.insert("speed".into(), 2.0);
        let inst = instance(config);
        assert_eq!(inst.float("speed").unwrap(), 2.0);

        let mut config = GraphConfig::default();
        config.initial_bool_parameters.insert("speed".into(), true);
        let graph = Graph::from_json(LOCOMOTION, test_support::data_set()).unwrap();
        assert!(matches!(
            GraphInstance::new(graph, config),
            Err(GraphError::ParameterKindMismatch { .. })
        ));
    }

    #[test]
    fn parameter_errors() {
        let mut inst = instance(GraphConfig::default());
        assert_eq!(inst.parameter_index("speed"), Some(0));
        assert!(matches!(
            inst.set_float("jump", 1.0),
            Err(GraphError::UnknownParameter { .. })
        ));
        assert!(matches!(
            inst.set_bool("speed", true),
            Err(GraphError::ParameterKindMismatch { .. })
        ));
    }

    #[test]
    fn model_space_output_is_optional() {
        let mut inst = instance(GraphConfig::default());
        inst.update(0.1);
        assert!(inst.output_pose().model_space_transforms().is_none());

        let mut inst = instance(GraphConfig {
            calculate_model_space_pose: true,
            ..Default::default()
        });
        inst.update(0.1);
        let model = inst.output_pose().model_space_transforms().unwrap();
        // head sits half a unit above the spine, which sits one unit above the root.
        assert_relative_eq!(model[2].translation.y, 1.5, epsilon = 1e-5);
    }

    #[test]
    fn reset_returns_to_the_entry_state() {
        let mut inst = instance(GraphConfig::default());
        inst.set_float("speed", 1.0).unwrap();
        inst.update(0.1);
        inst.update(0.5);
        assert_eq!(inst.active_state_index(9), Some(1));

        inst.set_float("speed", 0.0).unwrap();
        inst.reset();
        assert_eq!(inst.active_state_index(9), Some(0));
        assert_eq!(inst.pose_node_timing(3).unwrap().current_time, 0.0);
        assert_eq!(inst.transition_progress(7), None);
    }
}
