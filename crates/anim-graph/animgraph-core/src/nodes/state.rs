//! State nodes: a child pose wrapped with lifecycle, events and layer weights.

use serde::{Deserialize, Serialize};

use crate::context::GraphContext;
use crate::events::GraphEventType;

use super::handle::{BoneMaskNodeIdx, FloatNodeIdx, NodeHandle, PoseNodeIdx, StateNodeIdx};
use super::{Evaluator, GraphPoseNodeResult, PoseNode, PoseRuntime, PoseTiming};

/// Where a state is in its transition lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionPhase {
    #[default]
    None,
    TransitioningIn,
    TransitioningOut,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct StateRuntime {
    /// Seconds since the state was started.
    pub elapsed_time: f32,
    pub phase: TransitionPhase,
    pub is_first_update: bool,
}

impl Default for StateRuntime {
    fn default() -> Self {
        Self {
            elapsed_time: 0.0,
            phase: TransitionPhase::None,
            is_first_update: true,
        }
    }
}

#[derive(Debug)]
pub(crate) struct StateSettings {
    pub child: Option<PoseNodeIdx>,
    pub bone_mask: Option<BoneMaskNodeIdx>,
    pub layer_weight: Option<FloatNodeIdx>,
    pub root_motion_weight: Option<FloatNodeIdx>,
    pub entry_events: Vec<String>,
    pub execute_events: Vec<String>,
    pub exit_events: Vec<String>,
    pub is_off_state: bool,
    /// Nodes owned by this state, children first.
    pub subgraph: Vec<usize>,
}

impl<'g> Evaluator<'g> {
    pub(crate) fn state_settings(&self, idx: StateNodeIdx) -> &'g StateSettings {
        match self.pose_node(idx.into()) {
            PoseNode::State(settings) => settings,
            _ => unreachable!("node {} is not a state", idx.index()),
        }
    }

    pub(crate) fn state_runtime(&self, idx: StateNodeIdx) -> &StateRuntime {
        match &self.pose_state(idx).runtime {
            PoseRuntime::State(runtime) => runtime,
            _ => unreachable!("node {} has no state runtime", idx.index()),
        }
    }

    pub(crate) fn state_runtime_mut(&mut self, idx: StateNodeIdx) -> &mut StateRuntime {
        match &mut self.pose_state_mut(idx).runtime {
            PoseRuntime::State(runtime) => runtime,
            _ => unreachable!("node {} has no state runtime", idx.index()),
        }
    }

    /// Enter the state from scratch: clear time and phase and reset everything it owns.
    pub(crate) fn start_state(&mut self, idx: StateNodeIdx, ctx: &mut GraphContext<'_>) {
        let settings = self.state_settings(idx);
        *self.state_runtime_mut(idx) = StateRuntime::default();
        self.reset_subgraph(&settings.subgraph, ctx);
        let timing = match settings.child {
            Some(child) => self.timing(child),
            None => PoseTiming::default(),
        };
        *self.timing_mut(idx) = timing;
    }

    pub(crate) fn start_transition_in(&mut self, idx: StateNodeIdx) {
        self.state_runtime_mut(idx).phase = TransitionPhase::TransitioningIn;
    }

    pub(crate) fn start_transition_out(&mut self, idx: StateNodeIdx, ctx: &mut GraphContext<'_>) {
        self.state_runtime_mut(idx).phase = TransitionPhase::TransitioningOut;
        self.sample_state_events(idx, ctx);
    }

    pub(crate) fn stop_state(&mut self, idx: StateNodeIdx) {
        self.state_runtime_mut(idx).phase = TransitionPhase::None;
    }

    pub(crate) fn is_transitioning(&self, idx: StateNodeIdx) -> bool {
        self.state_runtime(idx).phase != TransitionPhase::None
    }

    pub(crate) fn update_state(
        &mut self,
        idx: StateNodeIdx,
        ctx: &mut GraphContext<'_>,
    ) -> GraphPoseNodeResult {
        let settings = self.state_settings(idx);
        let result = match settings.child {
            Some(child) => {
                let result = self.update_pose(child, ctx);
                self.copy_timing(child, idx);
                result
            }
            None => {
                self.pose_mut(idx).set_to_reference_pose(false);
                GraphPoseNodeResult::new(idx.into())
            }
        };

        self.state_runtime_mut(idx).elapsed_time += ctx.delta_time;
        self.sample_state_events(idx, ctx);
        if ctx.is_in_layer() {
            self.update_layer_context(idx, ctx);
        }
        self.state_runtime_mut(idx).is_first_update = false;
        result
    }

    fn sample_state_events(&mut self, idx: StateNodeIdx, ctx: &mut GraphContext<'_>) {
        let settings = self.state_settings(idx);
        let runtime = self.state_runtime(idx);
        let is_active = ctx.is_active_branch();

        let (event_type, ids) = if runtime.is_first_update
            || (runtime.phase == TransitionPhase::TransitioningIn && is_active)
        {
            (GraphEventType::Entry, &settings.entry_events)
        } else if runtime.phase == TransitionPhase::TransitioningOut {
            (GraphEventType::Exit, &settings.exit_events)
        } else {
            (GraphEventType::FullyInState, &settings.execute_events)
        };
        for id in ids {
            ctx.events.push_graph_event(idx.index(), is_active, event_type, id);
        }
    }

    /// Fold this state's layer weights and mask into the enclosing layer context.
    fn update_layer_context(&mut self, idx: StateNodeIdx, ctx: &mut GraphContext<'_>) {
        let settings = self.state_settings(idx);
        let weights = if settings.is_off_state {
            None
        } else {
            let weight = match settings.layer_weight {
                Some(node) => self.float_value(node, ctx),
                None => 1.0,
            };
            let root_motion_weight = match settings.root_motion_weight {
                Some(node) => self.float_value(node, ctx),
                None => 1.0,
            };
            Some((weight, root_motion_weight))
        };
        let mask = match settings.bone_mask {
            Some(node) => Some(self.bone_mask_value(node, ctx)),
            None => None,
        };

        let Some(layer) = ctx.layer_context.as_mut() else {
            return;
        };
        match weights {
            Some((weight, root_motion_weight)) => {
                layer.weight *= weight;
                layer.root_motion_weight *= root_motion_weight;
            }
            None => {
                layer.weight = 0.0;
                layer.root_motion_weight = 0.0;
            }
        }
        if let Some(mask) = mask {
            match layer.bone_mask.as_mut() {
                Some(existing) => existing.combine_with(&mask),
                None => layer.bone_mask = Some(mask),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BranchState, LayerContext};
    use crate::definition::NodeDefinition as D;
    use crate::test_support::Harness;
    use approx::assert_relative_eq;

    fn state(child: i16, weight: i16, mask: i16, is_off_state: bool) -> D {
        D::State {
            child_node_idx: child,
            layer_bone_mask_node_idx: mask,
            layer_weight_node_idx: weight,
            layer_root_motion_weight_node_idx: -1,
            entry_events: vec!["enter".into()],
            execute_events: vec!["tick".into()],
            exit_events: vec!["leave".into()],
            is_off_state,
        }
    }

    fn clip() -> D {
        D::Clip {
            data_slot_idx: 0,
            speed_multiplier: 1.0,
            allow_looping: true,
            sample_root_motion: true,
            reset_time_value_node_idx: -1,
            play_in_reverse_value_node_idx: -1,
        }
    }

    fn graph_events(h: &Harness) -> Vec<(GraphEventType, String)> {
        h.events
            .events()
            .iter()
            .filter_map(|e| e.graph_event().map(|(t, id)| (t, id.to_string())))
            .collect()
    }

    #[test]
    fn update_mirrors_child_and_samples_lifecycle_events() {
        let mut h = Harness::new(vec![clip(), state(0, -1, -1, false)]);
        let s = StateNodeIdx(1);

        h.eval(0.5, |ev, ctx| ev.update_state(s, ctx));
        assert_eq!(graph_events(&h), [(GraphEventType::Entry, "enter".to_string())]);
        assert_relative_eq!(h.timing(s.into()).current_time, 0.25);

        h.eval(0.5, |ev, ctx| ev.update_state(s, ctx));
        assert_eq!(graph_events(&h), [(GraphEventType::FullyInState, "tick".to_string())]);

        h.eval(0.5, |ev, ctx| {
            ev.start_transition_out(s, ctx);
            ev.update_state(s, ctx)
        });
        assert_eq!(
            graph_events(&h),
            [
                (GraphEventType::Exit, "leave".to_string()),
                (GraphEventType::Exit, "leave".to_string())
            ]
        );
        h.eval(0.0, |ev, _| assert_relative_eq!(ev.state_runtime(s).elapsed_time, 1.5));
    }

    #[test]
    fn transitioning_in_on_inactive_branch_samples_execute_events() {
        let mut h = Harness::new(vec![clip(), state(0, -1, -1, false)]);
        let s = StateNodeIdx(1);
        h.eval(0.1, |ev, ctx| ev.update_state(s, ctx));
        h.eval(0.1, |ev, ctx| {
            ev.start_transition_in(s);
            ctx.with_branch_state(BranchState::Inactive, |ctx| ev.update_state(s, ctx))
        });
        let events = h.events.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].graph_event(), Some((GraphEventType::FullyInState, "tick")));
        assert!(!events[0].is_from_active_branch);
    }

    #[test]
    fn start_resets_owned_nodes() {
        let mut h = Harness::new(vec![clip(), state(0, -1, -1, false)]);
        let s = StateNodeIdx(1);
        h.eval(1.0, |ev, ctx| ev.update_state(s, ctx));
        h.eval(0.0, |ev, ctx| ev.start_state(s, ctx));
        assert_eq!(h.timing(PoseNodeIdx(0)).current_time, 0.0);
        h.eval(0.0, |ev, _| {
            assert!(ev.state_runtime(s).is_first_update);
            assert_eq!(ev.state_runtime(s).phase, TransitionPhase::None);
        });
    }

    #[test]
    fn layer_context_picks_up_weights_and_masks() {
        let mut h = Harness::new(vec![
            D::ConstFloat { value: 0.5 },
            D::FixedWeightBoneMask { bone_weight: 0.5 },
            clip(),
            state(2, 0, 1, false),
            state(2, 0, -1, true),
        ]);
        let (_, layer) = h.eval(0.1, |ev, ctx| {
            let start = LayerContext {
                weight: 0.8,
                bone_mask: Some(crate::bone_mask::BoneMask::uniform(3, 0.5)),
                ..Default::default()
            };
            ctx.with_layer_context(Some(start), |ctx| ev.update_state(StateNodeIdx(3), ctx))
        });
        let layer = layer.unwrap();
        assert_relative_eq!(layer.weight, 0.4);
        assert_eq!(layer.root_motion_weight, 1.0);
        assert_relative_eq!(layer.bone_mask.unwrap().weight(0), 0.25);

        let (_, off) = h.eval(0.1, |ev, ctx| {
            ctx.with_layer_context(Some(LayerContext::default()), |ctx| {
                ev.update_state(StateNodeIdx(4), ctx)
            })
        });
        let off = off.unwrap();
        assert_eq!((off.weight, off.root_motion_weight), (0.0, 0.0));
    }
}
