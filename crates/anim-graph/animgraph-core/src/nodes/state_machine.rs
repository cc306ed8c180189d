//! State machines: one active state, switched by the first satisfied outgoing transition.

use crate::context::GraphContext;

use super::handle::{BoolNodeIdx, NodeHandle, PoseNodeIdx, StateNodeIdx, TransitionNodeIdx};
use super::transition::{TransitionSource, TransitionStart};
use super::{Evaluator, GraphPoseNodeResult, PoseRuntime};

#[derive(Debug)]
pub(crate) struct TransitionInfo {
    pub transition: TransitionNodeIdx,
    pub condition: BoolNodeIdx,
    /// Index into [`StateMachineSettings::states`].
    pub target_state: usize,
    /// May start even while the target state is still transitioning.
    pub can_be_forced: bool,
}

#[derive(Debug)]
pub(crate) struct StateInfo {
    pub state: StateNodeIdx,
    pub entry_condition: Option<BoolNodeIdx>,
    pub transitions: Vec<TransitionInfo>,
}

#[derive(Debug)]
pub(crate) struct StateMachineSettings {
    pub states: Vec<StateInfo>,
    pub default_state: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct StateMachineRuntime {
    pub active_state: usize,
    pub active_transition: Option<TransitionNodeIdx>,
}

impl StateMachineRuntime {
    pub fn new(default_state: usize) -> Self {
        Self {
            active_state: default_state,
            active_transition: None,
        }
    }
}

impl<'g> Evaluator<'g> {
    pub(crate) fn state_machine_runtime(&self, idx: PoseNodeIdx) -> &StateMachineRuntime {
        match &self.pose_state(idx).runtime {
            PoseRuntime::StateMachine(runtime) => runtime,
            _ => unreachable!("node {} is not a state machine", idx.index()),
        }
    }

    fn state_machine_runtime_mut(&mut self, idx: PoseNodeIdx) -> &mut StateMachineRuntime {
        match &mut self.pose_state_mut(idx).runtime {
            PoseRuntime::StateMachine(runtime) => runtime,
            _ => unreachable!("node {} is not a state machine", idx.index()),
        }
    }

    /// Pick the entry state (first satisfied entry condition, else the default) and start it.
    pub(crate) fn reset_state_machine(
        &mut self,
        idx: PoseNodeIdx,
        settings: &'g StateMachineSettings,
        ctx: &mut GraphContext<'_>,
    ) {
        let mut entry = settings.default_state;
        for (i, state) in settings.states.iter().enumerate() {
            if let Some(condition) = state.entry_condition {
                if self.bool_value(condition, ctx) {
                    entry = i;
                    break;
                }
            }
        }

        *self.state_machine_runtime_mut(idx) = StateMachineRuntime::new(entry);
        let state = settings.states[entry].state;
        self.start_state(state, ctx);
        self.copy_timing(state, idx);
        log::trace!("state machine {}: entered state {}", idx.index(), entry);
    }

    /// Whether `transition` is the active transition or one of the transitions it blends out of.
    fn is_in_active_chain(&self, active: Option<TransitionNodeIdx>, transition: TransitionNodeIdx) -> bool {
        let mut current = active;
        while let Some(t) = current {
            if t == transition {
                return true;
            }
            current = match self.transition_runtime(t).source {
                Some(TransitionSource::Transition(inner)) => Some(inner),
                _ => None,
            };
        }
        false
    }

    pub(crate) fn update_state_machine(
        &mut self,
        idx: PoseNodeIdx,
        settings: &'g StateMachineSettings,
        ctx: &mut GraphContext<'_>,
    ) -> GraphPoseNodeResult {
        let incoming_layer = ctx.layer_context.clone();

        if let Some(transition) = self.state_machine_runtime(idx).active_transition {
            if self.is_transition_complete(transition, ctx) {
                self.stop_transition(transition);
                self.state_machine_runtime_mut(idx).active_transition = None;
            }
        }

        let StateMachineRuntime {
            active_state,
            active_transition,
        } = self.state_machine_runtime(idx).clone();
        let active = &settings.states[active_state];

        let mut result = match active_transition {
            Some(transition) => {
                let result = self.update_transition(transition, ctx);
                self.copy_timing(transition, idx);
                result
            }
            None => {
                let result = self.update_state(active.state, ctx);
                self.copy_timing(active.state, idx);
                result
            }
        };

        // Inactive branches keep playing but never switch state.
        if !ctx.is_active_branch() {
            return result;
        }

        for candidate in &active.transitions {
            if candidate.target_state == active_state {
                continue;
            }
            let target = settings.states[candidate.target_state].state;
            if !candidate.can_be_forced && self.is_transitioning(target) {
                continue;
            }
            if self.is_in_active_chain(active_transition, candidate.transition) {
                continue;
            }
            if !self.bool_value(candidate.condition, ctx) {
                continue;
            }

            let source = match active_transition {
                Some(transition) => TransitionSource::Transition(transition),
                None => TransitionSource::State(active.state),
            };
            log::debug!(
                "state machine {}: state {} -> {} via node {}",
                idx.index(),
                active_state,
                candidate.target_state,
                candidate.transition.index()
            );
            // The switch shows this update: hand back the new transition's first blend.
            result = self.initialize_target_state_and_update_transition(
                candidate.transition,
                TransitionStart {
                    source,
                    source_result: result,
                    incoming_layer: incoming_layer.clone(),
                },
                ctx,
            );
            *self.state_machine_runtime_mut(idx) = StateMachineRuntime {
                active_state: candidate.target_state,
                active_transition: Some(candidate.transition),
            };
            self.copy_timing(target, idx);
            break;
        }

        result
    }
}
