//! Boolean value nodes: constants, parameters, logic and state/time conditions.

use crate::context::GraphContext;
use crate::definition::{
    CachedValueMode, FloatComparisonOperator, IdComparison, TimeComparisonType,
    TimeConditionOperator, TransitionRule, TransitionRuleCondition,
};
use crate::events::SampledEventData;
use crate::math::FloatRange;

use super::handle::{BoolNodeIdx, FloatNodeIdx, IdNodeIdx, NodeHandle, StateNodeIdx};
use super::{Evaluator, NodeSettings};

#[derive(Debug)]
pub(crate) enum BoolNode {
    Const(bool),
    ControlParameter(usize),
    VirtualParameter(BoolNodeIdx),
    Cached {
        input: BoolNodeIdx,
        mode: CachedValueMode,
    },
    And(Vec<BoolNodeIdx>),
    Or(Vec<BoolNodeIdx>),
    Not(BoolNodeIdx),
    FloatComparison {
        input: FloatNodeIdx,
        comparand_node: Option<FloatNodeIdx>,
        comparand: f32,
        epsilon: f32,
        comparison: FloatComparisonOperator,
    },
    FloatRangeComparison {
        input: FloatNodeIdx,
        range: FloatRange,
        inclusive: bool,
    },
    IdComparison {
        input: IdNodeIdx,
        comparison: IdComparison,
        ids: Vec<String>,
    },
    StateCompleted {
        state: StateNodeIdx,
        transition_duration: f32,
    },
    TimeCondition {
        state: StateNodeIdx,
        comparand_node: Option<FloatNodeIdx>,
        comparand: f32,
        comparison_type: TimeComparisonType,
        operator: TimeConditionOperator,
    },
    TransitionEvent {
        state: Option<StateNodeIdx>,
        rule_condition: TransitionRuleCondition,
        ignore_inactive_events: bool,
        require_rule_id: Option<String>,
    },
    IsInactiveBranch,
}

impl FloatComparisonOperator {
    #[inline]
    pub fn compare(self, a: f32, b: f32, epsilon: f32) -> bool {
        match self {
            FloatComparisonOperator::GreaterThanEqual => a >= b,
            FloatComparisonOperator::LessThanEqual => a <= b,
            FloatComparisonOperator::NearEqual => (a - b).abs() <= epsilon,
            FloatComparisonOperator::GreaterThan => a > b,
            FloatComparisonOperator::LessThan => a < b,
        }
    }
}

impl TimeConditionOperator {
    #[inline]
    pub fn compare(self, a: f32, b: f32) -> bool {
        match self {
            TimeConditionOperator::LessThan => a < b,
            TimeConditionOperator::LessThanEqual => a <= b,
            TimeConditionOperator::GreaterThan => a > b,
            TimeConditionOperator::GreaterThanEqual => a >= b,
        }
    }
}

impl TransitionRuleCondition {
    /// Whether the most restrictive marker found satisfies this policy.
    pub fn is_satisfied_by(self, most_restrictive: TransitionRule) -> bool {
        match self {
            TransitionRuleCondition::AnyAllowed => most_restrictive != TransitionRule::BlockTransition,
            TransitionRuleCondition::FullyAllowed => {
                most_restrictive == TransitionRule::AllowTransition
            }
            TransitionRuleCondition::ConditionallyAllowed => {
                most_restrictive == TransitionRule::ConditionallyAllowTransition
            }
            TransitionRuleCondition::Blocked => most_restrictive == TransitionRule::BlockTransition,
        }
    }
}

impl<'g> Evaluator<'g> {
    pub(crate) fn bool_value(&mut self, idx: BoolNodeIdx, ctx: &mut GraphContext<'_>) -> bool {
        let NodeSettings::Bool(node) = self.node(idx.index()) else {
            unreachable!("node {} is not a bool node", idx.index());
        };
        match node {
            BoolNode::Const(value) => *value,
            BoolNode::ControlParameter(param) => ctx.parameters.bool_at(*param),
            BoolNode::VirtualParameter(inner) => self.bool_value(*inner, ctx),
            BoolNode::Cached { input, mode } => {
                let input = *input;
                self.cached_value(idx.index(), *mode, ctx, |ev, ctx| ev.bool_value(input, ctx))
            }
            // Every child is evaluated so stateful children see each update.
            BoolNode::And(children) => {
                let mut result = true;
                for &child in children {
                    result &= self.bool_value(child, ctx);
                }
                result
            }
            BoolNode::Or(children) => {
                let mut result = false;
                for &child in children {
                    result |= self.bool_value(child, ctx);
                }
                result
            }
            BoolNode::Not(input) => !self.bool_value(*input, ctx),
            BoolNode::FloatComparison {
                input,
                comparand_node,
                comparand,
                epsilon,
                comparison,
            } => {
                let value = self.float_value(*input, ctx);
                let comparand = match comparand_node {
                    Some(node) => self.float_value(*node, ctx),
                    None => *comparand,
                };
                comparison.compare(value, comparand, *epsilon)
            }
            BoolNode::FloatRangeComparison {
                input,
                range,
                inclusive,
            } => {
                let value = self.float_value(*input, ctx);
                range.contains(value, *inclusive)
            }
            BoolNode::IdComparison {
                input,
                comparison,
                ids,
            } => {
                let value = self.id_value(*input, ctx);
                let matches = ids.iter().any(|id| *id == value);
                match comparison {
                    IdComparison::Matches => matches,
                    IdComparison::DoesntMatch => !matches,
                }
            }
            BoolNode::StateCompleted {
                state,
                transition_duration,
            } => {
                let timing = self.timing(*state);
                if timing.duration == 0.0 {
                    return true;
                }
                let transition_point = 1.0 - transition_duration / timing.duration;
                timing.current_time >= transition_point
            }
            BoolNode::TimeCondition {
                state,
                comparand_node,
                comparand,
                comparison_type,
                operator,
            } => {
                let comparand = match comparand_node {
                    Some(node) => self.float_value(*node, ctx),
                    None => *comparand,
                };
                // Sync-event comparisons read seconds in state against the same comparand.
                let value = match comparison_type {
                    TimeComparisonType::PercentageThroughState | TimeComparisonType::ElapsedTime => {
                        self.timing(*state).current_time
                    }
                    TimeComparisonType::PercentageThroughSyncEvent => {
                        self.state_runtime(*state).elapsed_time
                    }
                };
                operator.compare(value, comparand)
            }
            BoolNode::TransitionEvent {
                state,
                rule_condition,
                ignore_inactive_events,
                require_rule_id,
            } => self.transition_event_condition(
                *state,
                *rule_condition,
                *ignore_inactive_events,
                require_rule_id.as_deref(),
                ctx,
            ),
            BoolNode::IsInactiveBranch => !ctx.is_active_branch(),
        }
    }

    /// Reduce this update's transition markers to the most restrictive one and test it against
    /// `condition`. With a source state, only markers sampled inside that state's subgraph count.
    fn transition_event_condition(
        &self,
        state: Option<StateNodeIdx>,
        condition: TransitionRuleCondition,
        ignore_inactive_events: bool,
        require_rule_id: Option<&str>,
        ctx: &GraphContext<'_>,
    ) -> bool {
        let scope = state.map(|s| self.state_settings(s).subgraph.as_slice());
        let mut most_restrictive: Option<TransitionRule> = None;
        for event in ctx.events.events() {
            let SampledEventData::Transition { rule, id } = &event.data else {
                continue;
            };
            if ignore_inactive_events && !event.is_from_active_branch {
                continue;
            }
            if let Some(scope) = scope {
                if !scope.contains(&event.source_node) {
                    continue;
                }
            }
            if let Some(required) = require_rule_id {
                if id.as_deref() != Some(required) {
                    continue;
                }
            }
            most_restrictive = Some(most_restrictive.map_or(*rule, |found| found.max(*rule)));
        }
        most_restrictive.is_some_and(|rule| condition.is_satisfied_by(rule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BranchState;
    use crate::definition::NodeDefinition as D;
    use crate::test_support::Harness;

    fn b(idx: u16) -> BoolNodeIdx {
        BoolNodeIdx(idx)
    }

    #[test]
    fn and_or_over_empty_and_mixed_lists() {
        let mut h = Harness::new(vec![
            D::ConstBool { value: true },
            D::ConstBool { value: false },
            D::And {
                condition_node_indices: vec![],
            },
            D::Or {
                condition_node_indices: vec![],
            },
            D::And {
                condition_node_indices: vec![0, 1],
            },
            D::Or {
                condition_node_indices: vec![1, 0],
            },
            D::Not {
                input_value_node_idx: 4,
            },
        ]);
        let values: Vec<bool> = (2..=6).map(|i| h.eval(0.0, |ev, ctx| ev.bool_value(b(i), ctx))).collect();
        assert_eq!(values, [true, false, false, true, true]);
    }

    #[test]
    fn cached_bool_freezes_on_inactive_branch() {
        let mut h = Harness::with_parameters(
            vec![
                D::ControlParameterBool,
                D::CachedBool {
                    input_value_node_idx: 0,
                    mode: CachedValueMode::OnExit,
                },
            ],
            &["flag"],
        );
        h.parameters.set_bool("flag", true).unwrap();
        assert!(h.eval(0.1, |ev, ctx| ev.bool_value(b(1), ctx)));

        h.parameters.set_bool("flag", false).unwrap();
        let frozen = h.eval(0.1, |ev, ctx| {
            ctx.with_branch_state(BranchState::Inactive, |ctx| ev.bool_value(b(1), ctx))
        });
        assert!(frozen);
        // Stays frozen once the branch is active again.
        assert!(h.eval(0.1, |ev, ctx| ev.bool_value(b(1), ctx)));

        h.reset();
        assert!(!h.eval(0.1, |ev, ctx| ev.bool_value(b(1), ctx)));
    }

    #[test]
    fn cached_on_entry_keeps_first_value() {
        let mut h = Harness::with_parameters(
            vec![
                D::ControlParameterBool,
                D::CachedBool {
                    input_value_node_idx: 0,
                    mode: CachedValueMode::OnEntry,
                },
            ],
            &["flag"],
        );
        h.parameters.set_bool("flag", true).unwrap();
        assert!(h.eval(0.1, |ev, ctx| ev.bool_value(b(1), ctx)));
        h.parameters.set_bool("flag", false).unwrap();
        assert!(h.eval(0.1, |ev, ctx| ev.bool_value(b(1), ctx)));
    }

    #[test]
    fn float_comparisons() {
        let mut h = Harness::new(vec![
            D::ConstFloat { value: 0.5 },
            D::FloatComparison {
                input_value_node_idx: 0,
                comparand_value_node_idx: -1,
                comparand: 0.5 + 1.0e-6,
                epsilon: 1.0e-5,
                comparison: FloatComparisonOperator::NearEqual,
            },
            D::FloatComparison {
                input_value_node_idx: 0,
                comparand_value_node_idx: 0,
                comparand: 100.0,
                epsilon: 0.0,
                comparison: FloatComparisonOperator::GreaterThan,
            },
            D::FloatRangeComparison {
                input_value_node_idx: 0,
                range: FloatRange::new(0.0, 0.5),
                is_inclusive_check: false,
            },
        ]);
        assert!(h.eval(0.0, |ev, ctx| ev.bool_value(b(1), ctx)));
        assert!(!h.eval(0.0, |ev, ctx| ev.bool_value(b(2), ctx)));
        assert!(!h.eval(0.0, |ev, ctx| ev.bool_value(b(3), ctx)));
    }

    #[test]
    fn id_comparison_polarity() {
        let mut h = Harness::new(vec![
            D::ConstId {
                value: "crouch".into(),
            },
            D::IdComparison {
                input_value_node_idx: 0,
                comparison: IdComparison::Matches,
                comparison_ids: vec!["stand".into(), "crouch".into()],
            },
            D::IdComparison {
                input_value_node_idx: 0,
                comparison: IdComparison::DoesntMatch,
                comparison_ids: vec!["crouch".into()],
            },
        ]);
        assert!(h.eval(0.0, |ev, ctx| ev.bool_value(b(1), ctx)));
        assert!(!h.eval(0.0, |ev, ctx| ev.bool_value(b(2), ctx)));
    }

    #[test]
    fn state_completed_and_time_conditions() {
        let mut h = Harness::new(vec![
            D::Clip {
                data_slot_idx: 0,
                speed_multiplier: 1.0,
                allow_looping: false,
                sample_root_motion: true,
                reset_time_value_node_idx: -1,
                play_in_reverse_value_node_idx: -1,
            },
            D::State {
                child_node_idx: 0,
                layer_bone_mask_node_idx: -1,
                layer_weight_node_idx: -1,
                layer_root_motion_weight_node_idx: -1,
                entry_events: vec![],
                execute_events: vec![],
                exit_events: vec![],
                is_off_state: false,
            },
            D::StateCompletedCondition {
                source_state_node_idx: 1,
                transition_duration_seconds: 0.5,
            },
            D::TimeCondition {
                source_state_node_idx: 1,
                input_value_node_idx: -1,
                comparand: 0.7,
                comparison_type: TimeComparisonType::PercentageThroughSyncEvent,
                operator: TimeConditionOperator::GreaterThanEqual,
            },
            D::TimeCondition {
                source_state_node_idx: 1,
                input_value_node_idx: -1,
                comparand: 0.7,
                comparison_type: TimeComparisonType::PercentageThroughState,
                operator: TimeConditionOperator::GreaterThanEqual,
            },
        ]);
        let state = StateNodeIdx(1);
        // The walk clip lasts 2s; completion fires at 1 - 0.5/2 = 0.75.
        h.eval(1.0, |ev, ctx| ev.update_pose(state.into(), ctx));
        assert!(!h.eval(0.0, |ev, ctx| ev.bool_value(b(2), ctx)));
        // One second in state: elapsed seconds pass 0.7, percentage (0.5) does not.
        assert!(h.eval(0.0, |ev, ctx| ev.bool_value(b(3), ctx)));
        assert!(!h.eval(0.0, |ev, ctx| ev.bool_value(b(4), ctx)));

        h.eval(0.6, |ev, ctx| ev.update_pose(state.into(), ctx));
        assert!(h.eval(0.0, |ev, ctx| ev.bool_value(b(2), ctx)));
        assert!(h.eval(0.0, |ev, ctx| ev.bool_value(b(4), ctx)));
    }

    #[test]
    fn transition_rule_policies() {
        use TransitionRule::*;
        assert!(TransitionRuleCondition::AnyAllowed.is_satisfied_by(ConditionallyAllowTransition));
        assert!(!TransitionRuleCondition::AnyAllowed.is_satisfied_by(BlockTransition));
        assert!(TransitionRuleCondition::FullyAllowed.is_satisfied_by(AllowTransition));
        assert!(!TransitionRuleCondition::FullyAllowed.is_satisfied_by(ConditionallyAllowTransition));
        assert!(TransitionRuleCondition::Blocked.is_satisfied_by(BlockTransition));
    }

    #[test]
    fn transition_event_condition_reads_clip_markers() {
        let mut h = Harness::new(vec![
            D::Clip {
                data_slot_idx: 3,
                speed_multiplier: 1.0,
                allow_looping: true,
                sample_root_motion: true,
                reset_time_value_node_idx: -1,
                play_in_reverse_value_node_idx: -1,
            },
            D::TransitionEventCondition {
                source_state_node_idx: -1,
                rule_condition: TransitionRuleCondition::FullyAllowed,
                ignore_inactive_events: false,
                require_rule_id: Some("exit".into()),
            },
            D::TransitionEventCondition {
                source_state_node_idx: -1,
                rule_condition: TransitionRuleCondition::AnyAllowed,
                ignore_inactive_events: false,
                require_rule_id: Some("other".into()),
            },
        ]);
        let clip = crate::nodes::PoseNodeIdx(0);
        // No events sampled yet.
        assert!(!h.eval(0.0, |ev, ctx| ev.bool_value(b(1), ctx)));

        let (before, after, other) = h.eval(0.25, |ev, ctx| {
            ev.update_pose(clip, ctx);
            let before = ev.bool_value(b(1), ctx);
            ev.update_pose(clip, ctx);
            let after = ev.bool_value(b(1), ctx);
            (before, after, ev.bool_value(b(2), ctx))
        });
        assert!(!before);
        assert!(after);
        assert!(!other);
    }
}
