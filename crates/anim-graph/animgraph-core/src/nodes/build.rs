//! Resolution of the flat node table into typed node settings.

use hashbrown::HashSet;

use crate::bone_mask::BoneMask;
use crate::definition::{GraphDefinition, NodeDefinition};
use crate::error::{GraphError, GraphResult};
use crate::graph::GraphDataSet;
use crate::parameters::{ParameterKind, ParameterStore};

use super::bone_mask_nodes::BoneMaskNode;
use super::bool_nodes::BoolNode;
use super::float_nodes::FloatNode;
use super::handle::NodeHandle;
use super::id_nodes::IdNode;
use super::layer::{LayerBlendSettings, LayerSettings};
use super::pose_nodes::{AnimationPoseSettings, ClipSettings, PoseNode};
use super::state::StateSettings;
use super::state_machine::{StateInfo, StateMachineSettings, TransitionInfo};
use super::transition::TransitionSettings;
use super::NodeSettings;

/// Index resolution service handed to each node while the graph is built.
///
/// Every accessor validates the raw `i16` against the node table and the expected node kind and
/// returns a typed handle; authoring mistakes surface as [`GraphError`]s naming the offending
/// node.
pub struct GraphBuildContext<'d> {
    definition: &'d GraphDefinition,
    data_set: &'d GraphDataSet,
    node: usize,
    parameters: ParameterStore,
}

impl<'d> GraphBuildContext<'d> {
    pub fn new(definition: &'d GraphDefinition, data_set: &'d GraphDataSet) -> Self {
        Self {
            definition,
            data_set,
            node: 0,
            parameters: ParameterStore::new(),
        }
    }

    /// Index of the node currently being initialised.
    pub fn node_index(&self) -> usize {
        self.node
    }

    pub fn num_nodes(&self) -> usize {
        self.definition.nodes.len()
    }

    /// Resolve a required child.
    pub fn set_node_from_index<H: NodeHandle>(&self, index: i16, field: &str) -> GraphResult<H> {
        if index < 0 {
            return Err(GraphError::MissingRequiredChild {
                node: self.node,
                field: field.to_string(),
            });
        }
        self.resolve(index)
    }

    /// Resolve an optional child; negative indices mean "absent".
    pub fn set_optional_node_from_index<H: NodeHandle>(&self, index: i16) -> GraphResult<Option<H>> {
        if index < 0 {
            return Ok(None);
        }
        self.resolve(index).map(Some)
    }

    pub fn set_nodes_from_index_array<H: NodeHandle>(
        &self,
        indices: &[i16],
        field: &str,
    ) -> GraphResult<Vec<H>> {
        indices
            .iter()
            .map(|&idx| self.set_node_from_index(idx, field))
            .collect()
    }

    fn resolve<H: NodeHandle>(&self, index: i16) -> GraphResult<H> {
        let nodes = &self.definition.nodes;
        let child = nodes
            .get(index as usize)
            .ok_or(GraphError::NodeIndexOutOfRange {
                node: self.node,
                index,
                len: nodes.len(),
            })?;
        if !H::accepts(child) {
            return Err(GraphError::NodeKindMismatch {
                node: self.node,
                index: index as usize,
                expected: H::KIND.to_string(),
                found: child.kind_name().to_string(),
            });
        }
        Ok(H::from_index(index as usize))
    }

    /// Declare the control parameter named for the current node and return its index.
    pub fn control_parameter(&mut self, kind: ParameterKind) -> GraphResult<usize> {
        let names = &self.definition.control_parameter_ids;
        let name = names
            .get(self.node)
            .ok_or(GraphError::ControlParameterOutOfRange {
                node: self.node,
                len: names.len(),
            })?;
        self.parameters.declare(name, kind)
    }

    /// Resolve a virtual parameter to the value node that computes it.
    pub fn virtual_parameter<H: NodeHandle>(&self, parameter_idx: i16) -> GraphResult<H> {
        let ids = &self.definition.virtual_parameter_ids;
        let nodes = &self.definition.virtual_parameter_node_indices;
        let len = ids.len().min(nodes.len());
        if parameter_idx < 0 || parameter_idx as usize >= len {
            return Err(GraphError::VirtualParameterOutOfRange {
                node: self.node,
                index: parameter_idx,
                len,
            });
        }
        let field = format!("virtual parameter `{}`", ids[parameter_idx as usize]);
        self.set_node_from_index(nodes[parameter_idx as usize], &field)
    }

    pub fn data_slot(&self, slot: i16) -> GraphResult<usize> {
        let len = self.data_set.animations.len();
        if slot < 0 || slot as usize >= len {
            return Err(GraphError::InvalidDataSlot {
                node: self.node,
                slot,
                len,
            });
        }
        Ok(slot as usize)
    }

    pub fn data_set(&self) -> &GraphDataSet {
        self.data_set
    }

    fn check_same_len(&self, first: (&str, usize), second: (&str, usize)) -> GraphResult<()> {
        if first.1 != second.1 {
            return Err(GraphError::MismatchedOptionTables {
                node: self.node,
                first: first.0.to_string(),
                first_len: first.1,
                second: second.0.to_string(),
                second_len: second.1,
            });
        }
        Ok(())
    }

    fn state_index(&self, index: i16, len: usize) -> GraphResult<usize> {
        if index < 0 || index as usize >= len {
            return Err(GraphError::InvalidStateIndex {
                node: self.node,
                index,
                len,
            });
        }
        Ok(index as usize)
    }

    /// Nodes reachable from `roots` through ownership edges, children before parents.
    pub(crate) fn owned_subgraph(&self, roots: &[i16]) -> Vec<usize> {
        let nodes = &self.definition.nodes;
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        // Explicit stack of (node, children pushed) so deep graphs don't recurse.
        let mut stack: Vec<(usize, bool)> = roots
            .iter()
            .rev()
            .filter(|&&r| r >= 0 && (r as usize) < nodes.len())
            .map(|&r| (r as usize, false))
            .collect();
        while let Some((idx, expanded)) = stack.pop() {
            if expanded {
                order.push(idx);
                continue;
            }
            if !visited.insert(idx) {
                continue;
            }
            stack.push((idx, true));
            for child in nodes[idx].owned_children().into_iter().rev() {
                let child = child as usize;
                if child < nodes.len() && !visited.contains(&child) {
                    stack.push((child, false));
                }
            }
        }
        order
    }

    /// Build settings for every node, returning them with the collected parameter layout.
    pub(crate) fn build_all(mut self) -> GraphResult<(Vec<NodeSettings>, ParameterStore)> {
        let definition = self.definition;
        let mut settings = Vec::with_capacity(definition.nodes.len());
        for (idx, node) in definition.nodes.iter().enumerate() {
            self.node = idx;
            settings.push(self.build_node(node)?);
        }
        Ok((settings, self.parameters))
    }

    fn build_node(&mut self, definition: &NodeDefinition) -> GraphResult<NodeSettings> {
        use NodeDefinition as D;
        let settings = match definition {
            // Bool values
            D::ConstBool { value } => NodeSettings::Bool(BoolNode::Const(*value)),
            D::ControlParameterBool => {
                NodeSettings::Bool(BoolNode::ControlParameter(self.control_parameter(ParameterKind::Bool)?))
            }
            D::VirtualParameterBool { parameter_idx } => {
                NodeSettings::Bool(BoolNode::VirtualParameter(self.virtual_parameter(*parameter_idx)?))
            }
            D::CachedBool {
                input_value_node_idx,
                mode,
            } => NodeSettings::Bool(BoolNode::Cached {
                input: self.set_node_from_index(*input_value_node_idx, "input_value_node_idx")?,
                mode: *mode,
            }),
            D::And {
                condition_node_indices,
            } => NodeSettings::Bool(BoolNode::And(
                self.set_nodes_from_index_array(condition_node_indices, "condition_node_indices")?,
            )),
            D::Or {
                condition_node_indices,
            } => NodeSettings::Bool(BoolNode::Or(
                self.set_nodes_from_index_array(condition_node_indices, "condition_node_indices")?,
            )),
            D::Not {
                input_value_node_idx,
            } => NodeSettings::Bool(BoolNode::Not(
                self.set_node_from_index(*input_value_node_idx, "input_value_node_idx")?,
            )),
            D::FloatComparison {
                input_value_node_idx,
                comparand_value_node_idx,
                comparand,
                epsilon,
                comparison,
            } => NodeSettings::Bool(BoolNode::FloatComparison {
                input: self.set_node_from_index(*input_value_node_idx, "input_value_node_idx")?,
                comparand_node: self.set_optional_node_from_index(*comparand_value_node_idx)?,
                comparand: *comparand,
                epsilon: *epsilon,
                comparison: *comparison,
            }),
            D::FloatRangeComparison {
                input_value_node_idx,
                range,
                is_inclusive_check,
            } => NodeSettings::Bool(BoolNode::FloatRangeComparison {
                input: self.set_node_from_index(*input_value_node_idx, "input_value_node_idx")?,
                range: *range,
                inclusive: *is_inclusive_check,
            }),
            D::IdComparison {
                input_value_node_idx,
                comparison,
                comparison_ids,
            } => NodeSettings::Bool(BoolNode::IdComparison {
                input: self.set_node_from_index(*input_value_node_idx, "input_value_node_idx")?,
                comparison: *comparison,
                ids: comparison_ids.clone(),
            }),
            D::StateCompletedCondition {
                source_state_node_idx,
                transition_duration_seconds,
            } => NodeSettings::Bool(BoolNode::StateCompleted {
                state: self.set_node_from_index(*source_state_node_idx, "source_state_node_idx")?,
                transition_duration: *transition_duration_seconds,
            }),
            D::TimeCondition {
                source_state_node_idx,
                input_value_node_idx,
                comparand,
                comparison_type,
                operator,
            } => NodeSettings::Bool(BoolNode::TimeCondition {
                state: self.set_node_from_index(*source_state_node_idx, "source_state_node_idx")?,
                comparand_node: self.set_optional_node_from_index(*input_value_node_idx)?,
                comparand: *comparand,
                comparison_type: *comparison_type,
                operator: *operator,
            }),
            D::TransitionEventCondition {
                source_state_node_idx,
                rule_condition,
                ignore_inactive_events,
                require_rule_id,
            } => NodeSettings::Bool(BoolNode::TransitionEvent {
                state: self.set_optional_node_from_index(*source_state_node_idx)?,
                rule_condition: *rule_condition,
                ignore_inactive_events: *ignore_inactive_events,
                require_rule_id: require_rule_id.clone(),
            }),
            D::IsInactiveBranch => NodeSettings::Bool(BoolNode::IsInactiveBranch),

            // Float values
            D::ConstFloat { value } => NodeSettings::Float(FloatNode::Const(*value)),
            D::ControlParameterFloat => NodeSettings::Float(FloatNode::ControlParameter(
                self.control_parameter(ParameterKind::Float)?,
            )),
            D::VirtualParameterFloat { parameter_idx } => {
                NodeSettings::Float(FloatNode::VirtualParameter(self.virtual_parameter(*parameter_idx)?))
            }
            D::CachedFloat {
                input_value_node_idx,
                mode,
            } => NodeSettings::Float(FloatNode::Cached {
                input: self.set_node_from_index(*input_value_node_idx, "input_value_node_idx")?,
                mode: *mode,
            }),
            D::FloatMath {
                input_value_node_idx_a,
                input_value_node_idx_b,
                value_b,
                operator,
                return_absolute_result,
                return_negated_result,
            } => NodeSettings::Float(FloatNode::Math {
                a: self.set_node_from_index(*input_value_node_idx_a, "input_value_node_idx_a")?,
                b: self.set_optional_node_from_index(*input_value_node_idx_b)?,
                value_b: *value_b,
                operator: *operator,
                absolute: *return_absolute_result,
                negated: *return_negated_result,
            }),
            D::FloatClamp {
                input_value_node_idx,
                clamp_range,
            } => NodeSettings::Float(FloatNode::Clamp {
                input: self.set_node_from_index(*input_value_node_idx, "input_value_node_idx")?,
                range: *clamp_range,
            }),
            D::FloatRemap {
                input_value_node_idx,
                input_range,
                output_range,
            } => NodeSettings::Float(FloatNode::Remap {
                input: self.set_node_from_index(*input_value_node_idx, "input_value_node_idx")?,
                input_range: *input_range,
                output_range: *output_range,
            }),
            D::FloatCurve {
                input_value_node_idx,
                curve,
            } => {
                curve.validate().map_err(|reason| GraphError::InvalidCurve {
                    node: self.node,
                    reason,
                })?;
                NodeSettings::Float(FloatNode::Curve {
                    input: self.set_node_from_index(*input_value_node_idx, "input_value_node_idx")?,
                    curve: curve.clone(),
                })
            }
            D::FloatAngleMath {
                input_value_node_idx,
                operation,
            } => NodeSettings::Float(FloatNode::AngleMath {
                input: self.set_node_from_index(*input_value_node_idx, "input_value_node_idx")?,
                operation: *operation,
            }),
            D::FloatEase {
                input_value_node_idx,
                ease_time,
                easing_op,
                use_start_value,
                start_value,
            } => NodeSettings::Float(FloatNode::Ease {
                input: self.set_node_from_index(*input_value_node_idx, "input_value_node_idx")?,
                ease_time: *ease_time,
                easing: *easing_op,
                start_value: use_start_value.then_some(*start_value),
            }),
            D::FloatSelector {
                condition_node_indices,
                values,
                default_value,
                ease_time,
                easing_op,
            } => {
                self.check_same_len(
                    ("condition_node_indices", condition_node_indices.len()),
                    ("values", values.len()),
                )?;
                NodeSettings::Float(FloatNode::Selector {
                    conditions: self
                        .set_nodes_from_index_array(condition_node_indices, "condition_node_indices")?,
                    values: values.clone(),
                    default_value: *default_value,
                    ease_time: *ease_time,
                    easing: *easing_op,
                })
            }
            D::FloatSwitch {
                switch_value_node_idx,
                true_value_node_idx,
                false_value_node_idx,
            } => NodeSettings::Float(FloatNode::Switch {
                switch: self.set_node_from_index(*switch_value_node_idx, "switch_value_node_idx")?,
                on_true: self.set_node_from_index(*true_value_node_idx, "true_value_node_idx")?,
                on_false: self.set_node_from_index(*false_value_node_idx, "false_value_node_idx")?,
            }),
            D::IdToFloat {
                input_value_node_idx,
                ids,
                values,
                default_value,
            } => {
                self.check_same_len(("ids", ids.len()), ("values", values.len()))?;
                NodeSettings::Float(FloatNode::IdToFloat {
                    input: self.set_node_from_index(*input_value_node_idx, "input_value_node_idx")?,
                    ids: ids.clone(),
                    values: values.clone(),
                    default_value: *default_value,
                })
            }

            // Id values
            D::ConstId { value } => NodeSettings::Id(IdNode::Const(value.clone())),
            D::ControlParameterId => {
                NodeSettings::Id(IdNode::ControlParameter(self.control_parameter(ParameterKind::Id)?))
            }
            D::VirtualParameterId { parameter_idx } => {
                NodeSettings::Id(IdNode::VirtualParameter(self.virtual_parameter(*parameter_idx)?))
            }
            D::CachedId {
                input_value_node_idx,
                mode,
            } => NodeSettings::Id(IdNode::Cached {
                input: self.set_node_from_index(*input_value_node_idx, "input_value_node_idx")?,
                mode: *mode,
            }),

            // Bone masks
            D::BoneMask { bone_mask_id } => {
                let skeleton = &self.data_set.skeleton;
                let mask = match skeleton.bone_mask_index(bone_mask_id) {
                    Some(idx) => BoneMask::from_weights(skeleton.bone_mask(idx).weights.clone()),
                    None => {
                        log::warn!(
                            "node {}: couldn't find bone mask with id `{}`",
                            self.node,
                            bone_mask_id
                        );
                        BoneMask::uniform(skeleton.num_bones(), 0.0)
                    }
                };
                NodeSettings::BoneMask(BoneMaskNode::Fixed(mask))
            }
            D::FixedWeightBoneMask { bone_weight } => NodeSettings::BoneMask(BoneMaskNode::Fixed(
                BoneMask::uniform(self.data_set.skeleton.num_bones(), *bone_weight),
            )),
            D::BoneMaskBlend {
                source_mask_node_idx,
                target_mask_node_idx,
                blend_weight_value_node_idx,
            } => NodeSettings::BoneMask(BoneMaskNode::Blend {
                source: self.set_node_from_index(*source_mask_node_idx, "source_mask_node_idx")?,
                target: self.set_node_from_index(*target_mask_node_idx, "target_mask_node_idx")?,
                weight: self
                    .set_node_from_index(*blend_weight_value_node_idx, "blend_weight_value_node_idx")?,
            }),
            D::BoneMaskSelector {
                parameter_value_node_idx,
                default_mask_node_idx,
                mask_node_indices,
                parameter_values,
                switch_dynamically,
                blend_time_seconds,
            } => {
                self.check_same_len(
                    ("mask_node_indices", mask_node_indices.len()),
                    ("parameter_values", parameter_values.len()),
                )?;
                NodeSettings::BoneMask(BoneMaskNode::Selector {
                    parameter: self
                        .set_node_from_index(*parameter_value_node_idx, "parameter_value_node_idx")?,
                    default: self.set_optional_node_from_index(*default_mask_node_idx)?,
                    options: self.set_nodes_from_index_array(mask_node_indices, "mask_node_indices")?,
                    parameter_values: parameter_values.clone(),
                    switch_dynamically: *switch_dynamically,
                    blend_time: *blend_time_seconds,
                })
            }
            D::BoneMaskSwitch {
                switch_value_node_idx,
                true_value_node_idx,
                false_value_node_idx,
            } => NodeSettings::BoneMask(BoneMaskNode::Switch {
                switch: self.set_node_from_index(*switch_value_node_idx, "switch_value_node_idx")?,
                on_true: self.set_node_from_index(*true_value_node_idx, "true_value_node_idx")?,
                on_false: self.set_node_from_index(*false_value_node_idx, "false_value_node_idx")?,
            }),
            D::VirtualParameterBoneMask { parameter_idx } => NodeSettings::BoneMask(
                BoneMaskNode::VirtualParameter(self.virtual_parameter(*parameter_idx)?),
            ),

            // Poses
            D::ReferencePose => NodeSettings::Pose(PoseNode::ReferencePose),
            D::ZeroPose => NodeSettings::Pose(PoseNode::ZeroPose),
            D::Clip {
                data_slot_idx,
                speed_multiplier,
                allow_looping,
                sample_root_motion,
                reset_time_value_node_idx,
                play_in_reverse_value_node_idx,
            } => NodeSettings::Pose(PoseNode::Clip(ClipSettings {
                source: self.data_slot(*data_slot_idx)?,
                speed_multiplier: *speed_multiplier,
                allow_looping: *allow_looping,
                sample_root_motion: *sample_root_motion,
                reset_time: self.set_optional_node_from_index(*reset_time_value_node_idx)?,
                play_in_reverse: self.set_optional_node_from_index(*play_in_reverse_value_node_idx)?,
            })),
            D::AnimationPose {
                data_slot_idx,
                pose_time_value_node_idx,
                user_specified_time,
                input_time_remap_range,
                use_frames_as_input,
            } => NodeSettings::Pose(PoseNode::AnimationPose(AnimationPoseSettings {
                source: self.data_slot(*data_slot_idx)?,
                pose_time: self.set_optional_node_from_index(*pose_time_value_node_idx)?,
                user_specified_time: *user_specified_time,
                remap_range: *input_time_remap_range,
                use_frames_as_input: *use_frames_as_input,
            })),
            D::ClipSelector {
                option_node_indices,
                condition_node_indices,
            } => {
                self.check_same_len(
                    ("option_node_indices", option_node_indices.len()),
                    ("condition_node_indices", condition_node_indices.len()),
                )?;
                NodeSettings::Pose(PoseNode::ClipSelector {
                    options: self.set_nodes_from_index_array(option_node_indices, "option_node_indices")?,
                    conditions: self
                        .set_nodes_from_index_array(condition_node_indices, "condition_node_indices")?,
                })
            }
            D::ParameterizedClipSelector {
                option_node_indices,
                parameter_node_idx,
                option_weights,
                has_weights_set,
            } => {
                let weights = if *has_weights_set {
                    self.check_same_len(
                        ("option_node_indices", option_node_indices.len()),
                        ("option_weights", option_weights.len()),
                    )?;
                    if let Some(i) = option_weights.iter().position(|w| *w == 0) {
                        return Err(GraphError::InvalidOptionWeights {
                            node: self.node,
                            reason: format!("weight for option {i} is zero"),
                        });
                    }
                    Some(option_weights.clone())
                } else {
                    None
                };
                NodeSettings::Pose(PoseNode::ParameterizedClipSelector {
                    options: self.set_nodes_from_index_array(option_node_indices, "option_node_indices")?,
                    parameter: self.set_node_from_index(*parameter_node_idx, "parameter_node_idx")?,
                    weights,
                })
            }
            D::TargetSelector {
                option_node_indices,
            } => NodeSettings::Pose(PoseNode::TargetSelector {
                options: self.set_nodes_from_index_array(option_node_indices, "option_node_indices")?,
            }),
            D::LayerBlend {
                base_node_idx,
                layers,
            } => NodeSettings::Pose(PoseNode::LayerBlend(LayerBlendSettings {
                base: self.set_node_from_index(*base_node_idx, "base_node_idx")?,
                layers: layers
                    .iter()
                    .map(|layer| {
                        Ok(LayerSettings {
                            input: self.set_node_from_index(layer.input_node_idx, "layers.input_node_idx")?,
                            blend_mode: layer.blend_mode,
                        })
                    })
                    .collect::<GraphResult<_>>()?,
            })),
            D::State {
                child_node_idx,
                layer_bone_mask_node_idx,
                layer_weight_node_idx,
                layer_root_motion_weight_node_idx,
                entry_events,
                execute_events,
                exit_events,
                is_off_state,
            } => NodeSettings::Pose(PoseNode::State(StateSettings {
                child: self.set_optional_node_from_index(*child_node_idx)?,
                bone_mask: self.set_optional_node_from_index(*layer_bone_mask_node_idx)?,
                layer_weight: self.set_optional_node_from_index(*layer_weight_node_idx)?,
                root_motion_weight: self
                    .set_optional_node_from_index(*layer_root_motion_weight_node_idx)?,
                entry_events: entry_events.clone(),
                execute_events: execute_events.clone(),
                exit_events: exit_events.clone(),
                is_off_state: *is_off_state,
                subgraph: self.owned_subgraph(&definition.owned_children()),
            })),
            D::Transition {
                target_state_node_idx,
                duration,
                duration_kind,
                duration_override_node_idx,
                blend_weight_easing,
                root_motion_blend,
                clamp_duration,
                cache_source_pose,
            } => NodeSettings::Pose(PoseNode::Transition(TransitionSettings {
                target: self.set_node_from_index(*target_state_node_idx, "target_state_node_idx")?,
                duration: *duration,
                duration_kind: *duration_kind,
                duration_override: self.set_optional_node_from_index(*duration_override_node_idx)?,
                easing: *blend_weight_easing,
                root_motion_blend: *root_motion_blend,
                clamp_duration: *clamp_duration,
                cache_source_pose: *cache_source_pose,
            })),
            D::StateMachine {
                states,
                default_state_index,
            } => {
                let default_state = self.state_index(*default_state_index, states.len())?;
                let states = states
                    .iter()
                    .map(|state| {
                        let transitions = state
                            .transitions
                            .iter()
                            .map(|t| {
                                Ok(TransitionInfo {
                                    transition: self
                                        .set_node_from_index(t.transition_node_idx, "transition_node_idx")?,
                                    condition: self
                                        .set_node_from_index(t.condition_node_idx, "condition_node_idx")?,
                                    target_state: self.state_index(t.target_state_idx, states.len())?,
                                    can_be_forced: t.can_be_forced,
                                })
                            })
                            .collect::<GraphResult<Vec<_>>>()?;
                        Ok(StateInfo {
                            state: self.set_node_from_index(state.state_node_idx, "state_node_idx")?,
                            entry_condition: self
                                .set_optional_node_from_index(state.entry_condition_node_idx)?,
                            transitions,
                        })
                    })
                    .collect::<GraphResult<Vec<_>>>()?;
                NodeSettings::Pose(PoseNode::StateMachine(StateMachineSettings {
                    states,
                    default_state,
                }))
            }
        };
        Ok(settings)
    }
}
