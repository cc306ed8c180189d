//! Serialized graph description: a flat node table addressed by `i16` indices.
//!
//! Child references use `-1` for "absent". The table is resolved into typed handles exactly once
//! by [`Graph::new`](crate::Graph::new); nothing in this module is consulted while updating.

use serde::{Deserialize, Serialize};

use crate::math::{self, EasingOperation, FloatRange};

/// Sentinel for an unset node index.
pub const INVALID_INDEX: i16 = -1;

fn invalid_index() -> i16 {
    INVALID_INDEX
}

fn one() -> f32 {
    1.0
}

fn yes() -> bool {
    true
}

fn default_epsilon() -> f32 {
    1.0e-5
}

fn default_easing() -> EasingOperation {
    EasingOperation::Linear
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphDefinition {
    #[serde(default)]
    pub id: String,
    pub root_node_idx: i16,
    /// Names for control parameter nodes; entry `i` names node `i`.
    #[serde(default)]
    pub control_parameter_ids: Vec<String>,
    #[serde(default)]
    pub virtual_parameter_ids: Vec<String>,
    /// Value node backing each virtual parameter, parallel to `virtual_parameter_ids`.
    #[serde(default)]
    pub virtual_parameter_node_indices: Vec<i16>,
    pub nodes: Vec<NodeDefinition>,
}

impl GraphDefinition {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CachedValueMode {
    /// Keep the first value seen after a reset.
    OnEntry,
    /// Track the input until the branch goes inactive, then freeze.
    #[default]
    OnExit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FloatComparisonOperator {
    GreaterThanEqual,
    LessThanEqual,
    NearEqual,
    GreaterThan,
    LessThan,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdComparison {
    #[default]
    Matches,
    DoesntMatch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeComparisonType {
    PercentageThroughState,
    PercentageThroughSyncEvent,
    ElapsedTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeConditionOperator {
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
}

/// Permission markers carried by transition events, ordered from least to most restrictive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransitionRule {
    AllowTransition,
    ConditionallyAllowTransition,
    BlockTransition,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionRuleCondition {
    AnyAllowed,
    FullyAllowed,
    ConditionallyAllowed,
    Blocked,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FloatMathOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Abs,
    Negate,
    Floor,
    Ceiling,
    IntegerPart,
    FractionalPart,
    InverseFractionalPart,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FloatAngleOperation {
    ClampTo180,
    ClampTo360,
    FlipHemisphere,
    FlipHemisphereNegate,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RootMotionBlendMode {
    #[default]
    Blend,
    Additive,
    IgnoreSource,
    IgnoreTarget,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionDurationKind {
    #[default]
    Seconds,
    /// Fraction of the source's synchronisation track.
    SyncEventPercentage,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerBlendMode {
    #[default]
    Blend,
    Additive,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitionDefinition {
    pub transition_node_idx: i16,
    pub condition_node_idx: i16,
    pub target_state_idx: i16,
    #[serde(default)]
    pub can_be_forced: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateDefinition {
    pub state_node_idx: i16,
    #[serde(default = "invalid_index")]
    pub entry_condition_node_idx: i16,
    #[serde(default)]
    pub transitions: Vec<TransitionDefinition>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayerDefinition {
    pub input_node_idx: i16,
    #[serde(default)]
    pub blend_mode: LayerBlendMode,
}

/// One entry of the node table. The `type` tag selects the node kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeDefinition {
    // --- Bool values ---
    ConstBool {
        value: bool,
    },
    ControlParameterBool,
    VirtualParameterBool {
        parameter_idx: i16,
    },
    CachedBool {
        input_value_node_idx: i16,
        #[serde(default)]
        mode: CachedValueMode,
    },
    And {
        condition_node_indices: Vec<i16>,
    },
    Or {
        condition_node_indices: Vec<i16>,
    },
    Not {
        input_value_node_idx: i16,
    },
    FloatComparison {
        input_value_node_idx: i16,
        #[serde(default = "invalid_index")]
        comparand_value_node_idx: i16,
        #[serde(default)]
        comparand: f32,
        #[serde(default = "default_epsilon")]
        epsilon: f32,
        comparison: FloatComparisonOperator,
    },
    FloatRangeComparison {
        input_value_node_idx: i16,
        range: FloatRange,
        #[serde(default = "yes")]
        is_inclusive_check: bool,
    },
    IdComparison {
        input_value_node_idx: i16,
        #[serde(default)]
        comparison: IdComparison,
        comparison_ids: Vec<String>,
    },
    StateCompletedCondition {
        source_state_node_idx: i16,
        #[serde(default)]
        transition_duration_seconds: f32,
    },
    TimeCondition {
        source_state_node_idx: i16,
        #[serde(default = "invalid_index")]
        input_value_node_idx: i16,
        #[serde(default)]
        comparand: f32,
        comparison_type: TimeComparisonType,
        operator: TimeConditionOperator,
    },
    TransitionEventCondition {
        #[serde(default = "invalid_index")]
        source_state_node_idx: i16,
        rule_condition: TransitionRuleCondition,
        #[serde(default)]
        ignore_inactive_events: bool,
        #[serde(default)]
        require_rule_id: Option<String>,
    },
    IsInactiveBranch,

    // --- Float values ---
    ConstFloat {
        value: f32,
    },
    ControlParameterFloat,
    VirtualParameterFloat {
        parameter_idx: i16,
    },
    CachedFloat {
        input_value_node_idx: i16,
        #[serde(default)]
        mode: CachedValueMode,
    },
    FloatMath {
        input_value_node_idx_a: i16,
        #[serde(default = "invalid_index")]
        input_value_node_idx_b: i16,
        #[serde(default)]
        value_b: f32,
        operator: FloatMathOperator,
        #[serde(default)]
        return_absolute_result: bool,
        #[serde(default)]
        return_negated_result: bool,
    },
    FloatClamp {
        input_value_node_idx: i16,
        clamp_range: FloatRange,
    },
    FloatRemap {
        input_value_node_idx: i16,
        input_range: FloatRange,
        output_range: FloatRange,
    },
    /// Looks the input up on a keyed curve.
    FloatCurve {
        input_value_node_idx: i16,
        curve: math::FloatCurve,
    },
    FloatAngleMath {
        input_value_node_idx: i16,
        operation: FloatAngleOperation,
    },
    FloatEase {
        input_value_node_idx: i16,
        ease_time: f32,
        #[serde(default = "default_easing")]
        easing_op: EasingOperation,
        #[serde(default)]
        use_start_value: bool,
        #[serde(default)]
        start_value: f32,
    },
    FloatSelector {
        condition_node_indices: Vec<i16>,
        values: Vec<f32>,
        #[serde(default)]
        default_value: f32,
        #[serde(default)]
        ease_time: f32,
        #[serde(default = "no_easing")]
        easing_op: EasingOperation,
    },
    FloatSwitch {
        switch_value_node_idx: i16,
        true_value_node_idx: i16,
        false_value_node_idx: i16,
    },
    IdToFloat {
        input_value_node_idx: i16,
        ids: Vec<String>,
        values: Vec<f32>,
        #[serde(default)]
        default_value: f32,
    },

    // --- Id values ---
    ConstId {
        value: String,
    },
    ControlParameterId,
    VirtualParameterId {
        parameter_idx: i16,
    },
    CachedId {
        input_value_node_idx: i16,
        #[serde(default)]
        mode: CachedValueMode,
    },

    // --- Bone masks ---
    BoneMask {
        bone_mask_id: String,
    },
    FixedWeightBoneMask {
        bone_weight: f32,
    },
    BoneMaskBlend {
        source_mask_node_idx: i16,
        target_mask_node_idx: i16,
        blend_weight_value_node_idx: i16,
    },
    BoneMaskSelector {
        parameter_value_node_idx: i16,
        #[serde(default = "invalid_index")]
        default_mask_node_idx: i16,
        mask_node_indices: Vec<i16>,
        parameter_values: Vec<String>,
        #[serde(default)]
        switch_dynamically: bool,
        #[serde(default)]
        blend_time_seconds: f32,
    },
    BoneMaskSwitch {
        switch_value_node_idx: i16,
        true_value_node_idx: i16,
        false_value_node_idx: i16,
    },
    VirtualParameterBoneMask {
        parameter_idx: i16,
    },

    // --- Poses ---
    ReferencePose,
    ZeroPose,
    Clip {
        data_slot_idx: i16,
        #[serde(default = "one")]
        speed_multiplier: f32,
        #[serde(default = "yes")]
        allow_looping: bool,
        #[serde(default = "yes")]
        sample_root_motion: bool,
        #[serde(default = "invalid_index")]
        reset_time_value_node_idx: i16,
        #[serde(default = "invalid_index")]
        play_in_reverse_value_node_idx: i16,
    },
    AnimationPose {
        data_slot_idx: i16,
        #[serde(default = "invalid_index")]
        pose_time_value_node_idx: i16,
        #[serde(default)]
        user_specified_time: f32,
        #[serde(default)]
        input_time_remap_range: Option<FloatRange>,
        #[serde(default)]
        use_frames_as_input: bool,
    },
    ClipSelector {
        option_node_indices: Vec<i16>,
        condition_node_indices: Vec<i16>,
    },
    ParameterizedClipSelector {
        option_node_indices: Vec<i16>,
        parameter_node_idx: i16,
        #[serde(default)]
        option_weights: Vec<u8>,
        #[serde(default)]
        has_weights_set: bool,
    },
    TargetSelector {
        option_node_indices: Vec<i16>,
    },
    LayerBlend {
        base_node_idx: i16,
        layers: Vec<LayerDefinition>,
    },
    State {
        #[serde(default = "invalid_index")]
        child_node_idx: i16,
        #[serde(default = "invalid_index")]
        layer_bone_mask_node_idx: i16,
        #[serde(default = "invalid_index")]
        layer_weight_node_idx: i16,
        #[serde(default = "invalid_index")]
        layer_root_motion_weight_node_idx: i16,
        #[serde(default)]
        entry_events: Vec<String>,
        #[serde(default)]
        execute_events: Vec<String>,
        #[serde(default)]
        exit_events: Vec<String>,
        #[serde(default)]
        is_off_state: bool,
    },
    Transition {
        target_state_node_idx: i16,
        #[serde(default)]
        duration: f32,
        #[serde(default)]
        duration_kind: TransitionDurationKind,
        #[serde(default = "invalid_index")]
        duration_override_node_idx: i16,
        #[serde(default = "default_easing")]
        blend_weight_easing: EasingOperation,
        #[serde(default)]
        root_motion_blend: RootMotionBlendMode,
        #[serde(default)]
        clamp_duration: bool,
        #[serde(default)]
        cache_source_pose: bool,
    },
    StateMachine {
        states: Vec<StateDefinition>,
        #[serde(default)]
        default_state_index: i16,
    },
}

fn no_easing() -> EasingOperation {
    EasingOperation::None
}

/// Node categories; each has its own evaluation entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeCategory {
    Bool,
    Float,
    Id,
    BoneMask,
    Pose,
}

impl NodeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeCategory::Bool => "bool",
            NodeCategory::Float => "float",
            NodeCategory::Id => "id",
            NodeCategory::BoneMask => "bone mask",
            NodeCategory::Pose => "pose",
        }
    }
}

impl NodeDefinition {
    pub fn category(&self) -> NodeCategory {
        use NodeDefinition::*;
        match self {
            ConstBool { .. }
            | ControlParameterBool
            | VirtualParameterBool { .. }
            | CachedBool { .. }
            | And { .. }
            | Or { .. }
            | Not { .. }
            | FloatComparison { .. }
            | FloatRangeComparison { .. }
            | IdComparison { .. }
            | StateCompletedCondition { .. }
            | TimeCondition { .. }
            | TransitionEventCondition { .. }
            | IsInactiveBranch => NodeCategory::Bool,

            ConstFloat { .. }
            | ControlParameterFloat
            | VirtualParameterFloat { .. }
            | CachedFloat { .. }
            | FloatMath { .. }
            | FloatClamp { .. }
            | FloatRemap { .. }
            | FloatCurve { .. }
            | FloatAngleMath { .. }
            | FloatEase { .. }
            | FloatSelector { .. }
            | FloatSwitch { .. }
            | IdToFloat { .. } => NodeCategory::Float,

            ConstId { .. } | ControlParameterId | VirtualParameterId { .. } | CachedId { .. } => {
                NodeCategory::Id
            }

            BoneMask { .. }
            | FixedWeightBoneMask { .. }
            | BoneMaskBlend { .. }
            | BoneMaskSelector { .. }
            | BoneMaskSwitch { .. }
            | VirtualParameterBoneMask { .. } => NodeCategory::BoneMask,

            ReferencePose
            | ZeroPose
            | Clip { .. }
            | AnimationPose { .. }
            | ClipSelector { .. }
            | ParameterizedClipSelector { .. }
            | TargetSelector { .. }
            | LayerBlend { .. }
            | State { .. }
            | Transition { .. }
            | StateMachine { .. } => NodeCategory::Pose,
        }
    }

    /// Human-readable kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeDefinition::State { .. } => "state",
            NodeDefinition::Transition { .. } => "transition",
            NodeDefinition::StateMachine { .. } => "state machine",
            NodeDefinition::Clip { .. }
            | NodeDefinition::ClipSelector { .. }
            | NodeDefinition::ParameterizedClipSelector { .. }
            | NodeDefinition::TargetSelector { .. } => "clip reference",
            other => other.category().as_str(),
        }
    }

    pub fn is_clip_reference(&self) -> bool {
        matches!(
            self,
            NodeDefinition::Clip { .. }
                | NodeDefinition::ClipSelector { .. }
                | NodeDefinition::ParameterizedClipSelector { .. }
                | NodeDefinition::TargetSelector { .. }
        )
    }

    /// Indices of the nodes this node owns: everything that should be re-initialised along with
    /// it. References to states (time and completion conditions, transition targets) and a state
    /// machine's states are not ownership edges; the state machine starts states itself.
    pub fn owned_children(&self) -> Vec<i16> {
        use NodeDefinition::*;
        let mut out = Vec::new();
        match self {
            ConstBool { .. }
            | ControlParameterBool
            | ConstFloat { .. }
            | ControlParameterFloat
            | ConstId { .. }
            | ControlParameterId
            | BoneMask { .. }
            | FixedWeightBoneMask { .. }
            | IsInactiveBranch
            | ReferencePose
            | ZeroPose
            | StateCompletedCondition { .. }
            | TransitionEventCondition { .. }
            | VirtualParameterBool { .. }
            | VirtualParameterFloat { .. }
            | VirtualParameterId { .. }
            | VirtualParameterBoneMask { .. } => {}

            CachedBool {
                input_value_node_idx,
                ..
            }
            | CachedFloat {
                input_value_node_idx,
                ..
            }
            | CachedId {
                input_value_node_idx,
                ..
            }
            | Not {
                input_value_node_idx,
            }
            | FloatRangeComparison {
                input_value_node_idx,
                ..
            }
            | IdComparison {
                input_value_node_idx,
                ..
            }
            | FloatClamp {
                input_value_node_idx,
                ..
            }
            | FloatRemap {
                input_value_node_idx,
                ..
            }
            | FloatCurve {
                input_value_node_idx,
                ..
            }
            | FloatAngleMath {
                input_value_node_idx,
                ..
            }
            | FloatEase {
                input_value_node_idx,
                ..
            }
            | IdToFloat {
                input_value_node_idx,
                ..
            }
            | TimeCondition {
                input_value_node_idx,
                ..
            } => out.push(*input_value_node_idx),

            And {
                condition_node_indices,
            }
            | Or {
                condition_node_indices,
            }
            | FloatSelector {
                condition_node_indices,
                ..
            } => out.extend_from_slice(condition_node_indices),

            FloatComparison {
                input_value_node_idx,
                comparand_value_node_idx,
                ..
            } => out.extend([*input_value_node_idx, *comparand_value_node_idx]),

            FloatMath {
                input_value_node_idx_a,
                input_value_node_idx_b,
                ..
            } => out.extend([*input_value_node_idx_a, *input_value_node_idx_b]),

            FloatSwitch {
                switch_value_node_idx,
                true_value_node_idx,
                false_value_node_idx,
            }
            | BoneMaskSwitch {
                switch_value_node_idx,
                true_value_node_idx,
                false_value_node_idx,
            } => out.extend([
                *switch_value_node_idx,
                *true_value_node_idx,
                *false_value_node_idx,
            ]),

            BoneMaskBlend {
                source_mask_node_idx,
                target_mask_node_idx,
                blend_weight_value_node_idx,
            } => out.extend([
                *source_mask_node_idx,
                *target_mask_node_idx,
                *blend_weight_value_node_idx,
            ]),

            BoneMaskSelector {
                parameter_value_node_idx,
                default_mask_node_idx,
                mask_node_indices,
                ..
            } => {
                out.push(*parameter_value_node_idx);
                out.push(*default_mask_node_idx);
                out.extend_from_slice(mask_node_indices);
            }

            Clip {
                reset_time_value_node_idx,
                play_in_reverse_value_node_idx,
                ..
            } => out.extend([*reset_time_value_node_idx, *play_in_reverse_value_node_idx]),

            AnimationPose {
                pose_time_value_node_idx,
                ..
            } => out.push(*pose_time_value_node_idx),

            Transition {
                duration_override_node_idx,
                ..
            } => out.push(*duration_override_node_idx),

            ClipSelector {
                option_node_indices,
                condition_node_indices,
            } => {
                out.extend_from_slice(option_node_indices);
                out.extend_from_slice(condition_node_indices);
            }

            ParameterizedClipSelector {
                option_node_indices,
                parameter_node_idx,
                ..
            } => {
                out.extend_from_slice(option_node_indices);
                out.push(*parameter_node_idx);
            }

            TargetSelector {
                option_node_indices,
            } => out.extend_from_slice(option_node_indices),

            LayerBlend {
                base_node_idx,
                layers,
            } => {
                out.push(*base_node_idx);
                out.extend(layers.iter().map(|l| l.input_node_idx));
            }

            State {
                child_node_idx,
                layer_bone_mask_node_idx,
                layer_weight_node_idx,
                layer_root_motion_weight_node_idx,
                ..
            } => out.extend([
                *child_node_idx,
                *layer_bone_mask_node_idx,
                *layer_weight_node_idx,
                *layer_root_motion_weight_node_idx,
            ]),

            StateMachine { states, .. } => {
                for state in states {
                    out.push(state.entry_condition_node_idx);
                    for transition in &state.transitions {
                        out.push(transition.condition_node_idx);
                        out.push(transition.transition_node_idx);
                    }
                }
            }
        }
        out.retain(|idx| *idx >= 0);
        out
    }
}
