//! Float value nodes.

use crate::context::GraphContext;
use crate::definition::{CachedValueMode, FloatAngleOperation, FloatMathOperator};
use crate::math::{remap_range, saturate, EasingOperation, FloatCurve, FloatRange};

use super::handle::{BoolNodeIdx, FloatNodeIdx, IdNodeIdx, NodeHandle};
use super::{Evaluator, NodeSettings, NodeState};

/// Values closer than this to their target snap onto it.
const EASE_SNAP_THRESHOLD: f32 = 0.01;

#[derive(Debug)]
pub(crate) enum FloatNode {
    Const(f32),
    ControlParameter(usize),
    VirtualParameter(FloatNodeIdx),
    Cached {
        input: FloatNodeIdx,
        mode: CachedValueMode,
    },
    Math {
        a: FloatNodeIdx,
        b: Option<FloatNodeIdx>,
        value_b: f32,
        operator: FloatMathOperator,
        absolute: bool,
        negated: bool,
    },
    Clamp {
        input: FloatNodeIdx,
        range: FloatRange,
    },
    Remap {
        input: FloatNodeIdx,
        input_range: FloatRange,
        output_range: FloatRange,
    },
    Curve {
        input: FloatNodeIdx,
        curve: FloatCurve,
    },
    AngleMath {
        input: FloatNodeIdx,
        operation: FloatAngleOperation,
    },
    Ease {
        input: FloatNodeIdx,
        ease_time: f32,
        easing: EasingOperation,
        start_value: Option<f32>,
    },
    Selector {
        conditions: Vec<BoolNodeIdx>,
        values: Vec<f32>,
        default_value: f32,
        ease_time: f32,
        easing: EasingOperation,
    },
    Switch {
        switch: BoolNodeIdx,
        on_true: FloatNodeIdx,
        on_false: FloatNodeIdx,
    },
    IdToFloat {
        input: IdNodeIdx,
        ids: Vec<String>,
        values: Vec<f32>,
        default_value: f32,
    },
}

/// Progress of an eased value toward its latest target.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct EaseState {
    pub range: FloatRange,
    pub current_value: f32,
    pub current_ease_time: f32,
}

impl Default for EaseState {
    fn default() -> Self {
        Self::starting_at(0.0)
    }
}

impl EaseState {
    pub fn starting_at(value: f32) -> Self {
        Self {
            range: FloatRange::at(value),
            current_value: value,
            current_ease_time: 0.0,
        }
    }

    /// Advance toward `target`. A new target restarts the ease from the current value.
    pub fn advance(&mut self, delta_time: f32, target: f32, ease_time: f32, easing: EasingOperation) {
        if (self.current_value - target).abs() < EASE_SNAP_THRESHOLD {
            *self = Self::starting_at(target);
            return;
        }

        if target != self.range.max {
            self.range = FloatRange::new(self.current_value, target);
            self.current_ease_time = 0.0;
        }

        self.current_ease_time += delta_time;
        let t = if ease_time > 0.0 {
            saturate(self.current_ease_time / ease_time)
        } else {
            1.0
        };
        self.current_value = self.range.min + easing.ease(t) * self.range.length();
    }
}

impl FloatMathOperator {
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            FloatMathOperator::Add => a + b,
            FloatMathOperator::Sub => a - b,
            FloatMathOperator::Mul => a * b,
            FloatMathOperator::Div => {
                if b == 0.0 {
                    0.0
                } else {
                    a / b
                }
            }
            FloatMathOperator::Mod => {
                if b == 0.0 {
                    0.0
                } else {
                    a % b
                }
            }
            FloatMathOperator::Abs => a.abs(),
            FloatMathOperator::Negate => -a,
            FloatMathOperator::Floor => a.floor(),
            FloatMathOperator::Ceiling => a.ceil(),
            FloatMathOperator::IntegerPart => a.floor(),
            FloatMathOperator::FractionalPart => a - a.floor(),
            FloatMathOperator::InverseFractionalPart => 1.0 - (a - a.floor()),
        }
    }
}

fn clamp_angle_180(angle: f32) -> f32 {
    let mut angle = angle % 360.0;
    if angle > 180.0 {
        angle -= 360.0;
    }
    if angle <= -180.0 {
        angle += 360.0;
    }
    angle
}

fn clamp_angle_360(angle: f32) -> f32 {
    let angle = angle % 360.0;
    if angle < 0.0 {
        angle + 360.0
    } else {
        angle
    }
}

impl FloatAngleOperation {
    pub fn apply(self, degrees: f32) -> f32 {
        match self {
            FloatAngleOperation::ClampTo180 => clamp_angle_180(degrees),
            FloatAngleOperation::ClampTo360 => clamp_angle_360(degrees),
            FloatAngleOperation::FlipHemisphere => clamp_angle_180(degrees - 180.0),
            FloatAngleOperation::FlipHemisphereNegate => -clamp_angle_180(degrees - 180.0),
        }
    }
}

impl<'g> Evaluator<'g> {
    fn float_node(&self, idx: FloatNodeIdx) -> &'g FloatNode {
        match self.node(idx.index()) {
            NodeSettings::Float(node) => node,
            _ => unreachable!("node {} is not a float node", idx.index()),
        }
    }

    fn ease_state_mut(&mut self, idx: FloatNodeIdx) -> &mut EaseState {
        match &mut self.states[idx.index()] {
            NodeState::Ease(state) => state,
            _ => unreachable!("node {} has no ease state", idx.index()),
        }
    }

    pub(crate) fn float_value(&mut self, idx: FloatNodeIdx, ctx: &mut GraphContext<'_>) -> f32 {
        match self.float_node(idx) {
            FloatNode::Const(value) => *value,
            FloatNode::ControlParameter(param) => ctx.parameters.float_at(*param),
            FloatNode::VirtualParameter(inner) => self.float_value(*inner, ctx),
            FloatNode::Cached { input, mode } => {
                let input = *input;
                self.cached_value(idx.index(), *mode, ctx, |ev, ctx| ev.float_value(input, ctx))
            }
            FloatNode::Math {
                a,
                b,
                value_b,
                operator,
                absolute,
                negated,
            } => {
                let a = self.float_value(*a, ctx);
                let b = match b {
                    Some(node) => self.float_value(*node, ctx),
                    None => *value_b,
                };
                let mut result = operator.apply(a, b);
                if *absolute {
                    result = result.abs();
                }
                if *negated {
                    result = -result;
                }
                result
            }
            FloatNode::Clamp { input, range } => {
                let value = self.float_value(*input, ctx);
                range.clamp(value)
            }
            FloatNode::Curve { input, curve } => {
                let value = self.float_value(*input, ctx);
                curve.evaluate(value)
            }
            FloatNode::Remap {
                input,
                input_range,
                output_range,
            } => {
                let value = self.float_value(*input, ctx);
                remap_range(
                    value,
                    input_range.min,
                    input_range.max,
                    output_range.min,
                    output_range.max,
                )
            }
            FloatNode::AngleMath { input, operation } => {
                let value = self.float_value(*input, ctx);
                operation.apply(value)
            }
            FloatNode::Ease {
                input,
                ease_time,
                easing,
                ..
            } => {
                let target = self.float_value(*input, ctx);
                let state = self.ease_state_mut(idx);
                state.advance(ctx.delta_time, target, *ease_time, *easing);
                state.current_value
            }
            FloatNode::Selector {
                conditions,
                values,
                default_value,
                ease_time,
                easing,
            } => {
                let mut target = *default_value;
                for (i, &condition) in conditions.iter().enumerate() {
                    if self.bool_value(condition, ctx) {
                        target = values[i];
                        break;
                    }
                }
                if *easing == EasingOperation::None {
                    return target;
                }
                let state = self.ease_state_mut(idx);
                state.advance(ctx.delta_time, target, *ease_time, *easing);
                state.current_value
            }
            FloatNode::Switch {
                switch,
                on_true,
                on_false,
            } => {
                if self.bool_value(*switch, ctx) {
                    self.float_value(*on_true, ctx)
                } else {
                    self.float_value(*on_false, ctx)
                }
            }
            FloatNode::IdToFloat {
                input,
                ids,
                values,
                default_value,
            } => {
                let id = self.id_value(*input, ctx);
                match ids.iter().position(|candidate| *candidate == id) {
                    Some(i) => values[i],
                    None => *default_value,
                }
            }
        }
    }

    pub(crate) fn reset_float(&mut self, idx: usize, node: &'g FloatNode, ctx: &mut GraphContext<'_>) {
        let idx = FloatNodeIdx(idx as u16);
        match node {
            FloatNode::Cached { .. } => {
                if let NodeState::CachedFloat(cached) = &mut self.states[idx.index()] {
                    *cached = Default::default();
                }
            }
            FloatNode::Ease {
                input, start_value, ..
            } => {
                let start = match start_value {
                    Some(value) => *value,
                    None => self.float_value(*input, ctx),
                };
                *self.ease_state_mut(idx) = EaseState::starting_at(start);
            }
            FloatNode::Selector { .. } => *self.ease_state_mut(idx) = EaseState::default(),
            _ => {}
        }
    }
}
