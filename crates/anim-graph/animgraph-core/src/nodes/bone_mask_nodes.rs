//! Bone mask value nodes.

use crate::bone_mask::BoneMask;
use crate::context::GraphContext;

use super::handle::{BoneMaskNodeIdx, BoolNodeIdx, FloatNodeIdx, IdNodeIdx, NodeHandle};
use super::{Evaluator, NodeSettings, NodeState};

#[derive(Debug)]
pub(crate) enum BoneMaskNode {
    /// Named skeleton mask or a uniform weight, resolved at build time.
    Fixed(BoneMask),
    Blend {
        source: BoneMaskNodeIdx,
        target: BoneMaskNodeIdx,
        weight: FloatNodeIdx,
    },
    Selector {
        parameter: IdNodeIdx,
        default: Option<BoneMaskNodeIdx>,
        options: Vec<BoneMaskNodeIdx>,
        parameter_values: Vec<String>,
        switch_dynamically: bool,
        blend_time: f32,
    },
    Switch {
        switch: BoolNodeIdx,
        on_true: BoneMaskNodeIdx,
        on_false: BoneMaskNodeIdx,
    },
    VirtualParameter(BoneMaskNodeIdx),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct BoneMaskSelectorState {
    /// Option in use; `None` falls back to the default mask.
    pub selected: Option<usize>,
    pub new_selection: Option<usize>,
    pub time_in_blend: f32,
    pub blending: bool,
}

impl<'g> Evaluator<'g> {
    fn bone_mask_node(&self, idx: BoneMaskNodeIdx) -> &'g BoneMaskNode {
        match self.node(idx.index()) {
            NodeSettings::BoneMask(node) => node,
            _ => unreachable!("node {} is not a bone mask node", idx.index()),
        }
    }

    fn selector_state_mut(&mut self, idx: BoneMaskNodeIdx) -> &mut BoneMaskSelectorState {
        match &mut self.states[idx.index()] {
            NodeState::BoneMaskSelector(state) => state,
            _ => unreachable!("node {} has no selector state", idx.index()),
        }
    }

    pub(crate) fn bone_mask_value(
        &mut self,
        idx: BoneMaskNodeIdx,
        ctx: &mut GraphContext<'_>,
    ) -> BoneMask {
        match self.bone_mask_node(idx) {
            BoneMaskNode::Fixed(mask) => mask.clone(),
            BoneMaskNode::Blend {
                source,
                target,
                weight,
            } => {
                let source = self.bone_mask_value(*source, ctx);
                let target = self.bone_mask_value(*target, ctx);
                let weight = self.float_value(*weight, ctx);
                if weight <= 0.0 {
                    source
                } else if weight >= 1.0 {
                    target
                } else {
                    BoneMask::blend(&source, &target, weight)
                }
            }
            BoneMaskNode::Selector {
                switch_dynamically,
                blend_time,
                ..
            } => {
                if *switch_dynamically && !self.selector_state_mut(idx).blending {
                    let candidate = self.select_bone_mask(idx, ctx);
                    let state = self.selector_state_mut(idx);
                    if candidate != state.selected {
                        state.new_selection = candidate;
                        state.time_in_blend = 0.0;
                        state.blending = true;
                    }
                }

                let state = self.selector_state_mut(idx);
                if !state.blending {
                    let selected = state.selected;
                    return self.bone_mask_option(idx, selected, ctx);
                }

                state.time_in_blend += ctx.delta_time;
                let weight = if *blend_time > 0.0 {
                    state.time_in_blend / blend_time
                } else {
                    1.0
                };
                let (selected, new_selection) = (state.selected, state.new_selection);
                if weight >= 1.0 {
                    let state = self.selector_state_mut(idx);
                    state.selected = new_selection;
                    state.new_selection = None;
                    state.blending = false;
                    self.bone_mask_option(idx, new_selection, ctx)
                } else {
                    let from = self.bone_mask_option(idx, selected, ctx);
                    let to = self.bone_mask_option(idx, new_selection, ctx);
                    BoneMask::blend(&from, &to, weight)
                }
            }
            BoneMaskNode::Switch {
                switch,
                on_true,
                on_false,
            } => {
                if self.bool_value(*switch, ctx) {
                    self.bone_mask_value(*on_true, ctx)
                } else {
                    self.bone_mask_value(*on_false, ctx)
                }
            }
            BoneMaskNode::VirtualParameter(inner) => self.bone_mask_value(*inner, ctx),
        }
    }

    /// Option index whose parameter value matches the selector's id input.
    fn select_bone_mask(&mut self, idx: BoneMaskNodeIdx, ctx: &mut GraphContext<'_>) -> Option<usize> {
        let BoneMaskNode::Selector {
            parameter,
            parameter_values,
            ..
        } = self.bone_mask_node(idx)
        else {
            return None;
        };
        let id = self.id_value(*parameter, ctx);
        parameter_values.iter().position(|value| *value == id)
    }

    fn bone_mask_option(
        &mut self,
        idx: BoneMaskNodeIdx,
        option: Option<usize>,
        ctx: &mut GraphContext<'_>,
    ) -> BoneMask {
        let BoneMaskNode::Selector {
            default, options, ..
        } = self.bone_mask_node(idx)
        else {
            unreachable!("node {} is not a bone mask selector", idx.index());
        };
        match (option, default) {
            (Some(i), _) => self.bone_mask_value(options[i], ctx),
            (None, Some(default)) => self.bone_mask_value(*default, ctx),
            (None, None) => BoneMask::uniform(ctx.skeleton.num_bones(), 1.0),
        }
    }

    pub(crate) fn reset_bone_mask(
        &mut self,
        idx: usize,
        node: &'g BoneMaskNode,
        ctx: &mut GraphContext<'_>,
    ) {
        if let BoneMaskNode::Selector { .. } = node {
            let idx = BoneMaskNodeIdx(idx as u16);
            let selected = self.select_bone_mask(idx, ctx);
            *self.selector_state_mut(idx) = BoneMaskSelectorState {
                selected,
                ..Default::default()
            };
        }
    }
}
