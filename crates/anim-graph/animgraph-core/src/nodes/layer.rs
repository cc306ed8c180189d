//! Layer blending: a base pose with weighted, optionally masked layers on top.

use crate::context::{GraphContext, LayerContext};
use crate::definition::LayerBlendMode;
use crate::math::Transform;

use super::handle::PoseNodeIdx;
use super::{pose_of, Evaluator, GraphPoseNodeResult};

#[derive(Debug)]
pub(crate) struct LayerSettings {
    pub input: PoseNodeIdx,
    pub blend_mode: LayerBlendMode,
}

#[derive(Debug)]
pub(crate) struct LayerBlendSettings {
    pub base: PoseNodeIdx,
    pub layers: Vec<LayerSettings>,
}

impl<'g> Evaluator<'g> {
    pub(crate) fn update_layer_blend(
        &mut self,
        idx: PoseNodeIdx,
        settings: &'g LayerBlendSettings,
        ctx: &mut GraphContext<'_>,
    ) -> GraphPoseNodeResult {
        let base = self.update_pose(settings.base, ctx);
        self.copy_timing(settings.base, idx);
        self.write_pose_with(idx, |out, states| out.copy_from(pose_of(states, base.pose)));
        let mut root_motion_delta = base.root_motion_delta;

        for layer in &settings.layers {
            let (result, layer_context) = ctx.with_layer_context(Some(LayerContext::default()), |ctx| {
                self.update_pose(layer.input, ctx)
            });
            let layer_context = layer_context.unwrap_or_default();
            let weight = layer_context.weight;
            let mask = layer_context.bone_mask.as_ref();

            if weight > 0.0 {
                self.write_pose_with(idx, |out, states| {
                    let layer_pose = pose_of(states, result.pose);
                    match layer.blend_mode {
                        LayerBlendMode::Blend => out.blend_toward(layer_pose, weight, mask),
                        LayerBlendMode::Additive => out.add_additive(layer_pose, weight, mask),
                    }
                });
            }

            let root_weight = layer_context.root_motion_weight;
            if root_weight > 0.0 {
                root_motion_delta = match layer.blend_mode {
                    LayerBlendMode::Blend => {
                        Transform::interpolate(&root_motion_delta, &result.root_motion_delta, root_weight)
                    }
                    LayerBlendMode::Additive => {
                        let scaled = Transform::interpolate(
                            &Transform::IDENTITY,
                            &result.root_motion_delta,
                            root_weight,
                        );
                        Transform::compose(&scaled, &root_motion_delta)
                    }
                };
            }
        }

        GraphPoseNodeResult {
            pose: idx,
            root_motion_delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{LayerDefinition, NodeDefinition as D};
    use crate::test_support::Harness;
    use approx::assert_relative_eq;

    fn layered_state(child: i16, weight: i16, mask: i16) -> D {
        D::State {
            child_node_idx: child,
            layer_bone_mask_node_idx: mask,
            layer_weight_node_idx: weight,
            layer_root_motion_weight_node_idx: -1,
            entry_events: vec![],
            execute_events: vec![],
            exit_events: vec![],
            is_off_state: false,
        }
    }

    #[test]
    fn layer_weight_and_mask_scale_the_blend() {
        let mut h = Harness::new(vec![
            D::ZeroPose,
            D::ReferencePose,
            D::ConstFloat { value: 0.5 },
            layered_state(1, 2, -1),
            D::BoneMask {
                bone_mask_id: "upper".into(),
            },
            layered_state(1, -1, 4),
            D::LayerBlend {
                base_node_idx: 0,
                layers: vec![LayerDefinition {
                    input_node_idx: 3,
                    blend_mode: LayerBlendMode::Blend,
                }],
            },
            D::LayerBlend {
                base_node_idx: 0,
                layers: vec![LayerDefinition {
                    input_node_idx: 5,
                    blend_mode: LayerBlendMode::Blend,
                }],
            },
        ]);
        let reference = h.skeleton().parent_space_reference_pose().to_vec();

        let result = h.eval(0.1, |ev, ctx| ev.update_pose(PoseNodeIdx(6), ctx));
        assert_eq!(result.pose, PoseNodeIdx(6));
        let pose = h.pose(result.pose);
        assert_relative_eq!(pose.transform(1).translation.y, reference[1].translation.y * 0.5);

        // The "upper" mask leaves the root out and takes the rest fully.
        let result = h.eval(0.1, |ev, ctx| ev.update_pose(PoseNodeIdx(7), ctx));
        let pose = h.pose(result.pose);
        assert_eq!(pose.transform(0), Transform::IDENTITY);
        assert_eq!(pose.transform(2), reference[2]);
    }

    #[test]
    fn layer_outside_a_state_overrides_fully() {
        let mut h = Harness::new(vec![
            D::ZeroPose,
            D::ReferencePose,
            D::LayerBlend {
                base_node_idx: 0,
                layers: vec![LayerDefinition {
                    input_node_idx: 1,
                    blend_mode: LayerBlendMode::Blend,
                }],
            },
        ]);
        let reference = h.skeleton().parent_space_reference_pose().to_vec();
        let result = h.eval(0.1, |ev, ctx| ev.update_pose(PoseNodeIdx(2), ctx));
        assert_eq!(h.pose(result.pose).parent_space_transforms(), reference.as_slice());
        h.eval(0.0, |_, ctx| assert!(!ctx.is_in_layer()));
    }
}
