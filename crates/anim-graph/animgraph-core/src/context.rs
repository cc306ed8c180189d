//! Per-update evaluation context shared by every node.

use std::sync::Arc;

use crate::bone_mask::BoneMask;
use crate::events::SampledEventsBuffer;
use crate::math::lerp_f32;
use crate::parameters::ParameterStore;
use crate::skeleton::Skeleton;

/// Whether the nodes being updated contribute to the final output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BranchState {
    #[default]
    Active,
    /// A transition source being blended out.
    Inactive,
}

/// Weights accumulated by states nested under a layer.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerContext {
    pub weight: f32,
    pub root_motion_weight: f32,
    pub bone_mask: Option<BoneMask>,
}

impl Default for LayerContext {
    fn default() -> Self {
        Self {
            weight: 1.0,
            root_motion_weight: 1.0,
            bone_mask: None,
        }
    }
}

impl LayerContext {
    /// Blend two layer contexts. Missing masks count as full weight.
    pub fn blend(source: &LayerContext, target: &LayerContext, t: f32, num_bones: usize) -> Self {
        let bone_mask = match (&source.bone_mask, &target.bone_mask) {
            (None, None) => None,
            (a, b) => {
                let full = BoneMask::uniform(num_bones, 1.0);
                let a = a.as_ref().unwrap_or(&full);
                let b = b.as_ref().unwrap_or(&full);
                Some(BoneMask::blend(a, b, t))
            }
        };
        Self {
            weight: lerp_f32(source.weight, target.weight, t),
            root_motion_weight: lerp_f32(source.root_motion_weight, target.root_motion_weight, t),
            bone_mask,
        }
    }
}

pub struct GraphContext<'a> {
    pub delta_time: f32,
    pub branch_state: BranchState,
    /// Set while updating a layer's input.
    pub layer_context: Option<LayerContext>,
    pub parameters: &'a ParameterStore,
    pub skeleton: &'a Arc<Skeleton>,
    pub events: &'a mut SampledEventsBuffer,
}

impl<'a> GraphContext<'a> {
    pub fn new(
        delta_time: f32,
        parameters: &'a ParameterStore,
        skeleton: &'a Arc<Skeleton>,
        events: &'a mut SampledEventsBuffer,
    ) -> Self {
        Self {
            delta_time,
            branch_state: BranchState::Active,
            layer_context: None,
            parameters,
            skeleton,
            events,
        }
    }

    #[inline]
    pub fn is_active_branch(&self) -> bool {
        self.branch_state == BranchState::Active
    }

    #[inline]
    pub fn is_in_layer(&self) -> bool {
        self.layer_context.is_some()
    }

    /// Run `f` with the branch flag set to `state`, restoring the previous flag afterwards.
    pub fn with_branch_state<R>(
        &mut self,
        state: BranchState,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let saved = std::mem::replace(&mut self.branch_state, state);
        let out = f(self);
        self.branch_state = saved;
        out
    }

    /// Run `f` under `layer`, returning its result together with the layer context as `f` left
    /// it. The previous layer context is restored.
    pub fn with_layer_context<R>(
        &mut self,
        layer: Option<LayerContext>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> (R, Option<LayerContext>) {
        let saved = std::mem::replace(&mut self.layer_context, layer);
        let out = f(self);
        let produced = std::mem::replace(&mut self.layer_context, saved);
        (out, produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Transform;

    fn skeleton() -> Arc<Skeleton> {
        Arc::new(Skeleton::new(vec!["root".into()], vec![None], vec![Transform::IDENTITY]).unwrap())
    }

    #[test]
    fn branch_state_is_restored() {
        let params = ParameterStore::new();
        let skel = skeleton();
        let mut events = SampledEventsBuffer::new(8);
        let mut ctx = GraphContext::new(0.1, &params, &skel, &mut events);

        let inner = ctx.with_branch_state(BranchState::Inactive, |ctx| {
            ctx.with_branch_state(BranchState::Active, |ctx| ctx.is_active_branch())
                && !ctx.is_active_branch()
        });
        assert!(inner);
        assert!(ctx.is_active_branch());
    }

    #[test]
    fn layer_context_is_restored_and_reported() {
        let params = ParameterStore::new();
        let skel = skeleton();
        let mut events = SampledEventsBuffer::new(8);
        let mut ctx = GraphContext::new(0.1, &params, &skel, &mut events);

        let ((), produced) = ctx.with_layer_context(Some(LayerContext::default()), |ctx| {
            if let Some(layer) = ctx.layer_context.as_mut() {
                layer.weight = 0.25;
            }
        });
        assert_eq!(produced.map(|l| l.weight), Some(0.25));
        assert!(!ctx.is_in_layer());
    }

    #[test]
    fn blending_layer_contexts() {
        let a = LayerContext {
            weight: 0.0,
            root_motion_weight: 1.0,
            bone_mask: Some(BoneMask::from_weights(vec![0.0, 0.0])),
        };
        let b = LayerContext::default();
        let mid = LayerContext::blend(&a, &b, 0.5, 2);
        assert_eq!(mid.weight, 0.5);
        assert_eq!(mid.root_motion_weight, 1.0);
        assert_eq!(mid.bone_mask.unwrap().weights(), &[0.5, 0.5]);
    }
}
