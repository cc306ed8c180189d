use crate::context::GraphContext;
use crate::definition::CachedValueMode;

use super::handle::{IdNodeIdx, NodeHandle};
use super::{Evaluator, NodeSettings};

#[derive(Debug)]
pub(crate) enum IdNode {
    Const(String),
    ControlParameter(usize),
    VirtualParameter(IdNodeIdx),
    Cached {
        input: IdNodeIdx,
        mode: CachedValueMode,
    },
}

impl<'g> Evaluator<'g> {
    pub(crate) fn id_value(&mut self, idx: IdNodeIdx, ctx: &mut GraphContext<'_>) -> String {
        let NodeSettings::Id(node) = self.node(idx.index()) else {
            unreachable!("node {} is not an id node", idx.index());
        };
        match node {
            IdNode::Const(value) => value.clone(),
            IdNode::ControlParameter(param) => ctx.parameters.id_at(*param).to_string(),
            IdNode::VirtualParameter(inner) => self.id_value(*inner, ctx),
            IdNode::Cached { input, mode } => {
                let input = *input;
                self.cached_value(idx.index(), *mode, ctx, |ev, ctx| ev.id_value(input, ctx))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BranchState;
    use crate::definition::NodeDefinition as D;
    use crate::test_support::Harness;

    #[test]
    fn parameter_and_cached_ids() {
        let mut h = Harness::with_parameters(
            vec![
                D::ControlParameterId,
                D::CachedId {
                    input_value_node_idx: 0,
                    mode: CachedValueMode::OnExit,
                },
            ],
            &["stance"],
        );
        h.parameters.set_id("stance", "crouch").unwrap();
        assert_eq!(h.eval(0.0, |ev, ctx| ev.id_value(IdNodeIdx(0), ctx)), "crouch");
        assert_eq!(h.eval(0.0, |ev, ctx| ev.id_value(IdNodeIdx(1), ctx)), "crouch");

        h.parameters.set_id("stance", "stand").unwrap();
        let frozen = h.eval(0.0, |ev, ctx| {
            ctx.with_branch_state(BranchState::Inactive, |ctx| ev.id_value(IdNodeIdx(1), ctx))
        });
        assert_eq!(frozen, "crouch");
    }
}
