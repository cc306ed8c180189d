//! Typed indices into the node table.
//!
//! A handle is only ever produced by [`GraphBuildContext`](super::GraphBuildContext) after the
//! referenced node was checked to be of the right kind, so evaluation can index without
//! re-validating.

use serde::{Deserialize, Serialize};

use crate::definition::{NodeCategory, NodeDefinition};

pub trait NodeHandle: Copy {
    /// Name used in kind-mismatch errors.
    const KIND: &'static str;

    fn accepts(definition: &NodeDefinition) -> bool;

    #[doc(hidden)]
    fn from_index(index: usize) -> Self;

    fn index(self) -> usize;
}

macro_rules! node_handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal, |$def:ident| $accepts:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub(crate) u16);

        impl NodeHandle for $name {
            const KIND: &'static str = $kind;

            #[inline]
            fn accepts($def: &NodeDefinition) -> bool {
                $accepts
            }

            #[inline]
            fn from_index(index: usize) -> Self {
                Self(index as u16)
            }

            #[inline]
            fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

node_handle!(BoolNodeIdx, "bool", |d| d.category() == NodeCategory::Bool);
node_handle!(FloatNodeIdx, "float", |d| d.category() == NodeCategory::Float);
node_handle!(IdNodeIdx, "id", |d| d.category() == NodeCategory::Id);
node_handle!(BoneMaskNodeIdx, "bone mask", |d| d.category()
    == NodeCategory::BoneMask);
node_handle!(
    /// Any pose-producing node; also names the buffer holding a node's output.
    PoseNodeIdx,
    "pose",
    |d| d.category() == NodeCategory::Pose
);
node_handle!(StateNodeIdx, "state", |d| matches!(
    d,
    NodeDefinition::State { .. }
));
node_handle!(TransitionNodeIdx, "transition", |d| matches!(
    d,
    NodeDefinition::Transition { .. }
));
node_handle!(
    /// Clip players and the selectors choosing between them.
    ClipReferenceNodeIdx,
    "clip reference",
    |d| d.is_clip_reference()
);

macro_rules! into_pose_handle {
    ($($name:ident),*) => {
        $(
            impl From<$name> for PoseNodeIdx {
                #[inline]
                fn from(idx: $name) -> Self {
                    PoseNodeIdx(idx.0)
                }
            }
        )*
    };
}

into_pose_handle!(StateNodeIdx, TransitionNodeIdx, ClipReferenceNodeIdx);
