//! Immutable, shareable graph built from a [`GraphDefinition`].

use std::sync::Arc;

use crate::animation::AnimationSource;
use crate::definition::{GraphDefinition, NodeDefinition};
use crate::error::{GraphError, GraphResult};
use crate::nodes::{GraphBuildContext, NodeSettings, PoseNodeIdx};
use crate::parameters::ParameterDecl;
use crate::skeleton::Skeleton;

/// Skeleton plus the animation sources bound to a graph's data slots.
#[derive(Clone, Debug)]
pub struct GraphDataSet {
    pub skeleton: Arc<Skeleton>,
    pub animations: Vec<Arc<dyn AnimationSource>>,
}

impl GraphDataSet {
    pub fn new(skeleton: Arc<Skeleton>) -> Self {
        Self {
            skeleton,
            animations: Vec::new(),
        }
    }

    pub fn with_animation(mut self, source: Arc<dyn AnimationSource>) -> Self {
        self.animations.push(source);
        self
    }
}

/// Resolved node settings, shared by every [`GraphInstance`](crate::GraphInstance) of a graph.
#[derive(Debug)]
pub struct Graph {
    id: String,
    pub(crate) nodes: Vec<NodeSettings>,
    pub(crate) root: PoseNodeIdx,
    /// Every node owned by the root, children first.
    pub(crate) root_subgraph: Vec<usize>,
    parameters: Vec<ParameterDecl>,
    pub(crate) data_set: GraphDataSet,
}

impl Graph {
    /// Validate and resolve `definition` against `data_set`.
    pub fn new(definition: &GraphDefinition, data_set: GraphDataSet) -> GraphResult<Arc<Self>> {
        let root_idx = definition.root_node_idx;
        let root_is_pose = usize::try_from(root_idx)
            .ok()
            .and_then(|idx| definition.nodes.get(idx))
            .is_some_and(|node| {
                node.category() == crate::definition::NodeCategory::Pose
                    && !matches!(node, NodeDefinition::Transition { .. })
            });
        if !root_is_pose {
            return Err(GraphError::InvalidRootNode { index: root_idx });
        }

        let build = GraphBuildContext::new(definition, &data_set);
        let root_subgraph = build.owned_subgraph(&[root_idx]);
        let (nodes, parameters) = build.build_all()?;

        Ok(Arc::new(Self {
            id: definition.id.clone(),
            nodes,
            root: PoseNodeIdx(root_idx as u16),
            root_subgraph,
            parameters: parameters.layout().to_vec(),
            data_set,
        }))
    }

    pub fn from_json(json: &str, data_set: GraphDataSet) -> GraphResult<Arc<Self>> {
        let definition = GraphDefinition::from_json(json)?;
        Self::new(&definition, data_set)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn root(&self) -> PoseNodeIdx {
        self.root
    }

    pub fn parameters(&self) -> &[ParameterDecl] {
        &self.parameters
    }

    pub fn skeleton(&self) -> &Arc<Skeleton> {
        &self.data_set.skeleton
    }

    pub fn data_set(&self) -> &GraphDataSet {
        &self.data_set
    }

    #[inline]
    pub(crate) fn animation(&self, slot: usize) -> &dyn AnimationSource {
        self.data_set.animations[slot].as_ref()
    }
}
