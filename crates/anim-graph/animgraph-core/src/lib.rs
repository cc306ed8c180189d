//! Animation graph runtime (engine-agnostic)
//!
//! A graph is a flat table of nodes built from a serde [`GraphDefinition`]:
//! - value nodes (bool, float, id, bone mask) computed on demand from control parameters;
//! - pose nodes (clips, selectors, layer blends, states, transitions, state machines) that write
//!   into per-node pose buffers once per update.
//!
//! [`Graph`] is immutable and shared through `Arc`; each [`GraphInstance`] owns the node state,
//! the parameter values and the output [`Pose`] for one character.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use animgraph_core::*;
//! # fn run(skeleton: Arc<Skeleton>, walk: Arc<KeyframeClip>, json: &str) -> GraphResult<()> {
//! let graph = Graph::from_json(json, GraphDataSet::new(skeleton).with_animation(walk))?;
//! let mut instance = GraphInstance::new(graph, GraphConfig::default())?;
//! instance.set_float("speed", 1.5)?;
//! instance.update(1.0 / 60.0);
//! let pose = instance.output_pose();
//! # let _ = pose;
//! # Ok(())
//! # }
//! ```

pub mod animation;
pub mod bone_mask;
pub mod config;
pub mod context;
pub mod definition;
pub mod error;
pub mod events;
pub mod graph;
pub mod instance;
pub mod math;
pub mod nodes;
pub mod parameters;
pub mod pose;
pub mod skeleton;

mod scratch;

#[cfg(test)]
pub(crate) mod test_support;

pub use animation::{AnimationSource, KeyframeClip, KeyframeClipData};
pub use bone_mask::BoneMask;
pub use config::GraphConfig;
pub use context::{BranchState, LayerContext};
pub use definition::{GraphDefinition, NodeDefinition};
pub use error::{GraphError, GraphResult};
pub use events::{GraphEventType, SampledEvent, SampledEventData, TransitionMarker};
pub use graph::{Graph, GraphDataSet};
pub use instance::GraphInstance;
pub use math::{CurveInterpolation, CurveKey, EasingOperation, FloatCurve, FloatRange, Transform};
pub use nodes::{GraphPoseNodeResult, PoseNodeIdx, PoseTiming, TransitionPhase, TransitionSource};
pub use parameters::{ParameterKind, ParameterStore, ParameterValue};
pub use pose::{Pose, PoseType};
pub use skeleton::{Skeleton, SkeletonDefinition};
