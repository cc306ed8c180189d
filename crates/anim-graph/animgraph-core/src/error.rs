//! Error types surfaced while building or driving an animation graph.

use serde::{Deserialize, Serialize};

/// Errors produced by graph construction, skeleton validation and parameter access.
///
/// Authoring mistakes (bad indices, wrong node categories, malformed tables) are reported when a
/// [`Graph`](crate::Graph) is built; nothing is validated lazily during `update`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum GraphError {
    #[error("node {node}: child index {index} is outside the node table (len {len})")]
    NodeIndexOutOfRange { node: usize, index: i16, len: usize },

    #[error("node {node}: child {index} is a {found} node, expected {expected}")]
    NodeKindMismatch {
        node: usize,
        index: usize,
        expected: String,
        found: String,
    },

    #[error("node {node}: required child `{field}` is missing")]
    MissingRequiredChild { node: usize, field: String },

    #[error("node {node}: no control parameter name at index {node} (graph declares {len})")]
    ControlParameterOutOfRange { node: usize, len: usize },

    #[error("node {node}: virtual parameter index {index} out of range (graph declares {len})")]
    VirtualParameterOutOfRange { node: usize, index: i16, len: usize },

    #[error("node {node}: invalid option weights: {reason}")]
    InvalidOptionWeights { node: usize, reason: String },

    #[error("node {node}: invalid curve: {reason}")]
    InvalidCurve { node: usize, reason: String },

    #[error("node {node}: `{first}` has {first_len} entries but `{second}` has {second_len}")]
    MismatchedOptionTables {
        node: usize,
        first: String,
        first_len: usize,
        second: String,
        second_len: usize,
    },

    #[error("node {node}: data slot {slot} is not bound (data set has {len} sources)")]
    InvalidDataSlot { node: usize, slot: i16, len: usize },

    #[error("node {node}: state index {index} out of range ({len} states)")]
    InvalidStateIndex { node: usize, index: i16, len: usize },

    #[error("root node index {index} does not reference a pose node")]
    InvalidRootNode { index: i16 },

    #[error("invalid skeleton: {0}")]
    InvalidSkeleton(String),

    #[error("invalid clip `{name}`: {reason}")]
    InvalidClip { name: String, reason: String },

    #[error("parameter not found: {name}")]
    UnknownParameter { name: String },

    #[error("parameter `{name}` is a {found} parameter, not {expected}")]
    ParameterKindMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("graph definition parse error: {0}")]
    Definition(String),
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::Definition(err.to_string())
    }
}

pub type GraphResult<T> = Result<T, GraphError>;
