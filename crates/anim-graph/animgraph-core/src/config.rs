//! Per-instance configuration.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Instance options. Parameter overrides are applied once, when the instance is created.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Compute model-space transforms for the output pose after each update.
    pub calculate_model_space_pose: bool,
    /// Restrict the eager model-space pass to the first N bones. `None` means all bones.
    pub num_relevant_bones: Option<usize>,
    /// Events retained per tick; further events are dropped.
    pub max_sampled_events: usize,

    pub initial_bool_parameters: HashMap<String, bool>,
    pub initial_float_parameters: HashMap<String, f32>,
    pub initial_id_parameters: HashMap<String, String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            calculate_model_space_pose: false,
            num_relevant_bones: None,
            max_sampled_events: 256,
            initial_bool_parameters: HashMap::new(),
            initial_float_parameters: HashMap::new(),
            initial_id_parameters: HashMap::new(),
        }
    }
}
