//! Reusable buffers for a single update.

use std::sync::Arc;

use crate::pose::{Pose, PoseType};
use crate::skeleton::Skeleton;

#[derive(Debug)]
pub(crate) struct Scratch {
    /// Spare pose swapped in as a blend destination while two node buffers are read.
    pub pose: Pose,
    pub transition_markers: Vec<crate::events::TransitionMarker>,
}

impl Scratch {
    pub fn new(skeleton: &Arc<Skeleton>) -> Self {
        Self {
            pose: Pose::new(Arc::clone(skeleton), PoseType::ReferencePose),
            transition_markers: Vec::new(),
        }
    }

    #[inline]
    pub fn begin_frame(&mut self) {
        self.transition_markers.clear();
    }
}
