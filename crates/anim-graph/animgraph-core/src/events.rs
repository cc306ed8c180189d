//! Events sampled during a single update.
//!
//! States emit graph events (entry, fully-in-state, exit) and clips emit the transition markers
//! authored on their animation source. Both land in one [`SampledEventsBuffer`], cleared at the
//! start of every update.

use serde::{Deserialize, Serialize};

use crate::definition::TransitionRule;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphEventType {
    Entry,
    FullyInState,
    Exit,
}

/// A transition permission window on a clip, in normalised clip time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionMarker {
    pub start: f32,
    pub end: f32,
    pub rule: TransitionRule,
    #[serde(default)]
    pub id: Option<String>,
}

impl TransitionMarker {
    #[inline]
    pub fn overlaps(&self, from: f32, to: f32) -> bool {
        self.start <= to && self.end >= from
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SampledEventData {
    Graph {
        event_type: GraphEventType,
        id: String,
    },
    Transition {
        rule: TransitionRule,
        id: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampledEvent {
    /// Index of the node that emitted the event.
    pub source_node: usize,
    pub is_from_active_branch: bool,
    pub data: SampledEventData,
}

impl SampledEvent {
    pub fn is_graph_event(&self) -> bool {
        matches!(self.data, SampledEventData::Graph { .. })
    }

    pub fn graph_event(&self) -> Option<(GraphEventType, &str)> {
        match &self.data {
            SampledEventData::Graph { event_type, id } => Some((*event_type, id.as_str())),
            SampledEventData::Transition { .. } => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SampledEventsBuffer {
    events: Vec<SampledEvent>,
    capacity: usize,
    dropped: usize,
}

impl SampledEventsBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity.min(1024)),
            capacity,
            dropped: 0,
        }
    }

    pub fn clear(&mut self) {
        if self.dropped > 0 {
            log::warn!(
                "sampled events buffer overflowed: dropped {} event(s) (capacity {})",
                self.dropped,
                self.capacity
            );
        }
        self.events.clear();
        self.dropped = 0;
    }

    /// Append an event; returns false when the buffer is full and the event was dropped.
    pub fn push(&mut self, event: SampledEvent) -> bool {
        if self.events.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        self.events.push(event);
        true
    }

    pub(crate) fn push_graph_event(
        &mut self,
        source_node: usize,
        is_from_active_branch: bool,
        event_type: GraphEventType,
        id: &str,
    ) {
        self.push(SampledEvent {
            source_node,
            is_from_active_branch,
            data: SampledEventData::Graph {
                event_type,
                id: id.to_string(),
            },
        });
    }

    pub fn events(&self) -> &[SampledEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events dropped so far this update.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_events_past_capacity() {
        let mut buffer = SampledEventsBuffer::new(2);
        for i in 0..3 {
            buffer.push_graph_event(i, true, GraphEventType::Entry, "enter");
        }
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.dropped(), 1);

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.dropped(), 0);
    }

    #[test]
    fn marker_overlap_is_inclusive() {
        let marker = TransitionMarker {
            start: 0.5,
            end: 0.75,
            rule: TransitionRule::AllowTransition,
            id: None,
        };
        assert!(marker.overlaps(0.4, 0.5));
        assert!(marker.overlaps(0.75, 0.9));
        assert!(!marker.overlaps(0.0, 0.49));
    }
}
