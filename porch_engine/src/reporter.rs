// Copyright 2026 Porch project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Progress reporting: an optional event sink that composites wrap with
//! their own label before forwarding to their children, so that a UI
//! consuming the event stream sees a fully-qualified command path without
//! every node needing to know its own ancestry.

use std::sync::Arc;

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Started,
    Progress,
    Output,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct Event {
    /// Identifies this event uniquely, independent of its (mutable, growing)
    /// `command_path` — lets a UI correlate a `Started`/`Completed` pair for
    /// the same node even after composites have prepended their labels.
    pub id: Uuid,
    pub command_path: Vec<String>,
    pub event_type: EventType,
    pub message: String,
    pub timestamp: std::time::SystemTime,
    pub data: Option<Vec<u8>>,
}

impl Event {
    pub fn new(command_path: Vec<String>, event_type: EventType, message: impl Into<String>) -> Self {
        Event {
            id: Uuid::new_v4(),
            command_path,
            event_type,
            message: message.into(),
            timestamp: std::time::SystemTime::now(),
            data: None,
        }
    }
}

/// A capability that accepts progress events. A `None` reporter on a node
/// is a no-op: nothing in the engine needs to branch on reporter presence.
pub trait Reporter: Send + Sync {
    fn report(&self, event: Event);
}

pub type SharedReporter = Arc<dyn Reporter>;

/// A reporter that forwards every event to an inner reporter with its own
/// label prepended to the event's command path. Built by a composite when
/// handing a reporter down to a named child.
pub struct ChildReporter {
    inner: SharedReporter,
    label: String,
}

impl ChildReporter {
    pub fn new(inner: SharedReporter, label: impl Into<String>) -> Self {
        ChildReporter {
            inner,
            label: label.into(),
        }
    }
}

impl Reporter for ChildReporter {
    fn report(&self, mut event: Event) {
        event.command_path.insert(0, self.label.clone());
        self.inner.report(event);
    }
}

/// A reporter that forwards events unchanged. Used by `ForEachCommand` so
/// that its own synthesized wrapper batch does not appear twice in the
/// reported hierarchy.
pub struct TransparentReporter {
    inner: SharedReporter,
}

impl TransparentReporter {
    pub fn new(inner: SharedReporter) -> Self {
        TransparentReporter { inner }
    }
}

impl Reporter for TransparentReporter {
    fn report(&self, event: Event) {
        self.inner.report(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct RecordingReporter(Mutex<Vec<Event>>);

    impl Reporter for RecordingReporter {
        fn report(&self, event: Event) {
            self.0.lock().push(event);
        }
    }

    #[test]
    fn child_reporter_prepends_its_label() {
        let recorder = Arc::new(RecordingReporter(Mutex::new(Vec::new())));
        let child = ChildReporter::new(recorder.clone(), "outer");
        child.report(Event::new(vec!["leaf".into()], EventType::Started, "go"));
        let events = recorder.0.lock();
        assert_eq!(events[0].command_path, vec!["outer".to_string(), "leaf".to_string()]);
    }

    #[test]
    fn transparent_reporter_does_not_modify_path() {
        let recorder = Arc::new(RecordingReporter(Mutex::new(Vec::new())));
        let transparent = TransparentReporter::new(recorder.clone());
        transparent.report(Event::new(vec!["leaf".into()], EventType::Started, "go"));
        let events = recorder.0.lock();
        assert_eq!(events[0].command_path, vec!["leaf".to_string()]);
    }
}
