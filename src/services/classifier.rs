//! Event classification - decides what a storage notification requires.
//!
//! The decision order is load-bearing: the already-a-thumbnail check runs
//! before the delete branch and before the content-type test, so deleting a
//! thumbnail never recursively triggers deletion logic against a path that is
//! not a real source.

use crate::models::StorageEvent;
use crate::paths;
use std::fmt;

/// Why an event was ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Neither a finalize nor a delete notification
    UnsupportedEvent,
    /// Path outside the monitored set
    NotMonitored,
    /// Path already inside the thumbnail subfolder
    AlreadyThumbnail,
    /// Content type is not `image/*`
    NotImage,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            IgnoreReason::UnsupportedEvent => "unsupported-event",
            IgnoreReason::NotMonitored => "not-monitored",
            IgnoreReason::AlreadyThumbnail => "already-a-thumbnail",
            IgnoreReason::NotImage => "not-an-image",
        };
        f.write_str(reason)
    }
}

/// Action required for an incoming event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Ignore(IgnoreReason),
    Delete,
    Generate,
}

/// Classify a storage event against the monitored path set. First match wins.
pub fn classify(event: &StorageEvent, monitored: &[String]) -> Action {
    let record = match event.record() {
        Some(record) => record,
        None => return Action::Ignore(IgnoreReason::UnsupportedEvent),
    };
    if !paths::is_monitored(&record.name, monitored) {
        return Action::Ignore(IgnoreReason::NotMonitored);
    }
    if paths::is_thumbnail(&record.name) {
        return Action::Ignore(IgnoreReason::AlreadyThumbnail);
    }
    if matches!(event, StorageEvent::Delete(_)) {
        return Action::Delete;
    }
    if !record.content_type.starts_with("image/") {
        return Action::Ignore(IgnoreReason::NotImage);
    }
    Action::Generate
}
