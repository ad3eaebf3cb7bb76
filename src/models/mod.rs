/// Data models for the thumbnail service
///
/// This module defines structures for:
/// - StorageEvent: a classified object lifecycle notification
/// - ImageSize: a target thumbnail dimension pair
/// - Thumbnail: one rendered rendition, held only for the duration of its upload
/// - GenerationManifest: ordered record of artifacts produced in one invocation
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;

// ========================================
// Storage events
// ========================================

/// Kind of object lifecycle notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Finalize,
    Delete,
    Other,
}

impl EventKind {
    /// Parse the event-type string of a notification.
    ///
    /// Accepts both the background-function names and the Pub/Sub
    /// notification attribute names; anything else maps to `Other`.
    pub fn parse(event_type: &str) -> Self {
        match event_type {
            "google.storage.object.finalize" | "OBJECT_FINALIZE" => EventKind::Finalize,
            "google.storage.object.delete" | "OBJECT_DELETE" => EventKind::Delete,
            _ => EventKind::Other,
        }
    }
}

/// Object record carried by a storage notification
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    pub bucket: String,
    /// Posix-style object path, slash-separated; may lack a file extension
    pub name: String,
    #[serde(default)]
    pub content_type: String,
    pub updated: Option<DateTime<Utc>>,
    pub time_created: DateTime<Utc>,
}

impl ObjectRecord {
    /// Last modification time, falling back to creation time when absent
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated.unwrap_or(self.time_created)
    }
}

/// One object lifecycle notification, immutable for the invocation
#[derive(Debug, Clone)]
pub enum StorageEvent {
    Finalize(ObjectRecord),
    Delete(ObjectRecord),
    Other,
}

impl StorageEvent {
    pub fn new(kind: EventKind, record: ObjectRecord) -> Self {
        match kind {
            EventKind::Finalize => StorageEvent::Finalize(record),
            EventKind::Delete => StorageEvent::Delete(record),
            EventKind::Other => StorageEvent::Other,
        }
    }

    pub fn record(&self) -> Option<&ObjectRecord> {
        match self {
            StorageEvent::Finalize(record) | StorageEvent::Delete(record) => Some(record),
            StorageEvent::Other => None,
        }
    }
}

// ========================================
// Sizes and renditions
// ========================================

/// Target thumbnail dimensions; canonical form is `"{width}x{height}"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parse a `WxH` token; malformed tokens yield `None` rather than an error
    pub fn parse(spec: &str) -> Option<Self> {
        let (w, h) = spec.split_once('x')?;
        Some(Self {
            width: w.trim().parse().ok()?,
            height: h.trim().parse().ok()?,
        })
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One rendered rendition, produced per (source, size) pair
#[derive(Debug)]
pub struct Thumbnail {
    pub content: Bytes,
    pub path: String,
    pub size: ImageSize,
    pub mime_type: String,
}

// ========================================
// Generation manifest
// ========================================

/// Ordered mapping of size -> produced artifact path for one invocation.
///
/// Entries are recorded only after a confirmed successful upload, in
/// configured size order, and that insertion order is preserved in the
/// serialized form.
#[derive(Debug, Default)]
pub struct GenerationManifest {
    entries: Vec<(ImageSize, String)>,
}

impl GenerationManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, size: ImageSize, path: String) {
        self.entries.push((size, path));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, size: ImageSize) -> Option<&str> {
        self.entries
            .iter()
            .find(|(s, _)| *s == size)
            .map(|(_, path)| path.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (ImageSize, &str)> {
        self.entries.iter().map(|(size, path)| (*size, path.as_str()))
    }

    /// Serialize as a flat `{"WxH": "path"}` object, preserving entry order
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (size, path) in &self.entries {
            map.insert(size.to_string(), serde_json::Value::String(path.clone()));
        }
        serde_json::Value::Object(map)
    }
}
