//! Per-size freshness check.
//!
//! Decides whether a candidate thumbnail actually needs regenerating by
//! comparing the source's modification time against the existing artifact's
//! recorded time. This is a best-effort reduction of duplicate work under
//! at-least-once delivery, not a distributed lock: two invocations racing in
//! the same window may both regenerate, which is acceptable because the
//! derived content is deterministic for a given source.

use super::storage::ObjectMeta;
use chrono::{DateTime, Utc};

/// True when the artifact is absent or strictly older than the source. An
/// existing artifact at least as new as the source is assumed to already
/// reflect it, the common case being a duplicate invocation that finished
/// first.
pub fn needs_regeneration(source_updated: DateTime<Utc>, artifact: Option<&ObjectMeta>) -> bool {
    match artifact {
        None => true,
        Some(meta) => source_updated > meta.updated,
    }
}
