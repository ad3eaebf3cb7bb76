//! Object store capability.
//!
//! The orchestrator and sweeper are written against this trait so tests can
//! inject an in-memory store instead of a real network client.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Metadata of a stored artifact
#[derive(Debug, Clone, Copy)]
pub struct ObjectMeta {
    /// Last modification time; implementations fall back to the creation
    /// time when the store reports no modification time
    pub updated: DateTime<Utc>,
}

/// Blob operations against a bucket-style object store.
///
/// `download` and `delete` surface a missing object as
/// [`AppError::NotFound`](crate::error::AppError::NotFound) so callers can
/// distinguish a vanished source or an already-swept artifact from a real
/// failure. `metadata` reports absence as `Ok(None)` instead, since absence
/// is an expected answer for the freshness check.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, bucket: &str, path: &str) -> Result<Bytes>;

    async fn upload(&self, bucket: &str, path: &str, content: Bytes, content_type: &str)
        -> Result<()>;

    async fn metadata(&self, bucket: &str, path: &str) -> Result<Option<ObjectMeta>>;

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    async fn delete(&self, bucket: &str, path: &str) -> Result<()>;
}
