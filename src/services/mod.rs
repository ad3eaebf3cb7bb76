//! Thumbnail maintenance services
//!
//! This module provides the event-processing pipeline:
//! - Classifier for raw storage events
//! - Freshness check against existing artifact metadata
//! - Rendition rendering (decode once, resize per size)
//! - Cloud Storage client and Pub/Sub notifier
//! - Orchestrating service tying it all together

pub mod classifier;
pub mod gcp_auth;
pub mod gcs;
pub mod idempotency;
pub mod notifier;
pub mod processor;
pub mod service;
pub mod storage;

pub use classifier::{classify, Action, IgnoreReason};
pub use gcp_auth::{GcpTokenProvider, ServiceAccountKey};
pub use gcs::GcsStore;
pub use notifier::{ManifestPublisher, PubSubPublisher, ThumbnailNotifier};
pub use processor::SourceImage;
pub use service::{ThumbnailService, ThumbnailServiceConfig};
pub use storage::{ObjectMeta, ObjectStore};
