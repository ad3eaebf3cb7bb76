//! Thumbnail maintenance for Cloud Storage buckets.
//!
//! Reacts to object lifecycle notifications (finalize/delete) and keeps a set
//! of derived thumbnail renditions per monitored image object:
//! - classification of incoming storage events
//! - deterministic thumbnail path derivation
//! - per-size freshness checks against existing artifact metadata
//! - best-effort deletion sweeps and Pub/Sub result notification
//!
//! Delivery from the hosting notification system is at-least-once and may be
//! duplicated or reordered; the service converges without any external
//! coordination.

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod paths;
pub mod services;

// Public re-exports
pub use config::Config;
pub use error::{AppError, Result};
