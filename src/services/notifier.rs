//! Manifest notification over Pub/Sub.
//!
//! Each distinct source object gets its own topic, derived deterministically
//! from the source path, so subscribers can filter by source and fan-out
//! stays bounded. Notification is strictly best-effort: the thumbnail
//! pipeline never fails because a topic could not be provisioned or a publish
//! was not acknowledged, and the wait for acknowledgment has a hard upper
//! bound independent of network conditions.

use super::gcp_auth::GcpTokenProvider;
use crate::error::{AppError, Result};
use crate::models::GenerationManifest;
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fixed prefix of every per-source topic id
pub const TOPIC_PREFIX: &str = "thumbgen-";

const ACK_POLLS: u32 = 5;
const ACK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Characters valid in a Pub/Sub topic id without encoding
const TOPIC_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Deterministic topic id for a source object path
pub fn topic_id(source_path: &str) -> String {
    format!(
        "{}{}",
        TOPIC_PREFIX,
        utf8_percent_encode(source_path, TOPIC_SET)
    )
}

/// Publish capability, injectable so tests can observe calls without a
/// network client
#[async_trait]
pub trait ManifestPublisher: Send + Sync {
    /// Create the topic if it does not exist; an already-existing topic is
    /// success
    async fn ensure_topic(&self, topic_id: &str) -> Result<()>;

    async fn publish(&self, topic_id: &str, payload: serde_json::Value) -> Result<()>;
}

/// Pub/Sub REST publisher
pub struct PubSubPublisher {
    token: Arc<GcpTokenProvider>,
    http_client: reqwest::Client,
    host: String,
}

impl PubSubPublisher {
    pub fn new(token: Arc<GcpTokenProvider>, http_client: reqwest::Client) -> Self {
        Self {
            token,
            http_client,
            host: "pubsub.googleapis.com".to_string(),
        }
    }

    fn topic_url(&self, topic_id: &str) -> String {
        format!(
            "https://{}/v1/projects/{}/topics/{}",
            self.host,
            self.token.project_id(),
            topic_id
        )
    }
}

#[async_trait]
impl ManifestPublisher for PubSubPublisher {
    async fn ensure_topic(&self, topic_id: &str) -> Result<()> {
        let token = self.token.access_token().await?;
        let response = self
            .http_client
            .put(self.topic_url(topic_id))
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| AppError::Publish(format!("Topic create failed: {e}")))?;

        // ALREADY_EXISTS from a racing invocation is not an error
        if response.status().is_success() || response.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        Err(AppError::Publish(format!(
            "Topic create failed with status {}",
            response.status()
        )))
    }

    async fn publish(&self, topic_id: &str, payload: serde_json::Value) -> Result<()> {
        use base64::Engine;

        let token = self.token.access_token().await?;
        let data =
            base64::engine::general_purpose::STANDARD.encode(serde_json::to_vec(&payload)?);
        let body = serde_json::json!({ "messages": [{ "data": data }] });

        let response = self
            .http_client
            .post(format!("{}:publish", self.topic_url(topic_id)))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Publish(format!("Publish failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Publish(format!(
                "Publish failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Notifies subscribers of a completed generation, waiting a bounded number
/// of short polls for the publish to finish before detaching
pub struct ThumbnailNotifier {
    publisher: Arc<dyn ManifestPublisher>,
}

impl ThumbnailNotifier {
    pub fn new(publisher: Arc<dyn ManifestPublisher>) -> Self {
        Self { publisher }
    }

    /// Publish the manifest for one source object. Never fails the caller:
    /// provisioning and publish problems are logged and swallowed.
    pub async fn notify(&self, source_path: &str, manifest: &GenerationManifest) {
        if manifest.is_empty() {
            return;
        }

        let topic = topic_id(source_path);
        if let Err(e) = self.publisher.ensure_topic(&topic).await {
            warn!(topic = %topic, error = %e, "Failed to provision topic, skipping notification");
            return;
        }

        let payload = manifest.to_json();
        let publisher = self.publisher.clone();
        let publish_topic = topic.clone();
        let handle =
            tokio::spawn(async move { publisher.publish(&publish_topic, payload).await });

        // Bounded, non-blocking wait for acknowledgment; the publish keeps
        // running detached if it outlives the budget.
        for _ in 0..ACK_POLLS {
            if handle.is_finished() {
                break;
            }
            tokio::time::sleep(ACK_POLL_INTERVAL).await;
        }

        if handle.is_finished() {
            match handle.await {
                Ok(Ok(())) => debug!(topic = %topic, "Manifest published"),
                Ok(Err(e)) => warn!(topic = %topic, error = %e, "Manifest publish failed"),
                Err(e) => warn!(topic = %topic, error = %e, "Publish task panicked"),
            }
        } else {
            debug!(topic = %topic, "Publish not acknowledged within wait budget, detaching");
        }
    }
}
