//! Pub/Sub push endpoint.
//!
//! Accepts either a push envelope (`message.data` base64 JSON with the event
//! type in `message.attributes`) or a bare notification body. Malformed
//! payloads are acknowledged and skipped rather than erroring, so a poison
//! message never wedges the subscription. Non-retryable outcomes
//! (undecodable source, vanished source) are also acknowledged, since a
//! redelivery cannot change them.

use crate::error::AppError;
use crate::models::{EventKind, ObjectRecord, StorageEvent};
use crate::services::ThumbnailService;
use actix_web::{web, HttpResponse};
use base64::Engine;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: PushMessage,
}

#[derive(Debug, Deserialize)]
struct PushMessage {
    #[serde(default)]
    attributes: HashMap<String, String>,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
struct DirectNotification {
    #[serde(rename = "eventType")]
    event_type: Option<String>,
    #[serde(flatten)]
    record: ObjectRecord,
}

/// Parse a push request body into a storage event
fn parse_event(body: &[u8]) -> Result<StorageEvent, AppError> {
    if let Ok(envelope) = serde_json::from_slice::<PushEnvelope>(body) {
        let kind = envelope
            .message
            .attributes
            .get("eventType")
            .map(|t| EventKind::parse(t))
            .unwrap_or(EventKind::Other);
        if kind == EventKind::Other {
            return Ok(StorageEvent::Other);
        }
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(envelope.message.data.as_bytes())
            .map_err(|e| AppError::Internal(format!("Invalid base64 message data: {e}")))?;
        let record: ObjectRecord = serde_json::from_slice(&decoded)
            .map_err(|e| AppError::Internal(format!("Invalid notification payload: {e}")))?;
        return Ok(StorageEvent::new(kind, record));
    }

    let direct: DirectNotification = serde_json::from_slice(body)
        .map_err(|e| AppError::Internal(format!("Unrecognized event body: {e}")))?;
    let kind = direct
        .event_type
        .as_deref()
        .map(EventKind::parse)
        .unwrap_or(EventKind::Other);
    Ok(StorageEvent::new(kind, direct.record))
}

/// POST /events - process one storage notification
pub async fn receive_event(
    service: web::Data<Arc<ThumbnailService>>,
    body: web::Bytes,
) -> actix_web::Result<HttpResponse> {
    let event = match parse_event(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Failed to parse push message, acknowledging and skipping");
            return Ok(HttpResponse::Ok().json(serde_json::json!({ "skipped": e.to_string() })));
        }
    };

    match service.handle_event(&event).await {
        Ok(manifest) => Ok(HttpResponse::Ok().json(manifest.to_json())),
        Err(e @ (AppError::UnsupportedImage(_) | AppError::NotFound(_))) => {
            // Terminal for this event; a retry cannot change the outcome
            info!(error = %e, "Dropping non-retryable event");
            Ok(HttpResponse::Ok().json(serde_json::json!({ "dropped": e.to_string() })))
        }
        Err(e) => Err(e.into()),
    }
}
