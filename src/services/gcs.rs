//! Cloud Storage client implementing the [`ObjectStore`] capability.
//!
//! Downloads and uploads go through V4 signed URLs built from the service
//! account key. Metadata, listing and deletion use the storage JSON API with
//! an OAuth2 bearer token from [`GcpTokenProvider`].

use super::gcp_auth::{GcpTokenProvider, ServiceAccountKey};
use super::storage::{ObjectMeta, ObjectStore};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::StatusCode;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Characters that must be percent-encoded in a signed-URL path component
const PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Characters that must be percent-encoded in a JSON-API object name, where
/// the whole name is a single path segment (slashes included)
const OBJECT_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const SIGNED_URL_TTL: Duration = Duration::from_secs(300);

/// Object resource subset returned by the JSON API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    updated: Option<DateTime<Utc>>,
    time_created: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListedObject>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
}

/// Cloud Storage client for signed-URL transfers and JSON-API object
/// management
pub struct GcsStore {
    client_email: String,
    private_key: RsaPrivateKey,
    host: String,
    token: Arc<GcpTokenProvider>,
    http_client: reqwest::Client,
}

impl GcsStore {
    pub fn new(
        credentials: &ServiceAccountKey,
        host: &str,
        token: Arc<GcpTokenProvider>,
        http_client: reqwest::Client,
    ) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(&credentials.private_key).map_err(|e| {
            AppError::Config(format!("Failed to parse service account private key: {e}"))
        })?;

        info!(host = %host, "Storage client initialized");

        Ok(Self {
            client_email: credentials.client_email.clone(),
            private_key,
            host: host.to_string(),
            token,
            http_client,
        })
    }

    /// Generate a V4 signed URL for the given method, bucket and object path
    fn sign_url(&self, method: &str, bucket: &str, object_path: &str) -> Result<String> {
        let now = Utc::now();
        let datestamp = now.format("%Y%m%d").to_string();
        let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();

        let credential_scope = format!("{datestamp}/auto/storage/goog4_request");
        let credential = format!("{}/{}", self.client_email, credential_scope);

        let encoded_object = utf8_percent_encode(object_path, PATH_SET).to_string();
        let canonical_uri = format!("/{}/{}", bucket, encoded_object.trim_start_matches('/'));

        let canonical_headers = format!("host:{}\n", self.host);
        let signed_headers = "host";

        let expires = SIGNED_URL_TTL.as_secs();
        let mut query_items = vec![
            ("X-Goog-Algorithm", "GOOG4-RSA-SHA256".to_string()),
            (
                "X-Goog-Credential",
                urlencoding::encode(&credential).into_owned(),
            ),
            ("X-Goog-Date", timestamp.clone()),
            ("X-Goog-Expires", expires.to_string()),
            ("X-Goog-SignedHeaders", signed_headers.to_string()),
        ];

        query_items.sort_by(|a, b| a.0.cmp(b.0));
        let canonical_query = query_items
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let canonical_request = format!(
            "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\nUNSIGNED-PAYLOAD"
        );
        let canonical_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));

        let string_to_sign =
            format!("GOOG4-RSA-SHA256\n{timestamp}\n{credential_scope}\n{canonical_hash}");

        let signing_key = SigningKey::<Sha256>::new(self.private_key.clone());
        let signature = signing_key.sign(string_to_sign.as_bytes()).to_bytes();
        let signature_hex = hex::encode(signature);

        let query_with_sig = format!("{canonical_query}&X-Goog-Signature={signature_hex}");
        Ok(format!(
            "https://{host}{canonical_uri}?{query_with_sig}",
            host = self.host
        ))
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "https://{}/storage/v1/b/{}/o/{}",
            self.host,
            bucket,
            utf8_percent_encode(path, OBJECT_SET)
        )
    }

    async fn bearer(&self) -> Result<String> {
        self.token.access_token().await
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn download(&self, bucket: &str, path: &str) -> Result<Bytes> {
        let signed_url = self.sign_url("GET", bucket, path)?;

        debug!(bucket = %bucket, path = %path, "Downloading object");

        let response = self
            .http_client
            .get(&signed_url)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Download failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("Object missing: {path}")));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Storage(format!(
                "Download failed with status {status}: {body}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to read download body: {e}")))?;

        debug!(path = %path, size = bytes.len(), "Downloaded object");
        Ok(bytes)
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content: Bytes,
        content_type: &str,
    ) -> Result<()> {
        let signed_url = self.sign_url("PUT", bucket, path)?;

        debug!(bucket = %bucket, path = %path, size = content.len(), "Uploading object");

        let response = self
            .http_client
            .put(&signed_url)
            .header("Content-Type", content_type)
            .body(content)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Upload failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Storage(format!(
                "Upload failed with status {status}: {body}"
            )));
        }

        info!(path = %path, "Uploaded object");
        Ok(())
    }

    async fn metadata(&self, bucket: &str, path: &str) -> Result<Option<ObjectMeta>> {
        let token = self.bearer().await?;
        let response = self
            .http_client
            .get(self.object_url(bucket, path))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Metadata fetch failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AppError::Storage(format!(
                "Metadata fetch failed with status {}",
                response.status()
            )));
        }

        let resource: ObjectResource = response
            .json()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to parse object resource: {e}")))?;

        Ok(Some(ObjectMeta {
            updated: resource.updated.unwrap_or(resource.time_created),
        }))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let token = self.bearer().await?;
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(format!("https://{}/storage/v1/b/{}/o", self.host, bucket))
                .bearer_auth(&token)
                .query(&[
                    ("prefix", prefix),
                    ("fields", "items(name),nextPageToken"),
                ]);
            if let Some(ref t) = page_token {
                request = request.query(&[("pageToken", t.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| AppError::Storage(format!("List failed: {e}")))?;

            if !response.status().is_success() {
                return Err(AppError::Storage(format!(
                    "List failed with status {}",
                    response.status()
                )));
            }

            let page: ListResponse = response
                .json()
                .await
                .map_err(|e| AppError::Storage(format!("Failed to parse list response: {e}")))?;

            names.extend(page.items.into_iter().map(|o| o.name));
            match page.next_page_token {
                Some(t) => page_token = Some(t),
                None => break,
            }
        }

        debug!(bucket = %bucket, prefix = %prefix, count = names.len(), "Listed objects");
        Ok(names)
    }

    async fn delete(&self, bucket: &str, path: &str) -> Result<()> {
        let token = self.bearer().await?;
        let response = self
            .http_client
            .delete(self.object_url(bucket, path))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Delete failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("Object already gone: {path}")));
        }
        if !response.status().is_success() {
            return Err(AppError::Storage(format!(
                "Delete failed with status {}",
                response.status()
            )));
        }

        debug!(bucket = %bucket, path = %path, "Deleted object");
        Ok(())
    }
}
