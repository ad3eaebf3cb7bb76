//! Thumbnail lifecycle orchestration.
//!
//! Consumes one classified storage event to completion: either sweeps the
//! derived artifacts of a deleted source, or (re)generates the configured
//! renditions of a finalized image. The only mitigation against duplicate
//! deliveries is the per-size freshness check; racing invocations may both
//! regenerate and last-write-wins at the store, which converges because the
//! derived content is deterministic for a given source.

use super::classifier::{self, Action};
use super::idempotency;
use super::notifier::ThumbnailNotifier;
use super::processor;
use super::storage::ObjectStore;
use crate::error::{AppError, Result};
use crate::models::{GenerationManifest, ObjectRecord, StorageEvent};
use crate::paths;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Orchestrator configuration
#[derive(Clone, Debug)]
pub struct ThumbnailServiceConfig {
    /// Target sizes, processed in this order
    pub sizes: Vec<crate::models::ImageSize>,
    /// Monitored path prefixes
    pub monitored_paths: Vec<String>,
}

/// Top-level coordinator for one storage event
pub struct ThumbnailService {
    store: Arc<dyn ObjectStore>,
    notifier: Option<ThumbnailNotifier>,
    config: ThumbnailServiceConfig,
}

impl ThumbnailService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        notifier: Option<ThumbnailNotifier>,
        config: ThumbnailServiceConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Process one event to completion and return the manifest of artifacts
    /// produced (empty for ignores, deletes, and all-skipped generations)
    pub async fn handle_event(&self, event: &StorageEvent) -> Result<GenerationManifest> {
        match classifier::classify(event, &self.config.monitored_paths) {
            Action::Ignore(reason) => {
                let name = event.record().map(|r| r.name.as_str()).unwrap_or("<none>");
                info!(path = %name, reason = %reason, "Ignoring event");
                Ok(GenerationManifest::new())
            }
            Action::Delete => {
                let record = event.record().expect("delete action implies a record");
                self.sweep(record).await?;
                Ok(GenerationManifest::new())
            }
            Action::Generate => {
                let record = event.record().expect("generate action implies a record");
                self.generate(record).await
            }
        }
    }

    /// Regenerate the configured renditions of a finalized source object
    async fn generate(&self, record: &ObjectRecord) -> Result<GenerationManifest> {
        let content = match self.store.download(&record.bucket, &record.name).await {
            Ok(content) => content,
            Err(AppError::NotFound(_)) => {
                // Raced by a delete between notification and fetch
                return Err(AppError::NotFound(format!(
                    "Source object vanished: {}",
                    record.name
                )));
            }
            Err(e) => return Err(e),
        };

        let source = Arc::new(processor::decode_async(content).await?);
        let source_updated = record.updated_at();
        let mut manifest = GenerationManifest::new();

        for &size in &self.config.sizes {
            let candidate = paths::thumbnail_path(&record.name, size);

            let existing = match self.store.metadata(&record.bucket, &candidate).await {
                Ok(meta) => meta,
                Err(e) => {
                    // Treat an unreadable artifact as absent and regenerate
                    warn!(path = %candidate, error = %e, "Metadata lookup failed");
                    None
                }
            };
            if !idempotency::needs_regeneration(source_updated, existing.as_ref()) {
                debug!(path = %candidate, "Existing thumbnail is current, skipping");
                continue;
            }

            let thumb =
                match processor::render_async(source.clone(), record.name.clone(), size).await {
                    Ok(thumb) => thumb,
                    Err(e) => {
                        error!(path = %candidate, size = %size, error = %e, "Rendition failed");
                        continue;
                    }
                };

            match self
                .store
                .upload(&record.bucket, &thumb.path, thumb.content, &thumb.mime_type)
                .await
            {
                Ok(()) => {
                    info!(path = %thumb.path, size = %size, "Thumbnail uploaded");
                    manifest.record(size, thumb.path);
                }
                Err(e) => {
                    error!(path = %thumb.path, error = %e, "Thumbnail upload failed, size omitted");
                }
            }
        }

        if !manifest.is_empty() {
            if let Some(ref notifier) = self.notifier {
                notifier.notify(&record.name, &manifest).await;
            }
        }

        Ok(manifest)
    }

    /// Best-effort batch delete of every artifact derived from the source
    async fn sweep(&self, record: &ObjectRecord) -> Result<()> {
        let prefix = paths::sweep_prefix(&record.name);
        let artifacts = self.store.list(&record.bucket, &prefix).await?;

        info!(prefix = %prefix, count = artifacts.len(), "Sweeping thumbnails");

        for path in artifacts {
            match self.store.delete(&record.bucket, &path).await {
                Ok(()) => info!(path = %path, "Thumbnail deleted"),
                Err(AppError::NotFound(_)) => {
                    // Raced by a duplicate delivery of the same delete
                    debug!(path = %path, "Thumbnail already gone");
                }
                Err(e) => warn!(path = %path, error = %e, "Thumbnail delete failed"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventKind, ImageSize};
    use crate::services::notifier::ManifestPublisher;
    use crate::services::storage::ObjectMeta;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::{DateTime, Duration, Utc};
    use image::ImageOutputFormat;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::Mutex;

    struct StoredObject {
        content: Bytes,
        updated: DateTime<Utc>,
    }

    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<HashMap<String, StoredObject>>,
        fail_upload_paths: Vec<String>,
        downloads: Mutex<Vec<String>>,
        uploads: Mutex<Vec<String>>,
        deletes: Mutex<Vec<String>>,
    }

    impl MemoryStore {
        fn key(bucket: &str, path: &str) -> String {
            format!("{bucket}/{path}")
        }

        fn put(&self, bucket: &str, path: &str, content: Bytes, updated: DateTime<Utc>) {
            self.objects
                .lock()
                .unwrap()
                .insert(Self::key(bucket, path), StoredObject { content, updated });
        }

        fn contains(&self, bucket: &str, path: &str) -> bool {
            self.objects
                .lock()
                .unwrap()
                .contains_key(&Self::key(bucket, path))
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn download(&self, bucket: &str, path: &str) -> crate::error::Result<Bytes> {
            self.downloads.lock().unwrap().push(path.to_string());
            self.objects
                .lock()
                .unwrap()
                .get(&Self::key(bucket, path))
                .map(|o| o.content.clone())
                .ok_or_else(|| AppError::NotFound(format!("Object missing: {path}")))
        }

        async fn upload(
            &self,
            bucket: &str,
            path: &str,
            content: Bytes,
            _content_type: &str,
        ) -> crate::error::Result<()> {
            if self.fail_upload_paths.iter().any(|p| p == path) {
                return Err(AppError::Storage("injected upload failure".to_string()));
            }
            self.uploads.lock().unwrap().push(path.to_string());
            self.put(bucket, path, content, Utc::now());
            Ok(())
        }

        async fn metadata(
            &self,
            bucket: &str,
            path: &str,
        ) -> crate::error::Result<Option<ObjectMeta>> {
            Ok(self
                .objects
                .lock()
                .unwrap()
                .get(&Self::key(bucket, path))
                .map(|o| ObjectMeta { updated: o.updated }))
        }

        async fn list(&self, bucket: &str, prefix: &str) -> crate::error::Result<Vec<String>> {
            let marker = format!("{bucket}/");
            Ok(self
                .objects
                .lock()
                .unwrap()
                .keys()
                .filter_map(|k| k.strip_prefix(&marker))
                .filter(|p| p.starts_with(prefix))
                .map(str::to_string)
                .collect())
        }

        async fn delete(&self, bucket: &str, path: &str) -> crate::error::Result<()> {
            self.deletes.lock().unwrap().push(path.to_string());
            self.objects
                .lock()
                .unwrap()
                .remove(&Self::key(bucket, path))
                .map(|_| ())
                .ok_or_else(|| AppError::NotFound(format!("Object already gone: {path}")))
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<(String, serde_json::Value)>>,
    }

    #[async_trait]
    impl ManifestPublisher for RecordingPublisher {
        async fn ensure_topic(&self, _topic_id: &str) -> crate::error::Result<()> {
            Ok(())
        }

        async fn publish(
            &self,
            topic_id: &str,
            payload: serde_json::Value,
        ) -> crate::error::Result<()> {
            self.published
                .lock()
                .unwrap()
                .push((topic_id.to_string(), payload));
            Ok(())
        }
    }

    fn png_bytes() -> Bytes {
        let img = image::DynamicImage::ImageRgba8(image::RgbaImage::new(64, 64));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .expect("encode test image");
        Bytes::from(buf)
    }

    fn finalize_event(name: &str, content_type: &str, updated: DateTime<Utc>) -> StorageEvent {
        StorageEvent::new(
            EventKind::Finalize,
            ObjectRecord {
                bucket: "photos".to_string(),
                name: name.to_string(),
                content_type: content_type.to_string(),
                updated: Some(updated),
                time_created: updated,
            },
        )
    }

    fn delete_event(name: &str) -> StorageEvent {
        StorageEvent::new(
            EventKind::Delete,
            ObjectRecord {
                bucket: "photos".to_string(),
                name: name.to_string(),
                content_type: String::new(),
                updated: None,
                time_created: Utc::now(),
            },
        )
    }

    fn service(
        store: Arc<MemoryStore>,
        publisher: Option<Arc<RecordingPublisher>>,
        sizes: Vec<ImageSize>,
        monitored: Vec<&str>,
    ) -> ThumbnailService {
        ThumbnailService::new(
            store,
            publisher.map(|p| ThumbnailNotifier::new(p as Arc<dyn ManifestPublisher>)),
            ThumbnailServiceConfig {
                sizes,
                monitored_paths: monitored.into_iter().map(str::to_string).collect(),
            },
        )
    }

    #[tokio::test]
    async fn test_generates_thumbnail_and_notifies() {
        let store = Arc::new(MemoryStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let updated = Utc::now();
        store.put("photos", "pics/cat.png", png_bytes(), updated);

        let svc = service(
            store.clone(),
            Some(publisher.clone()),
            vec![ImageSize::new(512, 512)],
            vec!["/"],
        );
        let manifest = svc
            .handle_event(&finalize_event("pics/cat.png", "image/png", updated))
            .await
            .unwrap();

        assert_eq!(
            manifest.get(ImageSize::new(512, 512)),
            Some("pics/thumbnails/cat_512x512.png")
        );
        assert!(store.contains("photos", "pics/thumbnails/cat_512x512.png"));
        assert_eq!(store.uploads.lock().unwrap().len(), 1);
        assert!(store.deletes.lock().unwrap().is_empty());

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "thumbgen-pics%2Fcat.png");
        assert_eq!(
            published[0].1,
            serde_json::json!({ "512x512": "pics/thumbnails/cat_512x512.png" })
        );
    }

    #[tokio::test]
    async fn test_fresh_artifact_skips_regeneration_and_notification() {
        let store = Arc::new(MemoryStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let updated = Utc::now();
        store.put("photos", "pics/cat.png", png_bytes(), updated);
        // Artifact at least as new as the source: a duplicate invocation
        // already finished.
        store.put(
            "photos",
            "pics/thumbnails/cat_512x512.png",
            png_bytes(),
            updated,
        );

        let svc = service(
            store.clone(),
            Some(publisher.clone()),
            vec![ImageSize::new(512, 512)],
            vec!["/"],
        );
        let manifest = svc
            .handle_event(&finalize_event("pics/cat.png", "image/png", updated))
            .await
            .unwrap();

        assert!(manifest.is_empty());
        assert!(store.uploads.lock().unwrap().is_empty());
        assert!(publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_artifact_is_regenerated() {
        let store = Arc::new(MemoryStore::default());
        let updated = Utc::now();
        store.put("photos", "pics/cat.png", png_bytes(), updated);
        store.put(
            "photos",
            "pics/thumbnails/cat_512x512.png",
            png_bytes(),
            updated - Duration::minutes(5),
        );

        let svc = service(store.clone(), None, vec![ImageSize::new(512, 512)], vec!["/"]);
        let manifest = svc
            .handle_event(&finalize_event("pics/cat.png", "image/png", updated))
            .await
            .unwrap();

        assert_eq!(manifest.len(), 1);
        assert_eq!(store.uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_sweeps_all_sizes() {
        let store = Arc::new(MemoryStore::default());
        let now = Utc::now();
        store.put("photos", "pics/thumbnails/cat_512x512.png", png_bytes(), now);
        store.put("photos", "pics/thumbnails/cat_128x128.png", png_bytes(), now);
        // Unrelated artifact stays
        store.put("photos", "pics/thumbnails/dog_512x512.png", png_bytes(), now);

        let svc = service(
            store.clone(),
            None,
            vec![ImageSize::new(512, 512)],
            vec!["pics/"],
        );
        let manifest = svc.handle_event(&delete_event("pics/cat.png")).await.unwrap();

        assert!(manifest.is_empty());
        assert!(store.uploads.lock().unwrap().is_empty());
        assert!(!store.contains("photos", "pics/thumbnails/cat_512x512.png"));
        assert!(!store.contains("photos", "pics/thumbnails/cat_128x128.png"));
        assert!(store.contains("photos", "pics/thumbnails/dog_512x512.png"));
    }

    #[tokio::test]
    async fn test_non_image_touches_no_collaborator() {
        let store = Arc::new(MemoryStore::default());
        let publisher = Arc::new(RecordingPublisher::default());

        let svc = service(
            store.clone(),
            Some(publisher.clone()),
            vec![ImageSize::new(512, 512)],
            vec!["/"],
        );
        let manifest = svc
            .handle_event(&finalize_event("pics/notes.txt", "text/plain", Utc::now()))
            .await
            .unwrap();

        assert!(manifest.is_empty());
        assert!(store.downloads.lock().unwrap().is_empty());
        assert!(store.uploads.lock().unwrap().is_empty());
        assert!(publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_vanished_source_aborts_invocation() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(store, None, vec![ImageSize::new(512, 512)], vec!["/"]);

        let err = svc
            .handle_event(&finalize_event("pics/cat.png", "image/png", Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_undecodable_source_aborts_invocation() {
        let store = Arc::new(MemoryStore::default());
        let updated = Utc::now();
        store.put(
            "photos",
            "pics/cat.png",
            Bytes::from_static(b"not an image at all"),
            updated,
        );

        let svc = service(store.clone(), None, vec![ImageSize::new(512, 512)], vec!["/"]);
        let err = svc
            .handle_event(&finalize_event("pics/cat.png", "image/png", updated))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::UnsupportedImage(_)));
        assert!(store.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_omits_size_but_continues() {
        let store = Arc::new(MemoryStore {
            fail_upload_paths: vec!["pics/thumbnails/cat_128x128.png".to_string()],
            ..Default::default()
        });
        let updated = Utc::now();
        store.put("photos", "pics/cat.png", png_bytes(), updated);

        let svc = service(
            store.clone(),
            None,
            vec![ImageSize::new(128, 128), ImageSize::new(512, 512)],
            vec!["/"],
        );
        let manifest = svc
            .handle_event(&finalize_event("pics/cat.png", "image/png", updated))
            .await
            .unwrap();

        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.get(ImageSize::new(128, 128)), None);
        assert_eq!(
            manifest.get(ImageSize::new(512, 512)),
            Some("pics/thumbnails/cat_512x512.png")
        );
    }

    #[tokio::test]
    async fn test_manifest_follows_configured_size_order() {
        let store = Arc::new(MemoryStore::default());
        let updated = Utc::now();
        store.put("photos", "pics/cat.png", png_bytes(), updated);

        let svc = service(
            store.clone(),
            None,
            vec![ImageSize::new(512, 512), ImageSize::new(128, 128)],
            vec!["/"],
        );
        let manifest = svc
            .handle_event(&finalize_event("pics/cat.png", "image/png", updated))
            .await
            .unwrap();

        let json = manifest.to_json();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["512x512", "128x128"]);
    }

    #[tokio::test]
    async fn test_duplicate_delete_tolerates_missing_artifacts() {
        let store = Arc::new(MemoryStore::default());
        let now = Utc::now();
        store.put("photos", "pics/thumbnails/cat_512x512.png", png_bytes(), now);

        let svc = service(store.clone(), None, vec![], vec!["pics/"]);
        svc.handle_event(&delete_event("pics/cat.png")).await.unwrap();
        // Duplicate delivery: artifacts already gone, sweep still succeeds
        svc.handle_event(&delete_event("pics/cat.png")).await.unwrap();

        assert!(!store.contains("photos", "pics/thumbnails/cat_512x512.png"));
    }
}
