/// Thumbnail service - HTTP server
///
/// Receives Cloud Storage notifications on a Pub/Sub push endpoint and
/// maintains thumbnail renditions for the monitored image objects.
use actix_web::{web, App, HttpResponse, HttpServer};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thumbgen::services::{
    GcpTokenProvider, GcsStore, ObjectStore, PubSubPublisher, ServiceAccountKey,
    ThumbnailNotifier, ThumbnailService, ThumbnailServiceConfig,
};
use thumbgen::{handlers, Config};
use tracing::{info, warn};

fn to_io(err: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("thumbgen=info".parse().expect("valid directive")),
        )
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    info!(
        sizes = config.thumbnails.sizes.len(),
        monitored = config.thumbnails.monitored_paths.len(),
        notify = config.thumbnails.notify,
        "Configuration loaded"
    );
    if config.thumbnails.sizes.is_empty() {
        warn!("THUMB_SIZES is empty; finalize events will produce no thumbnails");
    }
    if config.thumbnails.monitored_paths.is_empty() {
        warn!("MONITORED_PATHS is empty; every event will be ignored");
    }

    // Google credentials, shared token provider and HTTP client
    let sa_json = config.gcs.load_service_account_json().map_err(to_io)?;
    let credentials = ServiceAccountKey::from_json(&sa_json).map_err(to_io)?;
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()
        .map_err(to_io)?;
    let token = Arc::new(GcpTokenProvider::new(
        credentials.clone(),
        http_client.clone(),
    ));

    let store: Arc<dyn ObjectStore> = Arc::new(
        GcsStore::new(&credentials, &config.gcs.host, token.clone(), http_client.clone())
            .map_err(to_io)?,
    );

    let notifier = config.thumbnails.notify.then(|| {
        ThumbnailNotifier::new(Arc::new(PubSubPublisher::new(token, http_client)))
    });

    let service = Arc::new(ThumbnailService::new(
        store,
        notifier,
        ThumbnailServiceConfig {
            sizes: config.thumbnails.sizes.clone(),
            monitored_paths: config.thumbnails.monitored_paths.clone(),
        },
    ));

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    info!(address = %bind_address, "Starting thumbnail service");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(service.clone()))
            .route("/events", web::post().to(handlers::receive_event))
            .route(
                "/health",
                web::get()
                    .to(|| async { HttpResponse::Ok().json(serde_json::json!({"status": "ok"})) }),
            )
    })
    .bind(bind_address)?
    .run()
    .await
}
