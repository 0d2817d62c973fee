use anyhow::{Context, Result};
use camgate::{
    config::{AppConfig, Backend},
    routes,
    services::{
        cloudinary::CloudinaryClient,
        firestore::FirestoreClient,
        image_service::{ImageService, ServiceSettings},
        media_store::MediaStore,
        memory::{InMemoryMediaStore, InMemoryMetadataStore},
        metadata_store::{MetadataHandle, MetadataStore},
    },
};
use std::{io::ErrorKind, net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;

    // --- Logging setup ---
    let default_filter = if cfg.debug {
        "camgate=debug,tower_http=debug"
    } else {
        "camgate=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    tracing::info!("Starting camgate with config: {:?}", cfg);

    // --- Initialize stores ---
    let (media, metadata) = match cfg.backend {
        Backend::Cloud => (cloud_media(&cfg)?, cloud_metadata(&cfg).await),
        Backend::Memory => {
            tracing::warn!("memory backend selected; images vanish on restart");
            let media: Arc<dyn MediaStore> = Arc::new(InMemoryMediaStore::new());
            let metadata: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
            (media, MetadataHandle::available(metadata))
        }
    };
    tracing::info!(
        metadata_available = metadata.is_available(),
        "stores initialized"
    );

    // --- Build router ---
    let service = ImageService::new(media, metadata, ServiceSettings::from(&cfg));
    let app = routes::app(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

fn cloud_media(cfg: &AppConfig) -> Result<Arc<dyn MediaStore>> {
    let credentials = cfg
        .cloudinary
        .clone()
        .context("Cloudinary credentials are required for the cloud backend")?;
    tracing::info!(cloud_name = %credentials.cloud_name, "Cloudinary configured");
    let client = CloudinaryClient::new(credentials).context("building Cloudinary client")?;
    Ok(Arc::new(client))
}

/// Firestore client, or degraded mode when it cannot be set up or reached.
async fn cloud_metadata(cfg: &AppConfig) -> MetadataHandle {
    let client = match FirestoreClient::new(&cfg.firestore, &cfg.collection) {
        Ok(client) => client,
        Err(err) => {
            tracing::warn!(error = %err, "Firestore initialization failed; running without metadata store");
            return MetadataHandle::unavailable();
        }
    };

    match client.ping().await {
        Ok(()) => {
            tracing::info!(collection = %cfg.collection, "Firestore initialized");
            MetadataHandle::available(Arc::new(client))
        }
        Err(err) => {
            tracing::warn!(error = %err, "Firestore unreachable at startup; running without metadata store");
            MetadataHandle::unavailable()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = signal_or_park(tokio::signal::ctrl_c(), "Ctrl+C");

    #[cfg(unix)]
    let terminate = signal_or_park(
        async {
            use tokio::signal::unix::{SignalKind, signal};
            signal(SignalKind::terminate())?.recv().await;
            Ok::<(), std::io::Error>(())
        },
        "SIGTERM",
    );

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

/// Resolves when the signal arrives. A handler that cannot be installed
/// never resolves, so it cannot trigger shutdown on its own.
async fn signal_or_park<E: std::fmt::Display>(
    signal: impl Future<Output = Result<(), E>>,
    name: &str,
) {
    if let Err(err) = signal.await {
        tracing::error!(error = %err, "failed to install {} handler", name);
        std::future::pending::<()>().await;
    }
}
