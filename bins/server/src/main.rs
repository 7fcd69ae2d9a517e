//! Meridian API Server
//!
//! Main entry point for the Meridian backend service.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meridian_api::{AppState, create_router};
use meridian_core::kyc::KycDocuments;
use meridian_core::storage::{StorageConfig, StorageService};
use meridian_db::connect_with_pool;
use meridian_shared::{AppConfig, HostedAuthClient, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meridian=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;

    let db = connect_with_pool(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await?;
    info!("Connected to database");

    let jwt_service = JwtService::new(&config.auth.jwt_secret);
    let auth_client = HostedAuthClient::new(&config.auth.url, &config.auth.anon_key)
        .with_service_role_key(&config.auth.service_role_key);

    let kyc_documents = match &config.storage {
        Some(settings) => {
            let storage = StorageService::from_config(StorageConfig::from_settings(settings))?;
            info!(bucket = %settings.bucket, "Document storage configured");
            Some(KycDocuments::new(Arc::new(storage)))
        }
        None => {
            warn!("Document storage not configured; KYC uploads are disabled");
            None
        }
    };

    let state = AppState::new(
        Arc::new(db),
        jwt_service,
        auth_client,
        kyc_documents,
        config.chat.poll_interval_secs,
    );
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
