//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - REST API routes for clients and admins
//! - Authentication middleware and the admin scope extractor
//! - The JSON error envelope

pub mod error;
pub mod middleware;
pub mod routes;

use axum::Router;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use meridian_core::access::AccessResolver;
use meridian_core::kyc::KycDocuments;
use meridian_db::AccessRepository;
use meridian_shared::{HostedAuthClient, JwtService};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: Arc<DatabaseConnection>,
    /// Validates hosted-auth access tokens.
    pub jwt_service: Arc<JwtService>,
    /// Hosted auth service client.
    pub auth_client: Arc<HostedAuthClient>,
    /// Resolves the accessible set of admin-side callers.
    pub access: AccessResolver<AccessRepository>,
    /// Presigned KYC document access (absent when storage is not configured).
    pub kyc_documents: Option<Arc<KycDocuments>>,
    /// Interval advertised to chat pollers.
    pub chat_poll_interval_secs: u64,
}

impl AppState {
    /// Builds the state around a shared database connection.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        jwt_service: JwtService,
        auth_client: HostedAuthClient,
        kyc_documents: Option<KycDocuments>,
        chat_poll_interval_secs: u64,
    ) -> Self {
        let access = AccessResolver::new(Arc::new(AccessRepository::new(Arc::clone(&db))));
        Self {
            db,
            jwt_service: Arc::new(jwt_service),
            auth_client: Arc::new(auth_client),
            access,
            kyc_documents: kyc_documents.map(Arc::new),
            chat_poll_interval_secs,
        }
    }

    /// A handle to the connection for building repositories.
    #[must_use]
    pub fn conn(&self) -> Arc<DatabaseConnection> {
        Arc::clone(&self.db)
    }
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes_with_state(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
