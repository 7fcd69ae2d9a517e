//! Shared types, errors, and configuration for Meridian.
//!
//! This crate provides common types used across all other crates:
//! - Money types with decimal precision
//! - Typed IDs for type-safe entity references
//! - Pagination types for list endpoints
//! - Application-wide error types
//! - Configuration management
//! - Hosted auth service client and token validation

pub mod auth;
pub mod config;
pub mod error;
pub mod hosted_auth;
pub mod jwt;
pub mod retry;
pub mod types;

pub use auth::Claims;
pub use config::{AppConfig, ImportConfig};
pub use error::{AppError, AppResult};
pub use hosted_auth::{AuthClientError, HostedAuthClient};
pub use jwt::{JwtError, JwtService};
pub use retry::RetryPolicy;
