//! Request middleware and extractors.

pub mod auth;

pub use auth::{AdminContext, AuthUser, auth_middleware};
