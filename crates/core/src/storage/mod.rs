//! Object storage for KYC documents using Apache OpenDAL.
//!
//! Clients upload and reviewers download directly against the bucket with
//! presigned URLs; document bytes never pass through the API.
//!
//! ```text
//! op.presign_write("key", ttl)   client PUTs the document
//! op.stat("key")                 submission checks the upload landed
//! op.presign_read("key", ttl)    reviewer GETs the document
//! ```

mod config;
mod error;
mod service;

pub use config::{StorageConfig, StorageProvider};
pub use error::StorageError;
pub use service::{ObjectMetadata, PresignedUrl, StorageService, sanitize_filename};
