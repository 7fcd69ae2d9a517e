//! Storage configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use meridian_shared::config::StorageSettings;

/// Storage provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageProvider {
    /// S3-compatible storage (the hosted project's storage API, R2, AWS S3).
    S3 {
        /// S3 endpoint URL.
        endpoint: String,
        /// Bucket name.
        bucket: String,
        /// Access key ID.
        access_key_id: String,
        /// Secret access key.
        secret_access_key: String,
        /// Region.
        region: String,
    },
    /// Local filesystem (development only)
    LocalFs {
        /// Root directory path.
        root: PathBuf,
    },
}

impl StorageProvider {
    /// Create S3-compatible provider.
    #[must_use]
    pub fn s3(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self::S3 {
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
        }
    }

    /// Create local filesystem provider (development only).
    #[must_use]
    pub fn local_fs(root: impl Into<PathBuf>) -> Self {
        Self::LocalFs { root: root.into() }
    }

    /// Provider name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::S3 { .. } => "s3",
            Self::LocalFs { .. } => "local",
        }
    }
}

/// Storage service configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Storage provider configuration.
    pub provider: StorageProvider,
    /// Maximum file size in bytes.
    pub max_file_size: u64,
    /// Presigned upload URL TTL in seconds.
    pub presign_upload_ttl_secs: u64,
    /// Presigned download URL TTL in seconds. Kept short: these are identity documents.
    pub presign_download_ttl_secs: u64,
    /// Allowed MIME types for upload.
    pub allowed_mime_types: Vec<String>,
}

impl StorageConfig {
    /// Default max file size: 10MB.
    pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
    /// Default upload TTL: 15 minutes.
    pub const DEFAULT_UPLOAD_TTL: u64 = 900;
    /// Default download TTL: 5 minutes.
    pub const DEFAULT_DOWNLOAD_TTL: u64 = 300;

    /// Create a new storage config with default settings.
    #[must_use]
    pub fn new(provider: StorageProvider) -> Self {
        Self {
            provider,
            max_file_size: Self::DEFAULT_MAX_FILE_SIZE,
            presign_upload_ttl_secs: Self::DEFAULT_UPLOAD_TTL,
            presign_download_ttl_secs: Self::DEFAULT_DOWNLOAD_TTL,
            allowed_mime_types: Self::default_mime_types(),
        }
    }

    /// S3 config from application settings.
    #[must_use]
    pub fn from_settings(settings: &StorageSettings) -> Self {
        Self::new(StorageProvider::s3(
            &settings.endpoint,
            &settings.bucket,
            &settings.access_key_id,
            &settings.secret_access_key,
            &settings.region,
        ))
        .with_max_file_size(settings.max_file_size)
    }

    /// Set maximum file size.
    #[must_use]
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Set presigned upload URL TTL.
    #[must_use]
    pub fn with_upload_ttl(mut self, secs: u64) -> Self {
        self.presign_upload_ttl_secs = secs;
        self
    }

    /// Set presigned download URL TTL.
    #[must_use]
    pub fn with_download_ttl(mut self, secs: u64) -> Self {
        self.presign_download_ttl_secs = secs;
        self
    }

    /// Identity document formats accepted for KYC.
    #[must_use]
    pub fn default_mime_types() -> Vec<String> {
        ["application/pdf", "image/png", "image/jpeg", "image/webp", "image/heic"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Check if a MIME type is allowed.
    #[must_use]
    pub fn is_mime_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_mime_types.iter().any(|t| t == mime_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings() {
        let settings = StorageSettings {
            endpoint: "https://project.storage.example.co/storage/v1/s3".into(),
            bucket: "kyc-documents".into(),
            access_key_id: "id".into(),
            secret_access_key: "secret".into(),
            region: "us-east-1".into(),
            max_file_size: 5 * 1024 * 1024,
        };
        let config = StorageConfig::from_settings(&settings);
        assert_eq!(config.provider.name(), "s3");
        assert_eq!(config.max_file_size, 5 * 1024 * 1024);
        assert_eq!(config.presign_download_ttl_secs, StorageConfig::DEFAULT_DOWNLOAD_TTL);
    }

    #[test]
    fn test_mime_type_validation() {
        let config = StorageConfig::new(StorageProvider::local_fs("./storage"));
        assert!(config.is_mime_type_allowed("application/pdf"));
        assert!(config.is_mime_type_allowed("image/jpeg"));
        assert!(!config.is_mime_type_allowed("application/msword"));
        assert!(!config.is_mime_type_allowed("text/html"));
    }
}
