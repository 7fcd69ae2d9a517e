//! Storage service implementation using Apache OpenDAL.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use opendal::{ErrorKind, Operator, services};
use serde::Serialize;

use super::config::{StorageConfig, StorageProvider};
use super::error::StorageError;

/// Presigned URL for upload or download.
#[derive(Debug, Clone, Serialize)]
pub struct PresignedUrl {
    /// The presigned URL.
    pub url: String,
    /// HTTP method to use (PUT for upload, GET for download).
    pub method: String,
    /// When the URL expires.
    pub expires_at: DateTime<Utc>,
    /// Required headers for the request.
    pub headers: HashMap<String, String>,
}

/// Metadata about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectMetadata {
    /// Storage key.
    pub key: String,
    /// File size in bytes.
    pub size: u64,
    /// Content type.
    pub content_type: Option<String>,
}

/// Object storage for uploaded documents.
pub struct StorageService {
    operator: Operator,
    config: StorageConfig,
}

impl std::fmt::Debug for StorageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageService")
            .field("provider", &self.config.provider.name())
            .finish_non_exhaustive()
    }
}

impl StorageService {
    /// Create a new storage service from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage provider cannot be initialized.
    pub fn from_config(config: StorageConfig) -> Result<Self, StorageError> {
        let operator = Self::create_operator(&config.provider)?;
        Ok(Self { operator, config })
    }

    fn create_operator(provider: &StorageProvider) -> Result<Operator, StorageError> {
        match provider {
            StorageProvider::S3 {
                endpoint,
                bucket,
                access_key_id,
                secret_access_key,
                region,
            } => {
                let builder = services::S3::default()
                    .endpoint(endpoint)
                    .bucket(bucket)
                    .access_key_id(access_key_id)
                    .secret_access_key(secret_access_key)
                    .region(region);

                Ok(Operator::new(builder)
                    .map_err(|e| StorageError::configuration(e.to_string()))?
                    .finish())
            }
            StorageProvider::LocalFs { root } => {
                let root = root
                    .to_str()
                    .ok_or_else(|| StorageError::configuration("invalid path"))?;
                let builder = services::Fs::default().root(root);

                Ok(Operator::new(builder)
                    .map_err(|e| StorageError::configuration(e.to_string()))?
                    .finish())
            }
        }
    }

    /// Validate upload request against config constraints.
    ///
    /// # Errors
    ///
    /// Returns an error if file size or MIME type is invalid.
    pub fn validate_upload(&self, content_type: &str, size: u64) -> Result<(), StorageError> {
        if size > self.config.max_file_size {
            return Err(StorageError::file_too_large(
                size,
                self.config.max_file_size,
            ));
        }
        if !self.config.is_mime_type_allowed(content_type) {
            return Err(StorageError::invalid_mime_type(content_type));
        }
        Ok(())
    }

    /// Generate presigned URL for uploading to `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or presigning is not supported.
    pub async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        size: u64,
    ) -> Result<PresignedUrl, StorageError> {
        self.validate_upload(content_type, size)?;

        let ttl = self.config.presign_upload_ttl_secs;
        let presigned = self
            .operator
            .presign_write(key, Duration::from_secs(ttl))
            .await?;

        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());

        Ok(PresignedUrl {
            url: presigned.uri().to_string(),
            method: presigned.method().to_string(),
            expires_at: expiry(ttl),
            headers,
        })
    }

    /// Generate presigned URL for download.
    ///
    /// # Errors
    ///
    /// Returns an error if presigning is not supported or fails.
    pub async fn presign_download(&self, key: &str) -> Result<PresignedUrl, StorageError> {
        let ttl = self.config.presign_download_ttl_secs;
        let presigned = self
            .operator
            .presign_read(key, Duration::from_secs(ttl))
            .await?;

        Ok(PresignedUrl {
            url: presigned.uri().to_string(),
            method: presigned.method().to_string(),
            expires_at: expiry(ttl),
            headers: HashMap::new(),
        })
    }

    /// Verify that an uploaded object exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if nothing was uploaded under `key`.
    pub async fn verify_upload(&self, key: &str) -> Result<ObjectMetadata, StorageError> {
        let meta = self.operator.stat(key).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound {
                key: key.to_string(),
            },
            _ => StorageError::from(e),
        })?;

        Ok(ObjectMetadata {
            key: key.to_string(),
            size: meta.content_length(),
            content_type: meta.content_type().map(String::from),
        })
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &StorageConfig {
        &self.config
    }
}

fn expiry(ttl_secs: u64) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX))
}

/// Sanitize filename for storage key.
///
/// Only allows ASCII alphanumeric characters, dots, hyphens, and underscores.
#[must_use]
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn local_service(config: StorageConfig) -> StorageService {
        StorageService::from_config(config).expect("should create service")
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("passport.pdf"), "passport.pdf");
        assert_eq!(sanitize_filename("my scan (1).jpg"), "my_scan__1_.jpg");
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_filename("日本語.pdf"), "___.pdf");
    }

    #[test]
    fn test_validate_upload() {
        let config =
            StorageConfig::new(StorageProvider::local_fs("./test")).with_max_file_size(1024);
        let service = local_service(config);

        assert!(service.validate_upload("application/pdf", 512).is_ok());
        assert!(matches!(
            service.validate_upload("application/pdf", 2048),
            Err(StorageError::FileTooLarge { .. })
        ));
        assert!(matches!(
            service.validate_upload("application/x-executable", 10),
            Err(StorageError::InvalidMimeType { .. })
        ));
    }

    #[tokio::test]
    async fn test_verify_missing_object() {
        let dir = std::env::temp_dir().join(format!("meridian-storage-{}", uuid::Uuid::new_v4()));
        let service = local_service(StorageConfig::new(StorageProvider::local_fs(&dir)));
        let err = service.verify_upload("kyc/none/front-a.pdf").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { key } if key == "kyc/none/front-a.pdf"));
    }

    proptest! {
        #[test]
        fn prop_sanitized_filename_safe_chars(filename in ".*") {
            let sanitized = sanitize_filename(&filename);
            for c in sanitized.chars() {
                let is_safe = c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_';
                prop_assert!(is_safe, "Unexpected character in sanitized filename: {}", c);
            }
        }

        #[test]
        fn prop_file_size_validation(
            max_size in 1024u64..10_000_000,
            file_size in 0u64..20_000_000,
        ) {
            let config = StorageConfig::new(StorageProvider::local_fs("./test"))
                .with_max_file_size(max_size);
            let service = local_service(config);
            let result = service.validate_upload("image/png", file_size);
            prop_assert_eq!(result.is_ok(), file_size <= max_size);
        }
    }
}
