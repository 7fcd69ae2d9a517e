//! Application configuration management.

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Hosted auth service configuration.
    pub auth: AuthConfig,
    /// Object storage for KYC documents (optional in development).
    #[serde(default)]
    pub storage: Option<StorageSettings>,
    /// Live chat configuration.
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Hosted auth service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the hosted project (e.g. `https://xyz.supabase.co`).
    pub url: String,
    /// Public anon key, sent on user-facing auth calls.
    pub anon_key: String,
    /// Service role key, used for admin user listing.
    pub service_role_key: String,
    /// Secret used by the hosted service to sign access tokens.
    pub jwt_secret: String,
}

/// Object storage settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// S3-compatible endpoint.
    pub endpoint: String,
    /// Bucket holding KYC documents.
    pub bucket: String,
    /// Access key ID.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Maximum upload size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_region() -> String {
    "auto".to_string()
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

/// Live chat configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Interval clients should use when polling for new chat messages.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
        }
    }
}

fn default_poll_interval() -> u64 {
    2
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("MERIDIAN").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

/// Errors raised while reading the importer environment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImportConfigError {
    /// A required variable is not set or empty.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable is set to a value that cannot be parsed.
    #[error("invalid value for {name}: {value}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Configuration for the legacy CSV importer, read from the environment.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Hosted auth base URL.
    pub auth_url: String,
    /// Service role key for admin user listing.
    pub service_role_key: String,
    /// CSV input file.
    pub csv_path: PathBuf,
    /// Skip-log output file.
    pub skip_log_path: PathBuf,
    /// Suppress per-row log lines.
    pub quiet: bool,
    /// Simulate without writing.
    pub dry_run: bool,
    /// Emit a progress line every N rows (0 disables).
    pub log_every: usize,
}

impl ImportConfig {
    /// Default CSV input path.
    pub const DEFAULT_CSV_PATH: &'static str = "legacy_users.csv";
    /// Default skip-log path.
    pub const DEFAULT_SKIP_LOG_PATH: &'static str = "import_skipped.csv";
    /// Default progress interval.
    pub const DEFAULT_LOG_EVERY: usize = 50;

    /// Reads the importer configuration from process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a credential is missing or a value is malformed.
    pub fn from_env() -> Result<Self, ImportConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the importer configuration through an arbitrary lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a credential is missing or a value is malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ImportConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ImportConfigError::Missing(name))
        };

        let log_every = match lookup("LOG_EVERY") {
            Some(raw) if !raw.trim().is_empty() => {
                raw.trim()
                    .parse::<usize>()
                    .map_err(|_| ImportConfigError::Invalid {
                        name: "LOG_EVERY",
                        value: raw.clone(),
                    })?
            }
            _ => Self::DEFAULT_LOG_EVERY,
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            auth_url: required("AUTH_URL")?,
            service_role_key: required("SERVICE_ROLE_KEY")?,
            csv_path: lookup("CSV_PATH")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| Self::DEFAULT_CSV_PATH.to_string())
                .into(),
            skip_log_path: lookup("SKIP_LOG_PATH")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| Self::DEFAULT_SKIP_LOG_PATH.to_string())
                .into(),
            quiet: lookup("QUIET").is_some_and(|v| is_truthy(&v)),
            dry_run: lookup("DRY_RUN").is_some_and(|v| is_truthy(&v)),
            log_every,
        })
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_credentials<F: FnOnce()>(extra: &[(&str, Option<&str>)], f: F) {
        let mut vars = vec![
            ("DATABASE_URL", Some("postgres://localhost/meridian")),
            ("AUTH_URL", Some("https://project.example.co")),
            ("SERVICE_ROLE_KEY", Some("service-key")),
            ("CSV_PATH", None),
            ("SKIP_LOG_PATH", None),
            ("QUIET", None),
            ("DRY_RUN", None),
            ("LOG_EVERY", None),
        ];
        for &(name, value) in extra {
            vars.retain(|(n, _)| *n != name);
            vars.push((name, value));
        }
        temp_env::with_vars(vars, f);
    }

    #[test]
    fn test_import_config_defaults() {
        with_credentials(&[], || {
            let config = ImportConfig::from_env().unwrap();
            assert_eq!(config.csv_path, PathBuf::from("legacy_users.csv"));
            assert_eq!(config.skip_log_path, PathBuf::from("import_skipped.csv"));
            assert!(!config.quiet);
            assert!(!config.dry_run);
            assert_eq!(config.log_every, 50);
        });
    }

    #[test]
    fn test_import_config_flags() {
        with_credentials(
            &[
                ("QUIET", Some("true")),
                ("DRY_RUN", Some("1")),
                ("LOG_EVERY", Some("10")),
                ("CSV_PATH", Some("/tmp/in.csv")),
            ],
            || {
                let config = ImportConfig::from_env().unwrap();
                assert!(config.quiet);
                assert!(config.dry_run);
                assert_eq!(config.log_every, 10);
                assert_eq!(config.csv_path, PathBuf::from("/tmp/in.csv"));
            },
        );
    }

    #[test]
    fn test_import_config_missing_credentials() {
        with_credentials(&[("SERVICE_ROLE_KEY", None)], || {
            let err = ImportConfig::from_env().unwrap_err();
            assert_eq!(err, ImportConfigError::Missing("SERVICE_ROLE_KEY"));
        });
    }

    #[test]
    fn test_import_config_invalid_log_every() {
        with_credentials(&[("LOG_EVERY", Some("often"))], || {
            let err = ImportConfig::from_env().unwrap_err();
            assert!(matches!(err, ImportConfigError::Invalid { name: "LOG_EVERY", .. }));
        });
    }

    #[test]
    fn test_truthy_values() {
        assert!(is_truthy("YES"));
        assert!(is_truthy(" on "));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("false"));
    }
}
