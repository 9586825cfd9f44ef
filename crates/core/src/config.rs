//! Configuration types shared across crates.

use crate::variant::{Variant, VariantSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Per-request deadline in seconds. Bounds lock waits, gate waits and the
    /// origin fetch for a single image request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Origins allowed by CORS. `["*"]` allows any origin.
    #[serde(default = "default_cors_allowed_origins")]
    pub cors_allowed_origins: Vec<String>,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_cors_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout_secs(),
            metrics_enabled: default_metrics_enabled(),
            cors_allowed_origins: default_cors_allowed_origins(),
        }
    }
}

impl ServerConfig {
    /// Get the request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate server configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout_secs == 0 {
            return Err("server.request_timeout_secs cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage (AWS S3, MinIO, ...).
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// Access key ID. Falls back to the ambient AWS credential chain if not set.
        access_key_id: Option<String>,
        /// Secret access key. Falls back to the ambient AWS credential chain if not set.
        secret_access_key: Option<String>,
        /// Force path-style URLs (`endpoint/bucket/key`). Required for MinIO.
        #[serde(default)]
        force_path_style: bool,
        /// Create the bucket at startup if it does not exist.
        #[serde(default)]
        create_bucket: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/images"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.is_empty() {
                    return Err("s3 config requires a non-empty bucket".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            _ => Ok(()),
        }
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds (advisory only - SQLite cannot force-cancel queries).
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over individual fields.
        url: Option<String>,
        /// Database host.
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password.
        /// Prefer DARKROOM_METADATA__PASSWORD over storing it in a file.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// SSL mode for connections.
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(30)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => {
                    Err("postgres config requires either 'url' or 'host' + 'database'".to_string())
                }
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields".to_string(),
                ),
            },
        }
    }
}

/// Image cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Target width in pixels per variant. Width 0 means pass-through.
    #[serde(default = "default_variants")]
    pub variants: BTreeMap<Variant, u32>,
    /// Process-wide cap on concurrent origin fetches.
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,
    /// Client-level timeout for a single origin fetch, in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// JPEG quality used when encoding derived variants (1-100).
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Largest origin body accepted, in bytes.
    #[serde(default = "default_max_origin_bytes")]
    pub max_origin_bytes: u64,
    /// Max-age advertised in the Cache-Control header. Never enforced.
    #[serde(default = "default_cache_max_age_secs")]
    pub cache_max_age_secs: u64,
    /// User-Agent sent to the origin.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_variants() -> BTreeMap<Variant, u32> {
    BTreeMap::from([
        (Variant::Thumbnail, 300),
        (Variant::Medium, 600),
        (Variant::Full, 1200),
        (Variant::Original, 0),
    ])
}

/// Upper bound for `images.max_concurrent_downloads`.
///
/// Well below the permit limit of the download gate's semaphore.
pub const MAX_CONCURRENT_DOWNLOADS: usize = 65_536;

fn default_max_concurrent_downloads() -> usize {
    10
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_max_origin_bytes() -> u64 {
    32 * 1024 * 1024
}

fn default_cache_max_age_secs() -> u64 {
    7 * 24 * 3600
}

fn default_user_agent() -> String {
    concat!("darkroom/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            variants: default_variants(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            jpeg_quality: default_jpeg_quality(),
            max_origin_bytes: default_max_origin_bytes(),
            cache_max_age_secs: default_cache_max_age_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl ImageConfig {
    /// Build the variant table from this configuration.
    pub fn variant_spec(&self) -> VariantSpec {
        VariantSpec::new(self.variants.clone())
    }

    /// Get the fetch timeout as a Duration.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Validate image configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.variants.is_empty() {
            return Err("images.variants must configure at least one variant".to_string());
        }
        if let Some(width) = self.variants.get(&Variant::Original)
            && *width != 0
        {
            return Err(format!(
                "images.variants.original must be 0 (pass-through), got {width}"
            ));
        }
        if self.max_concurrent_downloads == 0 {
            return Err("images.max_concurrent_downloads cannot be 0".to_string());
        }
        if self.max_concurrent_downloads > MAX_CONCURRENT_DOWNLOADS {
            return Err(format!(
                "images.max_concurrent_downloads must be at most {MAX_CONCURRENT_DOWNLOADS}, got {}",
                self.max_concurrent_downloads
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err("images.fetch_timeout_secs cannot be 0".to_string());
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(format!(
                "images.jpeg_quality must be between 1 and 100, got {}",
                self.jpeg_quality
            ));
        }
        if self.max_origin_bytes == 0 {
            return Err("images.max_origin_bytes cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Image cache configuration.
    #[serde(default)]
    pub images: ImageConfig,
}

impl AppConfig {
    /// Validate every section, returning the first error.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.storage.validate()?;
        self.metadata.validate()?;
        self.images.validate()
    }
}
