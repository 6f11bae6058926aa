use crate::utils::validation::{DEFAULT_MAX_FILE_SIZE, LEGACY_MAX_FILE_SIZE};
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataBackend {
    Sql,
    Memory,
    None,
}

impl StorageBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "s3" | "minio" => Some(Self::S3),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

impl MetadataBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "sql" | "sqlite" | "postgres" => Some(Self::Sql),
            "memory" => Some(Self::Memory),
            "none" | "off" => Some(Self::None),
            _ => None,
        }
    }
}

/// Transfer service configuration
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Maximum upload size in bytes (default: 100 MiB)
    pub max_file_size: u64,

    /// Download route deletes on read unless the caller opts out (default: true)
    pub one_time_downloads: bool,

    /// Blob store backend: "s3" or "memory" (default: "s3")
    pub storage_backend: StorageBackend,

    /// S3/MinIO endpoint; the blob store stays unconfigured without it
    pub s3_endpoint: Option<String>,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    pub s3_bucket: Option<String>,
    /// S3 region (default: "us-east-1")
    pub s3_region: String,

    /// Metadata store backend: "sql", "memory" or "none" (default: "sql")
    pub metadata_backend: MetadataBackend,

    /// Connection string for the SQL metadata store
    pub metadata_database_url: String,

    /// Allowed CORS origins (comma separated, empty allows any)
    pub allowed_origins: Vec<String>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            one_time_downloads: true,
            storage_backend: StorageBackend::S3,
            s3_endpoint: None,
            s3_access_key: None,
            s3_secret_key: None,
            s3_bucket: None,
            s3_region: "us-east-1".to_string(),
            metadata_backend: MetadataBackend::Sql,
            metadata_database_url: "sqlite://transfer-metadata.db?mode=rwc".to_string(),
            allowed_origins: Vec::new(),
        }
    }
}

impl TransferConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            one_time_downloads: env::var("ONE_TIME_DOWNLOADS")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(default.one_time_downloads),

            storage_backend: env::var("STORAGE_BACKEND")
                .ok()
                .and_then(|v| StorageBackend::parse(&v))
                .unwrap_or(default.storage_backend),

            s3_endpoint: env::var("MINIO_ENDPOINT").ok(),
            s3_access_key: env::var("MINIO_ACCESS_KEY").ok(),
            s3_secret_key: env::var("MINIO_SECRET_KEY").ok(),
            s3_bucket: env::var("MINIO_BUCKET").ok(),
            s3_region: env::var("MINIO_REGION").unwrap_or(default.s3_region),

            metadata_backend: env::var("METADATA_BACKEND")
                .ok()
                .and_then(|v| MetadataBackend::parse(&v))
                .unwrap_or(default.metadata_backend),

            metadata_database_url: env::var("METADATA_DATABASE_URL")
                .unwrap_or(default.metadata_database_url),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Create config for development (in-memory stores)
    pub fn development() -> Self {
        Self {
            storage_backend: StorageBackend::Memory,
            metadata_backend: MetadataBackend::Memory,
            ..Self::default()
        }
    }

    /// Create config matching the older upload path (10 MiB limit)
    pub fn legacy() -> Self {
        Self {
            max_file_size: LEGACY_MAX_FILE_SIZE,
            ..Self::default()
        }
    }
}
