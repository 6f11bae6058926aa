use crate::config::{StorageBackend, TransferConfig};
use crate::services::storage::{BlobStore, MemoryBlobStore, S3BlobStore};
use aws_sdk_s3::config::Region;
use std::sync::Arc;
use tracing::{info, warn};

/// Builds the blob store. Returns `None` when S3 settings are incomplete so
/// the service can still start and report the store as unavailable.
pub async fn setup_blob_store(config: &TransferConfig) -> Option<Arc<dyn BlobStore>> {
    if config.storage_backend == StorageBackend::Memory {
        info!("🧠 Blob store: in-memory");
        return Some(Arc::new(MemoryBlobStore::new()));
    }

    let (Some(endpoint_url), Some(bucket)) = (&config.s3_endpoint, &config.s3_bucket) else {
        warn!("⚠️ MINIO_ENDPOINT/MINIO_BUCKET not set, blob store unavailable");
        return None;
    };

    info!("☁️  S3 Storage: {} (Bucket: {})", endpoint_url, bucket);

    let mut loader = aws_config::from_env()
        .endpoint_url(endpoint_url)
        .region(Region::new(config.s3_region.clone()));

    if let (Some(access_key), Some(secret_key)) = (&config.s3_access_key, &config.s3_secret_key) {
        loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
            access_key.clone(),
            secret_key.clone(),
            None,
            None,
            "static",
        ));
    }

    let aws_config = loader.load().await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    // Ensure bucket exists
    match s3_client.head_bucket().bucket(bucket).send().await {
        Ok(_) => info!("✅ Bucket '{}' is ready", bucket),
        Err(_) => {
            info!("🪣 Bucket '{}' not found, creating...", bucket);
            if let Err(e) = s3_client.create_bucket().bucket(bucket).send().await {
                tracing::error!("❌ Failed to create bucket '{}': {}", bucket, e);
            } else {
                info!("✅ Bucket '{}' created successfully", bucket);
            }
        }
    }

    Some(Arc::new(S3BlobStore::new(s3_client, bucket.clone())))
}
