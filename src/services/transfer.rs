use crate::services::error::TransferError;
use crate::services::expiration;
use crate::services::keys;
use crate::services::kv::MetadataStore;
use crate::services::metadata::{FileRecord, MetadataManager, NewFileRecord};
use crate::services::storage::{BlobStore, BlobSummary};
use crate::utils::{content_type, validation};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;

/// Metadata reads in flight while enriching a listing.
pub const LIST_METADATA_CONCURRENCY: usize = 16;

pub struct IngestRequest {
    pub data: Bytes,
    pub filename: String,
    pub content_type: Option<String>,
    pub expires_in_hours: Option<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestReceipt {
    pub key: String,
    pub short_key: Option<String>,
    pub filename: String,
    pub size: u64,
    pub content_type: String,
    pub uploaded_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub etag: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// Delete the blob and its metadata once the body has been read.
    pub one_time: bool,
}

pub struct ServedFile {
    pub key: String,
    pub data: Bytes,
    pub filename: String,
    pub content_type: String,
    pub etag: String,
    pub consumed: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileListing {
    pub key: String,
    pub filename: String,
    pub size: u64,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub download_count: u64,
    pub short_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShortLinkInfo {
    pub key: String,
    pub short_key: String,
    pub filename: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub download_count: u64,
    pub download_url: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShortLink {
    pub key: String,
    pub short_key: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Composes the blob store and the metadata manager into the upload,
/// download and delete lifecycle.
///
/// The blob store is required for every file operation; the metadata store
/// is an optional accelerant and its failures only degrade responses,
/// except for lookups that are purely about metadata.
///
/// Concurrent one-time downloads of the same key may both succeed, and
/// concurrent downloads may lose count increments: neither store offers a
/// conditional write.
#[derive(Clone)]
pub struct TransferService {
    blobs: Option<Arc<dyn BlobStore>>,
    metadata: Option<MetadataManager>,
    max_file_size: u64,
}

impl TransferService {
    pub fn new(
        blobs: Option<Arc<dyn BlobStore>>,
        metadata: Option<Arc<dyn MetadataStore>>,
        max_file_size: u64,
    ) -> Self {
        Self {
            blobs,
            metadata: metadata.map(MetadataManager::new),
            max_file_size,
        }
    }

    pub fn has_blob_store(&self) -> bool {
        self.blobs.is_some()
    }

    pub fn metadata(&self) -> Option<&MetadataManager> {
        self.metadata.as_ref()
    }

    fn blob_store(&self) -> Result<&Arc<dyn BlobStore>, TransferError> {
        self.blobs
            .as_ref()
            .ok_or(TransferError::StoreUnavailable("Blob"))
    }

    fn metadata_store(&self) -> Result<&MetadataManager, TransferError> {
        self.metadata
            .as_ref()
            .ok_or(TransferError::StoreUnavailable("Metadata"))
    }

    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReceipt, TransferError> {
        let blobs = self.blob_store()?;

        let size = request.data.len() as u64;
        validation::validate_upload(&request.filename, size, self.max_file_size)?;
        validation::validate_expiration_hours(request.expires_in_hours)?;

        let key = keys::generate_primary_key(&request.filename);
        let content_type = content_type::resolve(
            request.content_type.as_deref(),
            &request.filename,
            &request.data,
        );

        let put = blobs
            .put(&key, request.data, &content_type)
            .await
            .map_err(TransferError::Blob)?;

        let uploaded_at = Utc::now();
        let mut expires_at =
            expiration::expires_at_from_hours(uploaded_at, request.expires_in_hours);

        let mut short_key = None;
        match &self.metadata {
            Some(metadata) => {
                let alias = keys::generate_short_alias();
                let created = metadata
                    .create(NewFileRecord {
                        key: &key,
                        filename: &request.filename,
                        size,
                        uploaded_at,
                        expires_at,
                        short_key: Some(&alias),
                    })
                    .await;

                match created {
                    Ok(_) => short_key = Some(alias),
                    Err(e) => {
                        warn!("⚠️ Metadata for {} incomplete: {:#}", key, e);
                        // A partial write may have left the record behind.
                        let stored = self.read_best_effort(&key).await;
                        expires_at = stored.as_ref().and_then(|r| r.expires_at);
                        short_key = stored.and_then(|r| r.short_key);
                    }
                }
            }
            None => expires_at = None,
        }

        info!(
            "📦 Ingested {} ({} bytes, short_key={:?}, expires_at={:?})",
            key, size, short_key, expires_at
        );

        Ok(IngestReceipt {
            key,
            short_key,
            filename: request.filename,
            size,
            content_type,
            uploaded_at,
            expires_at,
            etag: put.etag,
        })
    }

    /// Maps a short alias onto its primary key. Anything that is not a live
    /// alias is treated as a primary key.
    async fn resolve_identifier(&self, identifier: &str) -> (String, Option<String>) {
        if let Some(metadata) = &self.metadata {
            if keys::looks_like_short_alias(identifier) {
                match metadata.resolve_alias(identifier).await {
                    Ok(Some(key)) => return (key, Some(identifier.to_string())),
                    Ok(None) => {}
                    Err(e) => warn!("Alias lookup for {} failed: {:#}", identifier, e),
                }
            }
        }
        (identifier.to_string(), None)
    }

    async fn read_best_effort(&self, key: &str) -> Option<FileRecord> {
        let metadata = self.metadata.as_ref()?;
        metadata.read(key).await.unwrap_or_else(|e| {
            warn!("Serving {} without metadata: {:#}", key, e);
            None
        })
    }

    pub async fn resolve(
        &self,
        identifier: &str,
        options: ResolveOptions,
    ) -> Result<ServedFile, TransferError> {
        let blobs = self.blob_store()?;

        let (key, alias) = self.resolve_identifier(identifier).await;
        let record = self.read_best_effort(&key).await;

        if record.as_ref().is_some_and(expiration::is_expired) {
            return Err(TransferError::Gone("File has expired".to_string()));
        }

        let object = blobs
            .get(&key)
            .await
            .map_err(TransferError::Blob)?
            .ok_or_else(|| TransferError::not_found("File not found"))?;

        let filename = match &record {
            Some(record) => record.filename.clone(),
            None => keys::extract_original_filename(&key).to_string(),
        };
        let content_type =
            content_type::resolve(object.content_type.as_deref(), &filename, &object.data);

        if options.one_time {
            self.delete_everywhere(blobs.clone(), key.clone(), alias)
                .await?;
            info!("🔥 One-time download consumed {}", key);
        } else if record.is_some() {
            if let Some(metadata) = &self.metadata {
                if let Err(e) = metadata.record_download(&key).await {
                    warn!("Failed to record download of {}: {:#}", key, e);
                }
            }
        }

        Ok(ServedFile {
            key,
            data: object.data,
            filename,
            content_type,
            etag: object.etag,
            consumed: options.one_time,
        })
    }

    /// Deletes the blob and then its metadata. Runs on its own task so a
    /// dropped caller cannot stop the metadata purge once the blob delete
    /// has been issued.
    async fn delete_everywhere(
        &self,
        blobs: Arc<dyn BlobStore>,
        key: String,
        alias: Option<String>,
    ) -> Result<(), TransferError> {
        let metadata = self.metadata.clone();

        let task = tokio::spawn(async move {
            blobs.delete(&key).await.map_err(TransferError::Blob)?;

            if let Some(metadata) = metadata {
                if let Err(e) = metadata.purge(&key).await {
                    warn!("Failed to purge metadata for {}: {:#}", key, e);
                }
                if let Some(alias) = alias {
                    if let Err(e) = metadata.remove_alias(&alias).await {
                        warn!("Failed to remove alias {}: {:#}", alias, e);
                    }
                }
            }
            Ok::<(), TransferError>(())
        });

        task.await
            .map_err(|e| TransferError::Blob(anyhow::anyhow!("Delete task failed: {}", e)))?
    }

    /// Deletes regardless of expiry; succeeds when nothing was there.
    pub async fn purge(&self, key: &str) -> Result<(), TransferError> {
        let blobs = self.blob_store()?;
        self.delete_everywhere(blobs.clone(), key.to_string(), None)
            .await?;
        info!("🗑️ Purged {}", key);
        Ok(())
    }

    async fn enrich(&self, object: BlobSummary) -> Option<FileListing> {
        let record = self.read_best_effort(&object.key).await;

        if record.as_ref().is_some_and(expiration::is_expired) {
            return None;
        }

        let filename = match &record {
            Some(record) => record.filename.clone(),
            None => keys::extract_original_filename(&object.key).to_string(),
        };

        Some(FileListing {
            filename,
            size: object.size,
            uploaded_at: record.as_ref().map(|r| r.uploaded_at).or(object.uploaded_at),
            etag: object.etag,
            expires_at: record.as_ref().and_then(|r| r.expires_at),
            download_count: record.as_ref().map_or(0, |r| r.download_count),
            short_key: record.and_then(|r| r.short_key),
            key: object.key,
        })
    }

    /// Blob-store driven; metadata only decorates entries and hides expired
    /// ones.
    pub async fn list(&self) -> Result<Vec<FileListing>, TransferError> {
        let blobs = self.blob_store()?;
        let objects = blobs.list().await.map_err(TransferError::Blob)?;

        let listings: Vec<Option<FileListing>> = stream::iter(objects)
            .map(|object| self.enrich(object))
            .buffered(LIST_METADATA_CONCURRENCY)
            .collect()
            .await;

        Ok(listings.into_iter().flatten().collect())
    }

    pub async fn short_link_info(&self, short_key: &str) -> Result<ShortLinkInfo, TransferError> {
        let metadata = self.metadata_store()?;

        let key = metadata
            .resolve_alias(short_key)
            .await
            .map_err(TransferError::Metadata)?
            .ok_or_else(|| TransferError::not_found("Short link not found"))?;

        let record = metadata
            .read(&key)
            .await
            .map_err(TransferError::Metadata)?
            .ok_or_else(|| TransferError::not_found("File metadata not found"))?;

        if metadata.is_expired(&record) {
            return Err(TransferError::Gone("File has expired".to_string()));
        }

        Ok(ShortLinkInfo {
            key,
            short_key: short_key.to_string(),
            filename: record.filename,
            size: record.size,
            uploaded_at: record.uploaded_at,
            expires_at: record.expires_at,
            download_count: record.download_count,
            download_url: format!("/private/download/{}", short_key),
        })
    }

    /// Issues a fresh alias for an existing record, retiring the previous
    /// one. `expires_in_hours` also moves the record's expiry.
    pub async fn create_short_link(
        &self,
        key: &str,
        expires_in_hours: Option<i64>,
    ) -> Result<ShortLink, TransferError> {
        let metadata = self.metadata_store()?;
        validation::validate_expiration_hours(expires_in_hours)?;

        let record = metadata
            .read(key)
            .await
            .map_err(TransferError::Metadata)?
            .ok_or_else(|| TransferError::not_found("File metadata not found"))?;

        if metadata.is_expired(&record) {
            return Err(TransferError::Gone("File has expired".to_string()));
        }

        let mut expires_at = record.expires_at;
        if let Some(at) = expiration::expires_at_from_hours(Utc::now(), expires_in_hours) {
            metadata
                .set_expiration(key, at)
                .await
                .map_err(TransferError::Metadata)?;
            expires_at = Some(at);
        }

        let short_key = metadata
            .replace_alias(key)
            .await
            .map_err(TransferError::Metadata)?
            .ok_or_else(|| TransferError::not_found("File metadata not found"))?;

        info!("🔗 New short link {} for {}", short_key, key);

        Ok(ShortLink {
            key: key.to_string(),
            short_key,
            expires_at,
        })
    }
}
