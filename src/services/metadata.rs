use crate::services::expiration;
use crate::services::keys;
use crate::services::kv::MetadataStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

const RECORD_PREFIX: &str = "file:";
const ALIAS_PREFIX: &str = "short:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub key: String,
    pub filename: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub download_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_key: Option<String>,
}

pub struct NewFileRecord<'a> {
    pub key: &'a str,
    pub filename: &'a str,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub short_key: Option<&'a str>,
}

fn record_name(key: &str) -> String {
    format!("{RECORD_PREFIX}{key}")
}

fn alias_name(short_key: &str) -> String {
    format!("{ALIAS_PREFIX}{short_key}")
}

/// Owns the record schema and the `short:` alias index on top of a
/// [`MetadataStore`].
///
/// Every mutation is a plain read-modify-write; concurrent writers to the
/// same key are last-write-wins.
#[derive(Clone)]
pub struct MetadataManager {
    store: Arc<dyn MetadataStore>,
}

impl MetadataManager {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    async fn write(&self, record: &FileRecord) -> Result<()> {
        let value = serde_json::to_string(record)?;
        self.store.put(&record_name(&record.key), &value, None).await
    }

    /// Writes the record, then the alias, then the record again with the
    /// alias embedded. The record stays the source of truth if a later step
    /// fails.
    pub async fn create(&self, new: NewFileRecord<'_>) -> Result<FileRecord> {
        let mut record = FileRecord {
            key: new.key.to_string(),
            filename: new.filename.to_string(),
            size: new.size,
            uploaded_at: new.uploaded_at,
            expires_at: new.expires_at,
            download_count: 0,
            last_accessed: None,
            short_key: None,
        };
        self.write(&record).await?;

        if let Some(short_key) = new.short_key {
            self.write_alias(short_key, &record.key, record.expires_at)
                .await?;
            record.short_key = Some(short_key.to_string());
            self.write(&record).await?;
        }

        Ok(record)
    }

    async fn write_alias(
        &self,
        short_key: &str,
        key: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let ttl = expiration::ttl_seconds(expires_at, Utc::now());
        self.store.put(&alias_name(short_key), key, ttl).await
    }

    pub async fn read(&self, key: &str) -> Result<Option<FileRecord>> {
        let Some(raw) = self.store.get(&record_name(key)).await? else {
            return Ok(None);
        };
        let record = serde_json::from_str(&raw)
            .with_context(|| format!("Corrupt metadata record for {}", key))?;
        Ok(Some(record))
    }

    pub async fn resolve_alias(&self, short_key: &str) -> Result<Option<String>> {
        self.store.get(&alias_name(short_key)).await
    }

    /// Missing records are ignored: accounting must never block serving.
    pub async fn record_download(&self, key: &str) -> Result<()> {
        if let Some(mut record) = self.read(key).await? {
            record.download_count += 1;
            record.last_accessed = Some(Utc::now());
            self.write(&record).await?;
        }
        Ok(())
    }

    /// Updates `expiresAt` and re-issues the alias (if any) so its TTL
    /// keeps mirroring the record.
    pub async fn set_expiration(&self, key: &str, expires_at: DateTime<Utc>) -> Result<()> {
        if let Some(mut record) = self.read(key).await? {
            record.expires_at = Some(expires_at);
            self.write(&record).await?;
            if let Some(short_key) = &record.short_key {
                self.write_alias(short_key, key, record.expires_at).await?;
            }
        }
        Ok(())
    }

    /// Replaces the record's alias with a fresh one so at most one alias is
    /// ever live for a record. Returns `None` if the record does not exist.
    pub async fn replace_alias(&self, key: &str) -> Result<Option<String>> {
        let Some(mut record) = self.read(key).await? else {
            return Ok(None);
        };

        if let Some(previous) = record.short_key.take() {
            self.remove_alias(&previous).await?;
        }

        let short_key = keys::generate_short_alias();
        self.write_alias(&short_key, key, record.expires_at).await?;
        record.short_key = Some(short_key.clone());
        self.write(&record).await?;

        Ok(Some(short_key))
    }

    pub async fn remove_alias(&self, short_key: &str) -> Result<()> {
        self.store.delete(&alias_name(short_key)).await
    }

    /// Removes the record and the alias it carries. Either may already be
    /// gone.
    pub async fn purge(&self, key: &str) -> Result<()> {
        let record = self.read(key).await.unwrap_or_else(|e| {
            tracing::warn!("Purging {} without reading its record: {:#}", key, e);
            None
        });

        self.store.delete(&record_name(key)).await?;
        if let Some(short_key) = record.and_then(|r| r.short_key) {
            self.remove_alias(&short_key).await?;
        }
        Ok(())
    }

    pub fn is_expired(&self, record: &FileRecord) -> bool {
        expiration::is_expired(record)
    }
}
