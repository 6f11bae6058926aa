use crate::entities::{kv_entries, prelude::*};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, DatabaseConnection, EntityTrait};

/// String records with optional per-entry expiry.
///
/// No listing: files are enumerated through the blob store.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<String>>;
    async fn put(&self, name: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()>;
    async fn delete(&self, name: &str) -> Result<()>;
}

fn expiry_from_ttl(ttl_seconds: Option<u64>) -> Option<DateTime<Utc>> {
    ttl_seconds.map(|ttl| {
        Duration::try_seconds(i64::try_from(ttl).unwrap_or(i64::MAX))
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    })
}

fn is_live(expires_at: Option<DateTime<Utc>>) -> bool {
    expires_at.is_none_or(|at| at > Utc::now())
}

/// Metadata store backed by a single `kv_entries` table.
pub struct SqlMetadataStore {
    db: DatabaseConnection,
}

impl SqlMetadataStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MetadataStore for SqlMetadataStore {
    async fn get(&self, name: &str) -> Result<Option<String>> {
        let Some(entry) = KvEntries::find_by_id(name).one(&self.db).await? else {
            return Ok(None);
        };

        if is_live(entry.expires_at) {
            return Ok(Some(entry.value));
        }

        // Expired rows are reclaimed on read.
        if let Err(e) = KvEntries::delete_by_id(name).exec(&self.db).await {
            tracing::debug!("Failed to reclaim expired entry {}: {}", name, e);
        }
        Ok(None)
    }

    async fn put(&self, name: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        let entry = kv_entries::ActiveModel {
            name: Set(name.to_string()),
            value: Set(value.to_string()),
            expires_at: Set(expiry_from_ttl(ttl_seconds)),
        };

        KvEntries::insert(entry)
            .on_conflict(
                OnConflict::column(kv_entries::Column::Name)
                    .update_columns([kv_entries::Column::Value, kv_entries::Column::ExpiresAt])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        KvEntries::delete_by_id(name).exec(&self.db).await?;
        Ok(())
    }
}

/// Process-local metadata store, used for development mode and tests.
#[derive(Default)]
pub struct MemoryMetadataStore {
    entries: DashMap<String, (String, Option<DateTime<Utc>>)>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physically present entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .get(name)
            .filter(|entry| is_live(entry.1))
            .map(|entry| entry.0.clone()))
    }

    async fn put(&self, name: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        self.entries.insert(
            name.to_string(),
            (value.to_string(), expiry_from_ttl(ttl_seconds)),
        );
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.entries.remove(name);
        Ok(())
    }
}
