use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

pub struct PutResult {
    pub etag: String,
}

pub struct BlobObject {
    pub data: Bytes,
    pub content_type: Option<String>,
    pub etag: String,
}

#[derive(Debug, Clone)]
pub struct BlobSummary {
    pub key: String,
    pub size: u64,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

/// Opaque byte objects keyed by string.
///
/// `get` returns `Ok(None)` for a missing key; `delete` is idempotent.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<PutResult>;
    async fn get(&self, key: &str) -> Result<Option<BlobObject>>;
    async fn head(&self, key: &str) -> Result<bool>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn list(&self) -> Result<Vec<BlobSummary>>;
}

pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

fn to_chrono(d: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(d.secs(), d.subsec_nanos())
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<PutResult> {
        let res = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await?;

        Ok(PutResult {
            etag: res.e_tag.unwrap_or_default(),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<BlobObject>> {
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        let output = match res {
            Ok(output) => output,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    return Ok(None);
                }
                return Err(anyhow::anyhow!(service_error));
            }
        };

        let content_type = output.content_type.clone();
        let etag = output.e_tag.clone().unwrap_or_default();
        let data = output.body.collect().await?.into_bytes();

        Ok(Some(BlobObject {
            data,
            content_type,
            etag,
        }))
    }

    async fn head(&self, key: &str) -> Result<bool> {
        let res = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match res {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow::anyhow!(service_error))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<BlobSummary>> {
        let mut objects = Vec::new();
        let mut continuation_token = None;

        loop {
            let res = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_continuation_token(continuation_token)
                .send()
                .await?;

            for object in res.contents.unwrap_or_default() {
                if let Some(key) = object.key {
                    objects.push(BlobSummary {
                        key,
                        size: object.size.unwrap_or(0).max(0) as u64,
                        uploaded_at: object.last_modified.as_ref().and_then(to_chrono),
                        etag: object.e_tag,
                    });
                }
            }

            if res.is_truncated.unwrap_or(false) {
                continuation_token = res.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(objects)
    }
}

struct StoredBlob {
    data: Bytes,
    content_type: String,
    etag: String,
    uploaded_at: DateTime<Utc>,
}

/// Process-local blob store, used for development mode and tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: DashMap<String, StoredBlob>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<PutResult> {
        let etag = format!("\"{}\"", uuid::Uuid::new_v4().simple());
        self.objects.insert(
            key.to_string(),
            StoredBlob {
                data,
                content_type: content_type.to_string(),
                etag: etag.clone(),
                uploaded_at: Utc::now(),
            },
        );
        Ok(PutResult { etag })
    }

    async fn get(&self, key: &str) -> Result<Option<BlobObject>> {
        Ok(self.objects.get(key).map(|blob| BlobObject {
            data: blob.data.clone(),
            content_type: Some(blob.content_type.clone()),
            etag: blob.etag.clone(),
        }))
    }

    async fn head(&self, key: &str) -> Result<bool> {
        Ok(self.objects.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.remove(key);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<BlobSummary>> {
        Ok(self
            .objects
            .iter()
            .map(|entry| BlobSummary {
                key: entry.key().clone(),
                size: entry.data.len() as u64,
                uploaded_at: Some(entry.uploaded_at),
                etag: Some(entry.etag.clone()),
            })
            .collect())
    }
}
