use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use file_transfer::services::error::TransferError;
use file_transfer::services::keys::{self, SHORT_ALIAS_LEN};
use file_transfer::services::kv::{MemoryMetadataStore, MetadataStore};
use file_transfer::services::storage::{
    BlobObject, BlobStore, BlobSummary, MemoryBlobStore, PutResult,
};
use file_transfer::services::transfer::{
    IngestRequest, LIST_METADATA_CONCURRENCY, ResolveOptions, TransferService,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration as StdDuration;
use tokio::sync::Notify;

const MAX_SIZE: u64 = 1024 * 1024;

struct Harness {
    service: TransferService,
    blobs: Arc<MemoryBlobStore>,
    kv: Arc<MemoryMetadataStore>,
}

fn harness() -> Harness {
    let blobs = Arc::new(MemoryBlobStore::new());
    let kv = Arc::new(MemoryMetadataStore::new());
    let service = TransferService::new(Some(blobs.clone()), Some(kv.clone()), MAX_SIZE);
    Harness { service, blobs, kv }
}

fn upload(data: &'static [u8], filename: &str, expires_in_hours: Option<i64>) -> IngestRequest {
    IngestRequest {
        data: Bytes::from_static(data),
        filename: filename.to_string(),
        content_type: None,
        expires_in_hours,
    }
}

const KEEP: ResolveOptions = ResolveOptions { one_time: false };
const ONE_TIME: ResolveOptions = ResolveOptions { one_time: true };

struct UnreachableMetadataStore;

#[async_trait]
impl MetadataStore for UnreachableMetadataStore {
    async fn get(&self, _name: &str) -> anyhow::Result<Option<String>> {
        Err(anyhow!("metadata store unreachable"))
    }

    async fn put(&self, _name: &str, _value: &str, _ttl: Option<u64>) -> anyhow::Result<()> {
        Err(anyhow!("metadata store unreachable"))
    }

    async fn delete(&self, _name: &str) -> anyhow::Result<()> {
        Err(anyhow!("metadata store unreachable"))
    }
}

struct FailingBlobStore;

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn put(&self, _key: &str, _data: Bytes, _ct: &str) -> anyhow::Result<PutResult> {
        Err(anyhow!("bucket unreachable"))
    }

    async fn get(&self, _key: &str) -> anyhow::Result<Option<BlobObject>> {
        Err(anyhow!("bucket unreachable"))
    }

    async fn head(&self, _key: &str) -> anyhow::Result<bool> {
        Err(anyhow!("bucket unreachable"))
    }

    async fn delete(&self, _key: &str) -> anyhow::Result<()> {
        Err(anyhow!("bucket unreachable"))
    }

    async fn list(&self) -> anyhow::Result<Vec<BlobSummary>> {
        Err(anyhow!("bucket unreachable"))
    }
}

#[tokio::test]
async fn test_ingest_then_resolve_roundtrip() {
    let h = harness();

    for (data, filename) in [
        (&b"hello"[..], "a.txt"),
        (&b"\x00\x01\x02binary"[..], "my data-file.bin"),
        (&b"{\"k\": 1}"[..], "config.json"),
    ] {
        let receipt = h.service.ingest(upload(data, filename, None)).await.unwrap();
        assert_eq!(receipt.size, data.len() as u64);

        let served = h.service.resolve(&receipt.key, KEEP).await.unwrap();
        assert_eq!(served.data.as_ref(), data);
        assert_eq!(served.filename, filename);
        assert!(!served.consumed);
    }
}

#[tokio::test]
async fn test_transfer_scenario_with_short_alias() {
    let h = harness();
    let before = Utc::now();

    let receipt = h
        .service
        .ingest(upload(b"hello", "a.txt", Some(1)))
        .await
        .unwrap();

    let parts: Vec<&str> = receipt.key.splitn(3, '-').collect();
    assert_eq!(parts.len(), 3);
    assert!(parts[0].parse::<i64>().is_ok());
    assert_eq!(parts[2], "a.txt");

    let short_key = receipt.short_key.clone().unwrap();
    assert_eq!(short_key.len(), SHORT_ALIAS_LEN);
    assert!(keys::looks_like_short_alias(&short_key));

    let expires_at = receipt.expires_at.unwrap();
    assert!(expires_at >= before + Duration::hours(1));
    assert!(expires_at <= Utc::now() + Duration::hours(1));

    let served = h.service.resolve(&short_key, ONE_TIME).await.unwrap();
    assert_eq!(served.data.as_ref(), b"hello");
    assert_eq!(served.filename, "a.txt");
    assert_eq!(served.content_type, "text/plain");
    assert!(served.consumed);

    let again = h.service.resolve(&short_key, ONE_TIME).await;
    assert!(matches!(again, Err(TransferError::NotFound(_))));
}

#[tokio::test]
async fn test_one_time_download_consumes_blob_and_metadata() {
    let h = harness();
    let receipt = h.service.ingest(upload(b"secret", "s.txt", None)).await.unwrap();

    h.service.resolve(&receipt.key, ONE_TIME).await.unwrap();

    assert!(h.blobs.is_empty());
    assert!(h.kv.is_empty());
    assert!(matches!(
        h.service.resolve(&receipt.key, ONE_TIME).await,
        Err(TransferError::NotFound(_))
    ));
    assert!(matches!(
        h.service.short_link_info(&receipt.short_key.unwrap()).await,
        Err(TransferError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_expired_record_is_gone_but_purgeable() {
    let h = harness();
    let receipt = h.service.ingest(upload(b"old", "old.txt", Some(2))).await.unwrap();

    h.service
        .metadata()
        .unwrap()
        .set_expiration(&receipt.key, Utc::now() - Duration::minutes(1))
        .await
        .unwrap();

    assert!(matches!(
        h.service.resolve(&receipt.key, KEEP).await,
        Err(TransferError::Gone(_))
    ));
    assert!(matches!(
        h.service.resolve(&receipt.key, ONE_TIME).await,
        Err(TransferError::Gone(_))
    ));
    assert!(h.blobs.head(&receipt.key).await.unwrap());
    assert!(h.service.list().await.unwrap().is_empty());

    h.service.purge(&receipt.key).await.unwrap();
    assert!(!h.blobs.head(&receipt.key).await.unwrap());
    assert!(h.kv.is_empty());
}

#[tokio::test]
async fn test_alias_follows_record_lifecycle() {
    let h = harness();
    let receipt = h.service.ingest(upload(b"data", "d.txt", None)).await.unwrap();
    let short_key = receipt.short_key.unwrap();
    let metadata = h.service.metadata().unwrap();

    assert_eq!(
        metadata.resolve_alias(&short_key).await.unwrap(),
        Some(receipt.key.clone())
    );

    h.service.purge(&receipt.key).await.unwrap();
    assert_eq!(metadata.resolve_alias(&short_key).await.unwrap(), None);
    assert!(metadata.read(&receipt.key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_purge_is_idempotent() {
    let h = harness();
    h.service.purge("never-existed").await.unwrap();

    let receipt = h.service.ingest(upload(b"x", "x.txt", None)).await.unwrap();
    h.service.purge(&receipt.key).await.unwrap();
    h.service.purge(&receipt.key).await.unwrap();
}

#[tokio::test]
async fn test_validation_rejects_without_writes() {
    let h = harness();

    for request in [
        upload(b"", "empty.txt", None),
        upload(b"hello", "", None),
        upload(b"hello", "a.txt", Some(0)),
        upload(b"hello", "a.txt", Some(-1)),
    ] {
        let result = h.service.ingest(request).await;
        assert!(matches!(result, Err(TransferError::Validation(_))));
    }

    assert!(h.blobs.is_empty());
    assert!(h.kv.is_empty());
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let service = TransferService::new(Some(blobs.clone()), None, 4);

    let result = service.ingest(upload(b"hello", "a.txt", None)).await;
    assert!(matches!(result, Err(TransferError::Validation(_))));
    assert!(blobs.is_empty());
}

#[tokio::test]
async fn test_downloads_are_counted() {
    let h = harness();
    let receipt = h.service.ingest(upload(b"count", "c.txt", None)).await.unwrap();

    h.service.resolve(&receipt.key, KEEP).await.unwrap();
    h.service.resolve(&receipt.key, KEEP).await.unwrap();
    let third_started = Utc::now();
    h.service.resolve(&receipt.key, KEEP).await.unwrap();

    let record = h
        .service
        .metadata()
        .unwrap()
        .read(&receipt.key)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.download_count, 3);
    assert!(record.last_accessed.unwrap() >= third_started);
}

#[tokio::test]
async fn test_missing_blob_store_fails_fast() {
    let service = TransferService::new(None, Some(Arc::new(MemoryMetadataStore::new())), MAX_SIZE);

    assert!(matches!(
        service.ingest(upload(b"hello", "a.txt", None)).await,
        Err(TransferError::StoreUnavailable(_))
    ));
    assert!(matches!(
        service.resolve("anything", KEEP).await,
        Err(TransferError::StoreUnavailable(_))
    ));
    assert!(matches!(
        service.purge("anything").await,
        Err(TransferError::StoreUnavailable(_))
    ));
    assert!(matches!(
        service.list().await,
        Err(TransferError::StoreUnavailable(_))
    ));
}

#[tokio::test]
async fn test_without_metadata_store_blobs_still_flow() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let service = TransferService::new(Some(blobs.clone()), None, MAX_SIZE);

    let receipt = service
        .ingest(upload(b"hello", "a.txt", Some(1)))
        .await
        .unwrap();
    assert!(receipt.short_key.is_none());
    assert!(receipt.expires_at.is_none());

    let served = service.resolve(&receipt.key, KEEP).await.unwrap();
    assert_eq!(served.filename, "a.txt");

    assert!(matches!(
        service.short_link_info("abcdEFGH").await,
        Err(TransferError::StoreUnavailable(_))
    ));
    assert!(matches!(
        service.create_short_link(&receipt.key, None).await,
        Err(TransferError::StoreUnavailable(_))
    ));

    service.resolve(&receipt.key, ONE_TIME).await.unwrap();
    assert!(blobs.is_empty());
}

#[tokio::test]
async fn test_unreachable_metadata_store_degrades() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let service = TransferService::new(
        Some(blobs.clone()),
        Some(Arc::new(UnreachableMetadataStore)),
        MAX_SIZE,
    );

    let receipt = service
        .ingest(upload(b"hello", "a.txt", Some(1)))
        .await
        .unwrap();
    assert!(receipt.short_key.is_none());
    assert!(blobs.head(&receipt.key).await.unwrap());

    let served = service.resolve(&receipt.key, KEEP).await.unwrap();
    assert_eq!(served.data.as_ref(), b"hello");

    let listing = service.list().await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].filename, "a.txt");

    assert!(matches!(
        service.short_link_info("abcdEFGH").await,
        Err(TransferError::Metadata(_))
    ));

    service.resolve(&receipt.key, ONE_TIME).await.unwrap();
    assert!(blobs.is_empty());
}

#[tokio::test]
async fn test_blob_failure_leaves_no_metadata() {
    let kv = Arc::new(MemoryMetadataStore::new());
    let service = TransferService::new(Some(Arc::new(FailingBlobStore)), Some(kv.clone()), MAX_SIZE);

    let result = service.ingest(upload(b"hello", "a.txt", None)).await;
    assert!(matches!(result, Err(TransferError::Blob(_))));
    assert!(kv.is_empty());
}

#[tokio::test]
async fn test_alias_shaped_primary_key_falls_through() {
    let h = harness();
    h.blobs
        .put("abcdEFGH", Bytes::from_static(b"raw"), "text/plain")
        .await
        .unwrap();

    let served = h.service.resolve("abcdEFGH", KEEP).await.unwrap();
    assert_eq!(served.data.as_ref(), b"raw");
    assert_eq!(served.filename, "abcdEFGH");
}

#[tokio::test]
async fn test_blob_without_metadata_uses_key_filename() {
    let h = harness();
    h.blobs
        .put(
            "1700000000000-k3j2h1g0-report-v2.pdf",
            Bytes::from_static(b"%PDF-1.4"),
            "application/pdf",
        )
        .await
        .unwrap();

    let served = h
        .service
        .resolve("1700000000000-k3j2h1g0-report-v2.pdf", KEEP)
        .await
        .unwrap();
    assert_eq!(served.filename, "report-v2.pdf");
    assert_eq!(served.content_type, "application/pdf");
}

#[tokio::test]
async fn test_list_enriches_from_metadata() {
    let h = harness();
    let kept = h.service.ingest(upload(b"one", "one.txt", None)).await.unwrap();
    let expired = h.service.ingest(upload(b"two", "two.txt", Some(1))).await.unwrap();
    h.blobs
        .put("1700000000000-k3j2h1g0-bare.txt", Bytes::from_static(b"3"), "text/plain")
        .await
        .unwrap();

    h.service.resolve(&kept.key, KEEP).await.unwrap();
    h.service
        .metadata()
        .unwrap()
        .set_expiration(&expired.key, Utc::now() - Duration::seconds(1))
        .await
        .unwrap();

    let mut listing = h.service.list().await.unwrap();
    listing.sort_by(|a, b| a.filename.cmp(&b.filename));
    assert_eq!(listing.len(), 2);

    assert_eq!(listing[0].filename, "bare.txt");
    assert_eq!(listing[0].download_count, 0);
    assert!(listing[0].short_key.is_none());

    assert_eq!(listing[1].key, kept.key);
    assert_eq!(listing[1].filename, "one.txt");
    assert_eq!(listing[1].download_count, 1);
    assert_eq!(listing[1].short_key, kept.short_key);
}

#[tokio::test]
async fn test_short_link_info_and_relink() {
    let h = harness();
    let receipt = h.service.ingest(upload(b"hello", "a.txt", None)).await.unwrap();
    let first_alias = receipt.short_key.unwrap();

    let info = h.service.short_link_info(&first_alias).await.unwrap();
    assert_eq!(info.key, receipt.key);
    assert_eq!(info.filename, "a.txt");
    assert_eq!(info.size, 5);
    assert_eq!(info.download_url, format!("/private/download/{}", first_alias));

    let link = h
        .service
        .create_short_link(&receipt.key, Some(3))
        .await
        .unwrap();
    assert_ne!(link.short_key, first_alias);
    assert!(link.expires_at.is_some());

    assert!(matches!(
        h.service.short_link_info(&first_alias).await,
        Err(TransferError::NotFound(_))
    ));
    let info = h.service.short_link_info(&link.short_key).await.unwrap();
    assert_eq!(info.expires_at, link.expires_at);

    assert!(matches!(
        h.service.create_short_link("missing-key", None).await,
        Err(TransferError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_short_link_info_for_expired_file() {
    let h = harness();
    let receipt = h.service.ingest(upload(b"hello", "a.txt", Some(1))).await.unwrap();
    h.service
        .metadata()
        .unwrap()
        .set_expiration(&receipt.key, Utc::now() - Duration::seconds(1))
        .await
        .unwrap();

    assert!(matches!(
        h.service.short_link_info(&receipt.short_key.unwrap()).await,
        Err(TransferError::Gone(_))
    ));
}

/// Accepts records but refuses every alias write.
struct AliasRejectingStore {
    inner: MemoryMetadataStore,
}

#[async_trait]
impl MetadataStore for AliasRejectingStore {
    async fn get(&self, name: &str) -> anyhow::Result<Option<String>> {
        self.inner.get(name).await
    }

    async fn put(&self, name: &str, value: &str, ttl: Option<u64>) -> anyhow::Result<()> {
        if name.starts_with("short:") {
            return Err(anyhow!("alias index unavailable"));
        }
        self.inner.put(name, value, ttl).await
    }

    async fn delete(&self, name: &str) -> anyhow::Result<()> {
        self.inner.delete(name).await
    }
}

#[tokio::test]
async fn test_partial_metadata_write_is_reflected_in_receipt() {
    let service = TransferService::new(
        Some(Arc::new(MemoryBlobStore::new())),
        Some(Arc::new(AliasRejectingStore {
            inner: MemoryMetadataStore::new(),
        })),
        MAX_SIZE,
    );

    let receipt = service
        .ingest(upload(b"hello", "a.txt", Some(1)))
        .await
        .unwrap();
    let stored = service
        .metadata()
        .unwrap()
        .read(&receipt.key)
        .await
        .unwrap()
        .unwrap();

    assert!(receipt.short_key.is_none());
    assert!(stored.short_key.is_none());
    assert!(stored.expires_at.is_some());
    assert_eq!(receipt.expires_at, stored.expires_at);
}

/// Serves and stores normally but cannot delete.
struct UndeletableBlobStore {
    inner: MemoryBlobStore,
}

#[async_trait]
impl BlobStore for UndeletableBlobStore {
    async fn put(&self, key: &str, data: Bytes, ct: &str) -> anyhow::Result<PutResult> {
        self.inner.put(key, data, ct).await
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<BlobObject>> {
        self.inner.get(key).await
    }

    async fn head(&self, key: &str) -> anyhow::Result<bool> {
        self.inner.head(key).await
    }

    async fn delete(&self, _key: &str) -> anyhow::Result<()> {
        Err(anyhow!("delete denied"))
    }

    async fn list(&self) -> anyhow::Result<Vec<BlobSummary>> {
        self.inner.list().await
    }
}

#[tokio::test]
async fn test_failed_blob_delete_keeps_metadata() {
    let blobs = Arc::new(UndeletableBlobStore {
        inner: MemoryBlobStore::new(),
    });
    let service = TransferService::new(
        Some(blobs.clone()),
        Some(Arc::new(MemoryMetadataStore::new())),
        MAX_SIZE,
    );

    let receipt = service
        .ingest(upload(b"hello", "a.txt", None))
        .await
        .unwrap();
    let alias = receipt.short_key.clone().unwrap();

    let result = service.resolve(&alias, ONE_TIME).await;
    assert!(matches!(result, Err(TransferError::Blob(_))));

    let metadata = service.metadata().unwrap();
    assert!(metadata.read(&receipt.key).await.unwrap().is_some());
    assert_eq!(
        metadata.resolve_alias(&alias).await.unwrap().as_deref(),
        Some(receipt.key.as_str())
    );
    assert!(blobs.head(&receipt.key).await.unwrap());

    let served = service.resolve(&alias, KEEP).await.unwrap();
    assert_eq!(served.data.as_ref(), b"hello");
}

/// Signals when a delete starts, then takes a while to finish it.
struct SlowDeleteBlobStore {
    inner: MemoryBlobStore,
    delete_started: Notify,
}

#[async_trait]
impl BlobStore for SlowDeleteBlobStore {
    async fn put(&self, key: &str, data: Bytes, ct: &str) -> anyhow::Result<PutResult> {
        self.inner.put(key, data, ct).await
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<BlobObject>> {
        self.inner.get(key).await
    }

    async fn head(&self, key: &str) -> anyhow::Result<bool> {
        self.inner.head(key).await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.delete_started.notify_one();
        tokio::time::sleep(StdDuration::from_millis(200)).await;
        self.inner.delete(key).await
    }

    async fn list(&self) -> anyhow::Result<Vec<BlobSummary>> {
        self.inner.list().await
    }
}

#[tokio::test]
async fn test_dropped_download_still_purges_metadata() {
    let blobs = Arc::new(SlowDeleteBlobStore {
        inner: MemoryBlobStore::new(),
        delete_started: Notify::new(),
    });
    let kv = Arc::new(MemoryMetadataStore::new());
    let service = TransferService::new(Some(blobs.clone()), Some(kv.clone()), MAX_SIZE);

    let receipt = service
        .ingest(upload(b"hello", "a.txt", Some(1)))
        .await
        .unwrap();
    assert!(!kv.is_empty());

    let download = {
        let service = service.clone();
        let key = receipt.key.clone();
        tokio::spawn(async move { service.resolve(&key, ONE_TIME).await })
    };

    blobs.delete_started.notified().await;
    download.abort();
    match download.await {
        Err(e) => assert!(e.is_cancelled()),
        Ok(_) => panic!("download finished before it was aborted"),
    }

    tokio::time::sleep(StdDuration::from_millis(500)).await;

    assert!(blobs.inner.is_empty());
    assert!(kv.is_empty());
}

/// Tracks the highest number of concurrent reads.
struct ConcurrencyTrackingStore {
    inner: MemoryMetadataStore,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl MetadataStore for ConcurrencyTrackingStore {
    async fn get(&self, name: &str) -> anyhow::Result<Option<String>> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(StdDuration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.inner.get(name).await
    }

    async fn put(&self, name: &str, value: &str, ttl: Option<u64>) -> anyhow::Result<()> {
        self.inner.put(name, value, ttl).await
    }

    async fn delete(&self, name: &str) -> anyhow::Result<()> {
        self.inner.delete(name).await
    }
}

#[tokio::test]
async fn test_list_bounds_metadata_reads() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let kv = Arc::new(ConcurrencyTrackingStore {
        inner: MemoryMetadataStore::new(),
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let service = TransferService::new(Some(blobs.clone()), Some(kv.clone()), MAX_SIZE);

    for i in 0..(LIST_METADATA_CONCURRENCY * 3) {
        blobs
            .put(
                &format!("1700000000000-k3j2h1g0-file{i}.txt"),
                Bytes::from_static(b"x"),
                "text/plain",
            )
            .await
            .unwrap();
    }

    let listing = service.list().await.unwrap();
    assert_eq!(listing.len(), LIST_METADATA_CONCURRENCY * 3);

    let peak = kv.peak.load(Ordering::SeqCst);
    assert!(peak >= 1);
    assert!(peak <= LIST_METADATA_CONCURRENCY);
}

#[tokio::test]
async fn test_unrepresentable_expiration_is_rejected() {
    let h = harness();

    let result = h
        .service
        .ingest(upload(b"hello", "a.txt", Some(i64::MAX)))
        .await;
    assert!(matches!(result, Err(TransferError::Validation(_))));
    assert!(h.blobs.is_empty());
    assert!(h.kv.is_empty());
}
