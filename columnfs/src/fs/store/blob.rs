use super::{backend_error, decode_row, encode_row};
use crate::backend::{ColumnStore, WriteStamp, scan_prefix};
use crate::fs::errors::{FsError, ensure};
use crate::fs::key_codec::KeyCodec;
use crate::fs::metrics::FileSystemStats;
use crate::fs::types::Timestamp;
use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

const CHUNK_READ_PAGE_SIZE: usize = 10;
const MIN_TTL: Duration = Duration::from_secs(1);

/// The `blob_meta` row: which chunk generation is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMeta {
    pub version: Uuid,
    pub chunk_count: u16,
}

/// Large payloads split into write-once chunks under a fresh version per
/// rewrite. Superseded generations are never deleted directly: they are
/// rewritten with a short expiry and left for the store to reclaim.
#[derive(Clone)]
pub struct BlobStore {
    store: Arc<dyn ColumnStore>,
    chunk_size: usize,
    max_blob_size: usize,
    obsolete_ttl: Duration,
    stats: Arc<FileSystemStats>,
}

impl BlobStore {
    pub fn new(
        store: Arc<dyn ColumnStore>,
        chunk_size: usize,
        max_chunks_per_blob: u32,
        obsolete_ttl: Duration,
        stats: Arc<FileSystemStats>,
    ) -> Self {
        Self {
            store,
            chunk_size,
            max_blob_size: chunk_size.saturating_mul(max_chunks_per_blob as usize),
            obsolete_ttl,
            stats,
        }
    }

    pub fn max_blob_size(&self) -> usize {
        self.max_blob_size
    }

    pub async fn meta(&self, blob_id: Uuid) -> Result<Option<BlobMeta>, FsError> {
        let key = KeyCodec::blob_meta_key(blob_id);
        let value = self
            .store
            .get(&key)
            .await
            .map_err(|e| backend_error(&format!("read blob meta {blob_id}"), e))?;
        value.map(|v| decode_row::<BlobMeta>(&v)).transpose()
    }

    pub async fn exists(&self, blob_id: Uuid) -> Result<bool, FsError> {
        Ok(self.meta(blob_id).await?.is_some())
    }

    pub async fn read(&self, blob_id: Uuid) -> Result<Option<Bytes>, FsError> {
        let Some(meta) = self.meta(blob_id).await? else {
            return Ok(None);
        };
        let chunks = self.read_version(&meta).await?;

        let mut payload = BytesMut::with_capacity(chunks.iter().map(Bytes::len).sum());
        for chunk in &chunks {
            payload.extend_from_slice(chunk);
        }
        Ok(Some(payload.freeze()))
    }

    /// Chunks of one generation in index order. A count different from the
    /// meta row means a torn write or a generation that already expired.
    pub async fn read_version(&self, meta: &BlobMeta) -> Result<Vec<Bytes>, FsError> {
        let rows: Vec<(Bytes, Bytes)> = scan_prefix(
            self.store.clone(),
            KeyCodec::chunk_partition(meta.version),
            CHUNK_READ_PAGE_SIZE,
        )
        .try_collect()
        .await
        .map_err(|e| backend_error(&format!("scan chunks of {}", meta.version), e))?;

        if rows.len() != meta.chunk_count as usize {
            error!(
                "Blob storage is corrupted: version {} has {} chunks, meta records {}",
                meta.version,
                rows.len(),
                meta.chunk_count
            );
            return Err(FsError::StorageCorrupted);
        }

        Ok(rows.into_iter().map(|(_, value)| value).collect())
    }

    pub async fn write(
        &self,
        blob_id: Uuid,
        payload: &Bytes,
        timestamp: Timestamp,
        ttl: Option<Duration>,
    ) -> Result<BlobMeta, FsError> {
        if payload.len() > self.max_blob_size {
            warn!(
                "Blob {} too large: {} bytes, limit {}",
                blob_id,
                payload.len(),
                self.max_blob_size
            );
            return Err(FsError::InvalidArgument);
        }
        ensure(ttl.is_none_or(|ttl| ttl >= MIN_TTL), FsError::InvalidArgument)?;

        let previous = self.meta(blob_id).await?;
        let version = Uuid::new_v4();
        let stamp = WriteStamp::new(timestamp, ttl);

        let mut chunk_count: u16 = 0;
        for (index, start) in (0..payload.len()).step_by(self.chunk_size).enumerate() {
            let end = (start + self.chunk_size).min(payload.len());
            let key = KeyCodec::chunk_key(version, index as u16);
            self.store
                .put(&key, payload.slice(start..end), stamp)
                .await
                .map_err(|e| backend_error(&format!("write chunk {index} of {version}"), e))?;
            chunk_count += 1;
        }

        let meta = BlobMeta {
            version,
            chunk_count,
        };
        self.store
            .put(&KeyCodec::blob_meta_key(blob_id), encode_row(&meta)?, stamp)
            .await
            .map_err(|e| backend_error(&format!("write blob meta {blob_id}"), e))?;

        self.stats.blob_versions_written.fetch_add(1, Ordering::Relaxed);
        self.stats
            .chunks_written
            .fetch_add(chunk_count as u64, Ordering::Relaxed);
        debug!(
            "Blob {} now at version {} ({} chunks, {} bytes)",
            blob_id,
            version,
            chunk_count,
            payload.len()
        );

        if let Some(previous) = previous {
            self.mark_obsolete(&previous, timestamp).await?;
        }
        Ok(meta)
    }

    /// Re-stamps the live generation, chunks first and meta last, so it
    /// expires together with a row rewritten at `timestamp`.
    pub async fn refresh(
        &self,
        blob_id: Uuid,
        timestamp: Timestamp,
        ttl: Option<Duration>,
    ) -> Result<(), FsError> {
        let Some(meta) = self.meta(blob_id).await? else {
            error!("Cannot refresh blob {}: it has no meta row", blob_id);
            return Err(FsError::StorageCorrupted);
        };
        let chunks = self.read_version(&meta).await?;
        let stamp = WriteStamp::new(timestamp, ttl);

        for (index, chunk) in chunks.into_iter().enumerate() {
            let key = KeyCodec::chunk_key(meta.version, index as u16);
            self.store.put(&key, chunk, stamp).await.map_err(|e| {
                backend_error(&format!("refresh chunk {index} of {}", meta.version), e)
            })?;
        }
        self.store
            .put(&KeyCodec::blob_meta_key(blob_id), encode_row(&meta)?, stamp)
            .await
            .map_err(|e| backend_error(&format!("refresh blob meta {blob_id}"), e))?;

        debug!("Refreshed blob {} at version {}", blob_id, meta.version);
        Ok(())
    }

    /// Returns false when the blob had no meta row.
    pub async fn delete(&self, blob_id: Uuid, timestamp: Timestamp) -> Result<bool, FsError> {
        let Some(meta) = self.meta(blob_id).await? else {
            return Ok(false);
        };

        self.store
            .delete(&KeyCodec::blob_meta_key(blob_id), timestamp)
            .await
            .map_err(|e| backend_error(&format!("delete blob meta {blob_id}"), e))?;
        self.mark_obsolete(&meta, timestamp).await?;

        self.stats.blobs_deleted.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    async fn mark_obsolete(&self, meta: &BlobMeta, timestamp: Timestamp) -> Result<(), FsError> {
        let chunks = self.read_version(meta).await?;
        let stamp = WriteStamp::new(timestamp, Some(self.obsolete_ttl));

        for (index, chunk) in chunks.into_iter().enumerate() {
            let key = KeyCodec::chunk_key(meta.version, index as u16);
            self.store.put(&key, chunk, stamp).await.map_err(|e| {
                backend_error(&format!("expire chunk {index} of {}", meta.version), e)
            })?;
        }

        self.stats
            .chunks_obsoleted
            .fetch_add(meta.chunk_count as u64, Ordering::Relaxed);
        debug!(
            "Marked {} chunks of version {} obsolete",
            meta.chunk_count, meta.version
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use crate::fs::clock::{Clock, ManualClock};

    const CHUNK: usize = 16;

    fn blob_store() -> (Arc<ManualClock>, BlobStore) {
        let clock = Arc::new(ManualClock::default());
        let store: Arc<dyn ColumnStore> = Arc::new(MemoryStore::new(clock.clone()));
        let blobs = BlobStore::new(
            store,
            CHUNK,
            4,
            Duration::from_secs(600),
            Arc::new(FileSystemStats::new()),
        );
        (clock, blobs)
    }

    fn payload(len: usize) -> Bytes {
        Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
    }

    #[tokio::test]
    async fn test_write_read_splits_into_chunks() {
        let (clock, blobs) = blob_store();
        let id = Uuid::new_v4();
        let data = payload(CHUNK * 3 + 5);

        let meta = blobs.write(id, &data, clock.now(), None).await.unwrap();
        assert_eq!(meta.chunk_count, 4);
        assert_eq!(blobs.read(id).await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn test_missing_blob_reads_none() {
        let (_, blobs) = blob_store();
        assert_eq!(blobs.read(Uuid::new_v4()).await.unwrap(), None);
        assert!(!blobs.delete(Uuid::new_v4(), Timestamp::EPOCH).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_oversized_payload_and_short_ttl() {
        let (clock, blobs) = blob_store();
        let id = Uuid::new_v4();
        assert_eq!(
            blobs.write(id, &payload(CHUNK * 4 + 1), clock.now(), None).await,
            Err(FsError::InvalidArgument)
        );
        assert_eq!(
            blobs
                .write(id, &payload(4), clock.now(), Some(Duration::from_millis(999)))
                .await,
            Err(FsError::InvalidArgument)
        );
        assert!(!blobs.exists(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_rewrite_switches_version_and_expires_old_chunks() {
        let (clock, blobs) = blob_store();
        let id = Uuid::new_v4();
        let first = blobs.write(id, &payload(40), clock.now(), None).await.unwrap();
        let second = blobs
            .write(id, &Bytes::from_static(b"replacement"), clock.now(), None)
            .await
            .unwrap();
        assert_ne!(first.version, second.version);
        assert_eq!(blobs.meta(id).await.unwrap(), Some(second));

        // A reader that resolved the old meta before the rewrite still succeeds.
        let old_chunks = blobs.read_version(&first).await.unwrap();
        assert_eq!(old_chunks.concat(), payload(40).to_vec());

        clock.advance(Duration::from_secs(601));
        assert_eq!(
            blobs.read_version(&first).await,
            Err(FsError::StorageCorrupted)
        );
        assert_eq!(
            blobs.read(id).await.unwrap(),
            Some(Bytes::from_static(b"replacement"))
        );
    }

    #[tokio::test]
    async fn test_delete_removes_meta() {
        let (clock, blobs) = blob_store();
        let id = Uuid::new_v4();
        blobs.write(id, &payload(20), clock.now(), None).await.unwrap();

        assert!(blobs.delete(id, clock.now()).await.unwrap());
        assert_eq!(blobs.read(id).await.unwrap(), None);
        assert!(!blobs.delete(id, clock.now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_extends_expiry_of_live_version() {
        let (clock, blobs) = blob_store();
        let id = Uuid::new_v4();
        let data = payload(CHUNK * 2 + 3);
        let ttl = Some(Duration::from_secs(10));
        let meta = blobs.write(id, &data, clock.now(), ttl).await.unwrap();

        clock.advance(Duration::from_secs(8));
        blobs.refresh(id, clock.now(), ttl).await.unwrap();
        clock.advance(Duration::from_secs(8));

        assert_eq!(blobs.meta(id).await.unwrap(), Some(meta));
        assert_eq!(blobs.read(id).await.unwrap(), Some(data));

        clock.advance(Duration::from_secs(3));
        assert_eq!(blobs.read(id).await.unwrap(), None);
        assert_eq!(
            blobs.refresh(id, clock.now(), ttl).await,
            Err(FsError::StorageCorrupted)
        );
    }

    #[tokio::test]
    async fn test_ttl_expires_whole_blob() {
        let (clock, blobs) = blob_store();
        let id = Uuid::new_v4();
        blobs
            .write(id, &payload(20), clock.now(), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(6));
        assert_eq!(blobs.read(id).await.unwrap(), None);
    }
}
