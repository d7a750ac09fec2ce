use super::{BlobStore, LIST_PAGE_SIZE, backend_error, decode_row, encode_row};
use crate::backend::{ColumnStore, WriteStamp, scan_prefix};
use crate::fs::clock::Clock;
use crate::fs::entry::{FileEntry, FileRow, StoredContent};
use crate::fs::errors::FsError;
use crate::fs::key_codec::KeyCodec;
use crate::fs::path;
use crate::fs::types::Timestamp;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

/// Rows of the `files` table. Content up to `inline_threshold` bytes lives in
/// the row itself; anything larger goes to the blob store and the row keeps
/// only the blob id.
#[derive(Clone)]
pub struct FileStore {
    store: Arc<dyn ColumnStore>,
    clock: Arc<dyn Clock>,
    blobs: BlobStore,
    inline_threshold: usize,
    ttl: Option<Duration>,
}

fn stored_content(entry: &FileEntry) -> StoredContent {
    match entry.blob_id {
        Some(blob_id) => StoredContent::Chunked { blob_id },
        None => StoredContent::Inline(entry.data.to_vec()),
    }
}

impl FileStore {
    pub fn new(
        store: Arc<dyn ColumnStore>,
        clock: Arc<dyn Clock>,
        blobs: BlobStore,
        inline_threshold: usize,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            store,
            clock,
            blobs,
            inline_threshold,
            ttl,
        }
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Largest content a file may hold, inline or chunked.
    pub fn max_file_size(&self) -> usize {
        self.blobs.max_blob_size().max(self.inline_threshold)
    }

    async fn read_row(&self, parent_path: &str, name: &str) -> Result<Option<FileRow>, FsError> {
        let key = KeyCodec::file_key(parent_path, name);
        let value = self
            .store
            .get(&key)
            .await
            .map_err(|e| backend_error(&format!("read file {parent_path}/{name}"), e))?;
        value.map(|v| decode_row::<FileRow>(&v)).transpose()
    }

    /// The entry without fetching chunked content.
    pub async fn read_metadata(
        &self,
        parent_path: &str,
        name: &str,
    ) -> Result<Option<FileEntry>, FsError> {
        Ok(self
            .read_row(parent_path, name)
            .await?
            .map(|row| row.into_entry(parent_path, name)))
    }

    /// The entry with its full content.
    pub async fn read(&self, parent_path: &str, name: &str) -> Result<Option<FileEntry>, FsError> {
        let Some(mut entry) = self.read_metadata(parent_path, name).await? else {
            return Ok(None);
        };

        if let Some(blob_id) = entry.blob_id {
            match self.blobs.read(blob_id).await? {
                Some(data) => entry.data = data,
                None => {
                    error!(
                        "File {} references blob {} which has no meta row",
                        entry.full_path(),
                        blob_id
                    );
                    return Err(FsError::StorageCorrupted);
                }
            }
        }
        Ok(Some(entry))
    }

    pub async fn exists(&self, full_path: &str) -> Result<bool, FsError> {
        if path::is_root(full_path) {
            return Ok(false);
        }
        let (parent_path, name) = path::split(full_path);
        Ok(self.read_row(&parent_path, &name).await?.is_some())
    }

    /// Stores the entry's content and row, choosing inline or chunked storage
    /// from the content length. Stamps the modification time.
    pub async fn write(&self, entry: &mut FileEntry) -> Result<(), FsError> {
        let timestamp = self.clock.now();
        entry.modified_at = timestamp;

        if entry.data.len() > self.inline_threshold {
            let blob_id = *entry.blob_id.get_or_insert_with(Uuid::new_v4);
            self.blobs
                .write(blob_id, &entry.data, timestamp, self.ttl)
                .await?;
        } else if let Some(blob_id) = entry.blob_id.take() {
            self.blobs.delete(blob_id, timestamp).await?;
        }

        debug!(
            "Writing file {} ({} bytes, {})",
            entry.full_path(),
            entry.data.len(),
            if entry.blob_id.is_some() {
                "chunked"
            } else {
                "inline"
            }
        );
        self.put_row(entry, timestamp).await
    }

    /// Rewrites the row, leaving chunked content under its blob id. Used for
    /// attribute changes and for moving an entry to a new name. With an
    /// expiry configured the blob is re-stamped too, so it never expires
    /// before the row that references it.
    pub async fn update_metadata(&self, entry: &mut FileEntry) -> Result<(), FsError> {
        let timestamp = self.clock.now();
        entry.modified_at = timestamp;
        if self.ttl.is_some()
            && let Some(blob_id) = entry.blob_id
        {
            self.blobs.refresh(blob_id, timestamp, self.ttl).await?;
        }
        self.put_row(entry, timestamp).await
    }

    async fn put_row(&self, entry: &FileEntry, timestamp: Timestamp) -> Result<(), FsError> {
        let key = KeyCodec::file_key(&entry.parent_path, &entry.name);
        let row = encode_row(&FileRow::from_entry(entry, stored_content(entry)))?;
        self.store
            .put(&key, row, WriteStamp::new(timestamp, self.ttl))
            .await
            .map_err(|e| backend_error(&format!("write file {}", entry.full_path()), e))
    }

    /// Removes the row and its blob, both at one timestamp.
    pub async fn delete(&self, parent_path: &str, name: &str) -> Result<(), FsError> {
        let timestamp = self.clock.now();
        if let Some(row) = self.read_row(parent_path, name).await?
            && let StoredContent::Chunked { blob_id } = row.content
        {
            self.blobs.delete(blob_id, timestamp).await?;
        }
        self.delete_row_at(parent_path, name, timestamp).await
    }

    /// Removes only the row; the blob stays referenced by whichever row was
    /// written in its place.
    pub async fn delete_row(&self, parent_path: &str, name: &str) -> Result<(), FsError> {
        self.delete_row_at(parent_path, name, self.clock.now())
            .await
    }

    async fn delete_row_at(
        &self,
        parent_path: &str,
        name: &str,
        timestamp: Timestamp,
    ) -> Result<(), FsError> {
        let key = KeyCodec::file_key(parent_path, name);
        self.store
            .delete(&key, timestamp)
            .await
            .map_err(|e| backend_error(&format!("delete file {parent_path}/{name}"), e))
    }

    /// Files directly under `parent_path`, without chunked content.
    pub fn list_children(
        &self,
        parent_path: &str,
    ) -> Pin<Box<dyn Stream<Item = Result<FileEntry, FsError>> + Send>> {
        let parent = parent_path.to_string();
        let rows = scan_prefix(
            self.store.clone(),
            KeyCodec::file_partition(parent_path),
            LIST_PAGE_SIZE,
        )
        .map(move |row| {
            let (key, value) = row.map_err(|e| backend_error(&format!("list {parent}"), e))?;
            let name = KeyCodec::parse_entry_name(&key)?;
            let row: FileRow = decode_row(&value)?;
            Ok(row.into_entry(&parent, &name))
        });
        Box::pin(rows)
    }

    pub async fn has_children(&self, parent_path: &str) -> Result<bool, FsError> {
        let page = self
            .store
            .scan_page(&KeyCodec::file_partition(parent_path), None, 1)
            .await
            .map_err(|e| backend_error(&format!("check children of {parent_path}"), e))?;
        Ok(!page.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use crate::fs::clock::ManualClock;
    use crate::fs::metrics::FileSystemStats;
    use futures::TryStreamExt;

    const THRESHOLD: usize = 32;
    const CHUNK: usize = 8;

    fn file_store() -> (Arc<ManualClock>, FileStore) {
        file_store_with_ttl(None)
    }

    fn file_store_with_ttl(ttl: Option<Duration>) -> (Arc<ManualClock>, FileStore) {
        let clock = Arc::new(ManualClock::default());
        let store: Arc<dyn ColumnStore> = Arc::new(MemoryStore::new(clock.clone()));
        let blobs = BlobStore::new(
            store.clone(),
            CHUNK,
            64,
            Duration::from_secs(600),
            Arc::new(FileSystemStats::new()),
        );
        let files = FileStore::new(store, clock.clone(), blobs, THRESHOLD, ttl);
        (clock, files)
    }

    fn file_with(len: usize) -> FileEntry {
        let mut entry = FileEntry::new("/", "f", 0o644, 1000, 1000);
        entry.data = Bytes::from(vec![0xAB; len]);
        entry
    }

    #[tokio::test]
    async fn test_threshold_boundary() {
        let (_, files) = file_store();

        let mut at = file_with(THRESHOLD);
        files.write(&mut at).await.unwrap();
        assert_eq!(at.blob_id, None);
        assert_eq!(files.read("/", "f").await.unwrap().unwrap().data, at.data);

        let mut over = file_with(THRESHOLD + 1);
        files.write(&mut over).await.unwrap();
        let blob_id = over.blob_id.expect("content above the threshold is chunked");
        let read = files.read("/", "f").await.unwrap().unwrap();
        assert_eq!(read.data, over.data);
        assert_eq!(read.blob_id, Some(blob_id));

        let meta = files.read_metadata("/", "f").await.unwrap().unwrap();
        assert!(meta.data.is_empty());
    }

    #[tokio::test]
    async fn test_shrinking_below_threshold_drops_blob() {
        let (_, files) = file_store();
        let mut entry = file_with(THRESHOLD * 2);
        files.write(&mut entry).await.unwrap();
        let blob_id = entry.blob_id.unwrap();

        entry.data = Bytes::from_static(b"tiny");
        files.write(&mut entry).await.unwrap();
        assert_eq!(entry.blob_id, None);
        assert!(!files.blobs().exists(blob_id).await.unwrap());
        assert_eq!(
            files.read("/", "f").await.unwrap().unwrap().data,
            Bytes::from_static(b"tiny")
        );
    }

    #[tokio::test]
    async fn test_rewrite_keeps_blob_id() {
        let (_, files) = file_store();
        let mut entry = file_with(THRESHOLD * 2);
        files.write(&mut entry).await.unwrap();
        let blob_id = entry.blob_id;

        entry.data = Bytes::from(vec![1u8; THRESHOLD * 3]);
        files.write(&mut entry).await.unwrap();
        assert_eq!(entry.blob_id, blob_id);
    }

    #[tokio::test]
    async fn test_delete_removes_row_and_blob() {
        let (_, files) = file_store();
        let mut entry = file_with(THRESHOLD * 2);
        files.write(&mut entry).await.unwrap();
        let blob_id = entry.blob_id.unwrap();

        files.delete("/", "f").await.unwrap();
        assert!(!files.exists("/f").await.unwrap());
        assert!(!files.blobs().exists(blob_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_blob_is_corruption() {
        let (clock, files) = file_store();
        let mut entry = file_with(THRESHOLD * 2);
        files.write(&mut entry).await.unwrap();
        files
            .blobs()
            .delete(entry.blob_id.unwrap(), clock.now())
            .await
            .unwrap();

        assert_eq!(files.read("/", "f").await, Err(FsError::StorageCorrupted));
    }

    #[tokio::test]
    async fn test_update_metadata_keeps_blob_alive_with_row() {
        let (clock, files) = file_store_with_ttl(Some(Duration::from_secs(10)));
        let mut entry = file_with(THRESHOLD * 2);
        files.write(&mut entry).await.unwrap();

        clock.advance(Duration::from_secs(8));
        entry.mode = 0o600;
        files.update_metadata(&mut entry).await.unwrap();
        clock.advance(Duration::from_secs(8));

        let read = files.read("/", "f").await.unwrap().unwrap();
        assert_eq!(read.mode, 0o600);
        assert_eq!(read.data, Bytes::from(vec![0xAB; THRESHOLD * 2]));

        clock.advance(Duration::from_secs(3));
        assert_eq!(files.read("/", "f").await.unwrap(), None);
    }

    #[test]
    fn test_max_file_size() {
        let (_, files) = file_store();
        assert_eq!(files.max_file_size(), CHUNK * 64);
    }

    #[tokio::test]
    async fn test_list_children() {
        let (_, files) = file_store();
        for name in ["a", "b"] {
            let mut entry = file_with(4);
            entry.name = name.to_string();
            files.write(&mut entry).await.unwrap();
        }
        let listed: Vec<FileEntry> = files.list_children("/").try_collect().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(files.has_children("/").await.unwrap());
        assert!(!files.has_children("/a").await.unwrap());
    }
}
