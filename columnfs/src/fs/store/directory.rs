use super::{LIST_PAGE_SIZE, backend_error, decode_row, encode_row};
use crate::backend::{ColumnStore, WriteStamp, scan_prefix};
use crate::fs::clock::Clock;
use crate::fs::entry::{DirectoryEntry, DirectoryRow};
use crate::fs::errors::FsError;
use crate::fs::key_codec::KeyCodec;
use crate::fs::path;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;

/// Rows of the `directories` table, partitioned by parent path. Directories
/// never expire.
#[derive(Clone)]
pub struct DirectoryStore {
    store: Arc<dyn ColumnStore>,
    clock: Arc<dyn Clock>,
}

impl DirectoryStore {
    pub fn new(store: Arc<dyn ColumnStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn root(&self) -> DirectoryEntry {
        DirectoryEntry::root(self.clock.now())
    }

    pub async fn read(
        &self,
        parent_path: &str,
        name: &str,
    ) -> Result<Option<DirectoryEntry>, FsError> {
        let key = KeyCodec::directory_key(parent_path, name);
        let value = self
            .store
            .get(&key)
            .await
            .map_err(|e| backend_error(&format!("read directory {parent_path}/{name}"), e))?;

        value
            .map(|v| decode_row::<DirectoryRow>(&v).map(|row| row.into_entry(parent_path, name)))
            .transpose()
    }

    /// Resolves a full path; the root is synthesized, never read.
    pub async fn read_path(&self, full_path: &str) -> Result<Option<DirectoryEntry>, FsError> {
        if path::is_root(full_path) {
            return Ok(Some(self.root()));
        }
        let (parent_path, name) = path::split(full_path);
        self.read(&parent_path, &name).await
    }

    pub async fn exists(&self, full_path: &str) -> Result<bool, FsError> {
        Ok(self.read_path(full_path).await?.is_some())
    }

    /// Upserts the row, stamping the modification time.
    pub async fn write(&self, entry: &mut DirectoryEntry) -> Result<(), FsError> {
        if entry.is_root() {
            return Err(FsError::InvalidArgument);
        }
        entry.modified_at = self.clock.now();

        let key = KeyCodec::directory_key(&entry.parent_path, &entry.name);
        let row = encode_row(&DirectoryRow::from_entry(entry))?;
        self.store
            .put(&key, row, WriteStamp::permanent(entry.modified_at))
            .await
            .map_err(|e| backend_error(&format!("write directory {}", entry.full_path()), e))
    }

    pub async fn delete(&self, parent_path: &str, name: &str) -> Result<(), FsError> {
        let key = KeyCodec::directory_key(parent_path, name);
        self.store
            .delete(&key, self.clock.now())
            .await
            .map_err(|e| backend_error(&format!("delete directory {parent_path}/{name}"), e))
    }

    pub fn list_children(
        &self,
        parent_path: &str,
    ) -> Pin<Box<dyn Stream<Item = Result<DirectoryEntry, FsError>> + Send>> {
        let parent = parent_path.to_string();
        let rows = scan_prefix(
            self.store.clone(),
            KeyCodec::directory_partition(parent_path),
            LIST_PAGE_SIZE,
        )
        .map(move |row| {
            let (key, value) = row.map_err(|e| backend_error(&format!("list {parent}"), e))?;
            let name = KeyCodec::parse_entry_name(&key)?;
            let row: DirectoryRow = decode_row(&value)?;
            Ok(row.into_entry(&parent, &name))
        });
        Box::pin(rows)
    }

    pub async fn has_children(&self, parent_path: &str) -> Result<bool, FsError> {
        let page = self
            .store
            .scan_page(&KeyCodec::directory_partition(parent_path), None, 1)
            .await
            .map_err(|e| backend_error(&format!("check children of {parent_path}"), e))?;
        Ok(!page.is_empty())
    }
}
