use super::path;
use super::types::{FileKind, FileStat, Timestamp};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const STAT_BLOCK_SIZE: u32 = 4096;
const STAT_SECTOR_SIZE: u64 = 512;

pub const ROOT_MODE: u32 = 0o777;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub parent_path: String,
    pub name: String,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub modified_at: Timestamp,
}

impl DirectoryEntry {
    /// The root sentinel. It is synthesized on every lookup and never stored.
    pub fn root(now: Timestamp) -> Self {
        Self {
            parent_path: path::ROOT.to_string(),
            name: String::new(),
            mode: ROOT_MODE,
            uid: 0,
            gid: 0,
            modified_at: now,
        }
    }

    pub fn is_root(&self) -> bool {
        self.name.is_empty()
    }

    pub fn full_path(&self) -> String {
        if self.is_root() {
            path::ROOT.to_string()
        } else {
            path::join(&self.parent_path, &self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub parent_path: String,
    pub name: String,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub modified_at: Timestamp,
    pub xattrs: BTreeMap<String, Vec<u8>>,
    /// Content as last read or about to be written. Listings leave chunked
    /// content unfetched, in which case this is empty.
    pub data: Bytes,
    /// Present while the content is stored chunked. A chunked rewrite keeps
    /// it, so every generation of the content shares one blob id.
    pub blob_id: Option<Uuid>,
}

impl FileEntry {
    pub fn new(parent_path: &str, name: &str, mode: u32, uid: u32, gid: u32) -> Self {
        Self {
            parent_path: parent_path.to_string(),
            name: name.to_string(),
            mode,
            uid,
            gid,
            modified_at: Timestamp::EPOCH,
            xattrs: BTreeMap::new(),
            data: Bytes::new(),
            blob_id: None,
        }
    }

    pub fn full_path(&self) -> String {
        path::join(&self.parent_path, &self.name)
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    File(FileEntry),
    Directory(DirectoryEntry),
}

impl Entry {
    pub fn kind(&self) -> FileKind {
        match self {
            Entry::File(_) => FileKind::Regular,
            Entry::Directory(_) => FileKind::Directory,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Entry::Directory(_))
    }

    pub fn name(&self) -> &str {
        match self {
            Entry::File(f) => &f.name,
            Entry::Directory(d) => &d.name,
        }
    }

    pub fn mode(&self) -> u32 {
        match self {
            Entry::File(f) => f.mode,
            Entry::Directory(d) => d.mode,
        }
    }

    pub fn uid(&self) -> u32 {
        match self {
            Entry::File(f) => f.uid,
            Entry::Directory(d) => d.uid,
        }
    }

    pub fn gid(&self) -> u32 {
        match self {
            Entry::File(f) => f.gid,
            Entry::Directory(d) => d.gid,
        }
    }

    pub fn modified_at(&self) -> Timestamp {
        match self {
            Entry::File(f) => f.modified_at,
            Entry::Directory(d) => d.modified_at,
        }
    }

    /// Access time is not tracked; it reports the time of the stat call.
    pub fn stat(&self, now: Timestamp) -> FileStat {
        let size = match self {
            Entry::File(f) => f.size(),
            Entry::Directory(_) => 0,
        };
        FileStat {
            kind: self.kind(),
            mode: self.kind().type_bits() | self.mode(),
            nlink: 1,
            uid: self.uid(),
            gid: self.gid(),
            size,
            blocks: size / STAT_SECTOR_SIZE,
            block_size: STAT_BLOCK_SIZE,
            atime: now,
            mtime: self.modified_at(),
        }
    }
}

/// Value of a `directories` row. The key carries parent path and name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DirectoryRow {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub modified_at: Timestamp,
}

impl DirectoryRow {
    pub fn from_entry(entry: &DirectoryEntry) -> Self {
        Self {
            mode: entry.mode,
            uid: entry.uid,
            gid: entry.gid,
            modified_at: entry.modified_at,
        }
    }

    pub fn into_entry(self, parent_path: &str, name: &str) -> DirectoryEntry {
        DirectoryEntry {
            parent_path: parent_path.to_string(),
            name: name.to_string(),
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            modified_at: self.modified_at,
        }
    }
}

/// A file row holds exactly one of inline bytes or a blob reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) enum StoredContent {
    Inline(Vec<u8>),
    Chunked { blob_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FileRow {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub modified_at: Timestamp,
    pub xattrs: BTreeMap<String, Vec<u8>>,
    pub content: StoredContent,
}

impl FileRow {
    pub fn from_entry(entry: &FileEntry, content: StoredContent) -> Self {
        Self {
            mode: entry.mode,
            uid: entry.uid,
            gid: entry.gid,
            modified_at: entry.modified_at,
            xattrs: entry.xattrs.clone(),
            content,
        }
    }

    /// Builds the entry with inline content filled in; chunked content is
    /// left for the caller to fetch.
    pub fn into_entry(self, parent_path: &str, name: &str) -> FileEntry {
        let (data, blob_id) = match self.content {
            StoredContent::Inline(bytes) => (Bytes::from(bytes), None),
            StoredContent::Chunked { blob_id } => (Bytes::new(), Some(blob_id)),
        };
        FileEntry {
            parent_path: parent_path.to_string(),
            name: name.to_string(),
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            modified_at: self.modified_at,
            xattrs: self.xattrs,
            data,
            blob_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::types::{S_IFDIR, S_IFREG};

    #[test]
    fn test_root_sentinel() {
        let root = DirectoryEntry::root(Timestamp::EPOCH);
        assert!(root.is_root());
        assert_eq!(root.full_path(), "/");
        assert_eq!((root.uid, root.gid, root.mode), (0, 0, ROOT_MODE));
    }

    #[test]
    fn test_stat_synthesis() {
        let mut file = FileEntry::new("/d", "f.txt", 0o644, 1000, 100);
        file.data = Bytes::from(vec![0u8; 1024]);
        let stat = Entry::File(file).stat(Timestamp::EPOCH);
        assert_eq!(stat.mode, S_IFREG | 0o644);
        assert_eq!(stat.size, 1024);
        assert_eq!(stat.blocks, 2);
        assert_eq!(stat.nlink, 1);

        let dir = Entry::Directory(DirectoryEntry::root(Timestamp::EPOCH));
        let stat = dir.stat(Timestamp::EPOCH);
        assert_eq!(stat.mode, S_IFDIR | ROOT_MODE);
        assert_eq!(stat.size, 0);
    }

    #[test]
    fn test_file_row_keeps_blob_reference() {
        let blob_id = Uuid::new_v4();
        let entry = FileEntry::new("/", "big.bin", 0o600, 1, 1);
        let row = FileRow::from_entry(&entry, StoredContent::Chunked { blob_id });
        let bytes = bincode::serialize(&row).unwrap();
        let decoded: FileRow = bincode::deserialize(&bytes).unwrap();
        let back = decoded.into_entry("/", "big.bin");
        assert_eq!(back.blob_id, Some(blob_id));
        assert!(back.data.is_empty());
    }
}
