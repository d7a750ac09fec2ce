pub mod clock;
pub mod entry;
pub mod errors;
pub mod key_codec;
pub mod metrics;
pub mod path;
pub mod permissions;
pub mod store;
pub mod types;

use self::clock::{Clock, SystemClock};
use self::entry::{DirectoryEntry, Entry, FileEntry};
use self::errors::{Ensure, FsError, ensure};
use self::metrics::FileSystemStats;
use self::permissions::{
    Credentials, can_change_ownership, check_access, check_ownership, validate_mode,
};
use self::store::{BlobStore, DirectoryStore, FileStore};
use self::types::{AccessMask, DirEntry, FileStat, OpenFlags, StatFs, XattrFlags};
use crate::backend::{self, ColumnStore};
use crate::config::{FilesystemConfig, Settings};
use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

pub const NAME_MAX: usize = 255;
/// Longest full path accepted for a new entry. Keeps every parent path well
/// inside the key codec's 16-bit partition length.
pub const PATH_MAX: usize = 4096;
/// Mode of files created implicitly by `open` with `O_CREAT`.
pub const DEFAULT_FILE_MODE: u32 = 0o777;

const STATFS_BLOCK_SIZE: u64 = 4096;
const STATFS_FILES: u64 = 4096;
const STATFS_FSID: u64 = 1;

pub fn validate_filename(name: &str) -> Result<(), FsError> {
    ensure(!name.is_empty(), FsError::InvalidArgument)?;
    ensure(name.len() <= NAME_MAX, FsError::InvalidArgument)
}

/// Name rules plus the full path length limit for an entry about to be
/// created at `parent_path`/`name`.
pub fn validate_new_path(parent_path: &str, name: &str) -> Result<(), FsError> {
    validate_filename(name)?;
    ensure(
        path::join(parent_path, name).len() <= PATH_MAX,
        FsError::InvalidArgument,
    )
}

fn to_usize(value: u64) -> Result<usize, FsError> {
    usize::try_from(value).map_err(|_| FsError::InvalidArgument)
}

/// `data` with `buf` written at `offset`; a gap past the end is zero filled.
fn splice(data: &Bytes, offset: usize, buf: &[u8]) -> Bytes {
    let end = offset + buf.len();
    let mut out = BytesMut::with_capacity(data.len().max(end));
    out.extend_from_slice(data);
    if out.len() < end {
        out.resize(end, 0);
    }
    out[offset..end].copy_from_slice(buf);
    out.freeze()
}

/// The filesystem: path-addressed operations over the directory and file
/// stores. Nothing is locked across round trips, so concurrent writers to
/// one path resolve by last write wins.
#[derive(Clone)]
pub struct ColumnFs {
    pub store: Arc<dyn ColumnStore>,
    pub directory_store: DirectoryStore,
    pub file_store: FileStore,
    pub clock: Arc<dyn Clock>,
    pub stats: Arc<FileSystemStats>,
}

impl ColumnFs {
    pub fn new(store: Arc<dyn ColumnStore>, clock: Arc<dyn Clock>, config: &FilesystemConfig) -> Self {
        let stats = Arc::new(FileSystemStats::new());
        let blob_store = BlobStore::new(
            store.clone(),
            config.chunk_size,
            config.max_chunks_per_blob,
            config.obsolete_ttl(),
            stats.clone(),
        );
        let directory_store = DirectoryStore::new(store.clone(), clock.clone());
        let file_store = FileStore::new(
            store.clone(),
            clock.clone(),
            blob_store,
            config.inline_threshold,
            config.file_ttl(),
        );

        Self {
            store,
            directory_store,
            file_store,
            clock,
            stats,
        }
    }

    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let store = backend::open(settings, clock.clone()).await?;
        info!(
            "Filesystem ready (inline threshold {} bytes, chunk size {} bytes, blobs up to {} bytes)",
            settings.filesystem.inline_threshold,
            settings.filesystem.chunk_size,
            settings.filesystem.max_blob_size()
        );
        Ok(Self::new(store, clock, &settings.filesystem))
    }

    pub async fn close(&self) -> anyhow::Result<()> {
        self.stats.output_report_debug();
        self.store.flush().await?;
        self.store.close().await
    }

    #[cfg(test)]
    pub fn new_in_memory() -> Self {
        Self::new_in_memory_with(&FilesystemConfig::default()).0
    }

    #[cfg(test)]
    pub fn new_in_memory_with(
        config: &FilesystemConfig,
    ) -> (Self, Arc<self::clock::ManualClock>) {
        let clock = Arc::new(self::clock::ManualClock::default());
        let store: Arc<dyn ColumnStore> = Arc::new(backend::MemoryStore::new(clock.clone()));
        (Self::new(store, clock.clone(), config), clock)
    }

    fn count_operation(&self) {
        self.stats.total_operations.fetch_add(1, Ordering::Relaxed);
    }

    /// Ok when `dir_path` is an existing directory; otherwise `NotDirectory`
    /// if a file has that name, else `NoEntry`.
    async fn validate_directory(&self, dir_path: &str) -> Result<DirectoryEntry, FsError> {
        if let Some(directory) = self.directory_store.read_path(dir_path).await? {
            return Ok(directory);
        }
        if self.file_store.exists(dir_path).await? {
            Err(FsError::NotDirectory)
        } else {
            Err(FsError::NoEntry)
        }
    }

    async fn name_taken(&self, full_path: &str) -> Result<bool, FsError> {
        Ok(self.file_store.exists(full_path).await? || self.directory_store.exists(full_path).await?)
    }

    /// Parent must be a directory and `path` must not be one.
    async fn validate_file_path(&self, full_path: &str) -> Result<(String, String), FsError> {
        ensure(!path::is_root(full_path), FsError::IsDirectory)?;
        let (parent_path, name) = path::split(full_path);
        self.validate_directory(&parent_path).await?;
        ensure(
            !self.directory_store.exists(full_path).await?,
            FsError::IsDirectory,
        )?;
        Ok((parent_path, name))
    }

    /// Rejects a content length above what the file store can hold before
    /// anything is allocated for it.
    fn ensure_within_limit(&self, full_path: &str, len: usize) -> Result<(), FsError> {
        let limit = self.file_store.max_file_size();
        if len > limit {
            warn!("{}: {} bytes exceeds the file size limit {}", full_path, len, limit);
            return Err(FsError::InvalidArgument);
        }
        Ok(())
    }

    async fn read_file_entry(&self, full_path: &str) -> Result<FileEntry, FsError> {
        let (parent_path, name) = self.validate_file_path(full_path).await?;
        self.file_store
            .read(&parent_path, &name)
            .await?
            .ok_or(FsError::NoEntry)
    }

    async fn read_file_metadata(&self, full_path: &str) -> Result<FileEntry, FsError> {
        let (parent_path, name) = self.validate_file_path(full_path).await?;
        self.file_store
            .read_metadata(&parent_path, &name)
            .await?
            .ok_or(FsError::NoEntry)
    }

    async fn resolve(&self, full_path: &str, fetch_content: bool) -> Result<Entry, FsError> {
        if path::is_root(full_path) {
            return Ok(Entry::Directory(self.directory_store.root()));
        }

        let (parent_path, name) = path::split(full_path);
        self.validate_directory(&parent_path).await?;

        let file = if fetch_content {
            self.file_store.read(&parent_path, &name).await?
        } else {
            self.file_store.read_metadata(&parent_path, &name).await?
        };
        if let Some(file) = file {
            return Ok(Entry::File(file));
        }

        self.directory_store
            .read(&parent_path, &name)
            .await?
            .map(Entry::Directory)
            .ok_or(FsError::NoEntry)
    }

    async fn write_entry(&self, entry: &mut Entry) -> Result<(), FsError> {
        match entry {
            Entry::File(file) => self.file_store.update_metadata(file).await,
            Entry::Directory(directory) => self.directory_store.write(directory).await,
        }
    }

    pub async fn lookup(&self, full_path: &str) -> Result<Entry, FsError> {
        debug!("lookup: {}", full_path);
        self.count_operation();
        self.resolve(full_path, true).await
    }

    pub async fn stat(&self, full_path: &str) -> Result<FileStat, FsError> {
        debug!("stat: {}", full_path);
        self.count_operation();
        let entry = self.resolve(full_path, true).await?;
        Ok(entry.stat(self.clock.now()))
    }

    /// Subdirectories first, then files. Chunked files are listed from their
    /// row alone and report size 0.
    pub async fn read_directory(&self, full_path: &str) -> Result<Vec<DirEntry>, FsError> {
        debug!("read_directory: {}", full_path);
        self.count_operation();

        let directory = self.validate_directory(full_path).await?;
        let dir_path = directory.full_path();
        let now = self.clock.now();

        let directories: Vec<DirectoryEntry> = self
            .directory_store
            .list_children(&dir_path)
            .try_collect()
            .await?;
        let files: Vec<FileEntry> = self.file_store.list_children(&dir_path).try_collect().await?;

        let entries = directories
            .into_iter()
            .map(Entry::Directory)
            .chain(files.into_iter().map(Entry::File))
            .map(|entry| DirEntry {
                name: entry.name().to_string(),
                stat: entry.stat(now),
            })
            .collect();
        Ok(entries)
    }

    pub async fn create_file(
        &self,
        creds: &Credentials,
        full_path: &str,
        mode: u32,
    ) -> Result<FileEntry, FsError> {
        debug!("create_file: {} mode={:o}", full_path, mode);
        self.count_operation();

        ensure(!path::is_root(full_path), FsError::AlreadyExist)?;
        let (parent_path, name) = path::split(full_path);
        validate_new_path(&parent_path, &name)?;
        self.validate_directory(&parent_path).await?;
        self.name_taken(full_path)
            .await
            .ensure(|taken| !taken, FsError::AlreadyExist)?;

        let mut file = FileEntry::new(
            &parent_path,
            &name,
            validate_mode(mode),
            creds.uid,
            creds.gid,
        );
        self.file_store.write(&mut file).await?;
        FileSystemStats::record(&self.stats.files_created);
        Ok(file)
    }

    pub async fn make_directory(
        &self,
        creds: &Credentials,
        full_path: &str,
        mode: u32,
    ) -> Result<DirectoryEntry, FsError> {
        debug!("make_directory: {} mode={:o}", full_path, mode);
        self.count_operation();

        ensure(!path::is_root(full_path), FsError::AlreadyExist)?;
        let (parent_path, name) = path::split(full_path);
        validate_new_path(&parent_path, &name)?;
        self.validate_directory(&parent_path).await?;
        self.name_taken(full_path)
            .await
            .ensure(|taken| !taken, FsError::AlreadyExist)?;

        let mut directory = DirectoryEntry {
            parent_path,
            name,
            mode: validate_mode(mode),
            uid: creds.uid,
            gid: creds.gid,
            modified_at: self.clock.now(),
        };
        self.directory_store.write(&mut directory).await?;
        FileSystemStats::record(&self.stats.directories_created);
        Ok(directory)
    }

    /// open(2) semantics for `O_CREAT` and `O_TRUNC`; `O_APPEND` is ignored.
    pub async fn open(
        &self,
        creds: &Credentials,
        full_path: &str,
        flags: OpenFlags,
    ) -> Result<FileEntry, FsError> {
        debug!("open: {} {:?}", full_path, flags);
        self.count_operation();

        let (parent_path, name) = self.validate_file_path(full_path).await?;
        match self.file_store.read(&parent_path, &name).await? {
            None if !flags.create => Err(FsError::NoEntry),
            None => {
                validate_new_path(&parent_path, &name)?;
                let mut file =
                    FileEntry::new(&parent_path, &name, DEFAULT_FILE_MODE, creds.uid, creds.gid);
                self.file_store.write(&mut file).await?;
                FileSystemStats::record(&self.stats.files_created);
                Ok(file)
            }
            Some(mut file) if flags.truncate => {
                file.data = Bytes::new();
                self.file_store.write(&mut file).await?;
                Ok(file)
            }
            Some(file) => Ok(file),
        }
    }

    pub async fn read(&self, full_path: &str, offset: u64, size: usize) -> Result<Bytes, FsError> {
        debug!("read: {} offset={} size={}", full_path, offset, size);
        self.count_operation();

        let file = self.read_file_entry(full_path).await?;
        let len = file.data.len();
        let start = to_usize(offset)?.min(len);
        let end = start.saturating_add(size).min(len);
        let data = file.data.slice(start..end);

        self.stats.record_read(data.len());
        Ok(data)
    }

    /// Writes `buf` at `offset` by rewriting the whole content, which
    /// re-evaluates the inline or chunked decision.
    pub async fn write(&self, full_path: &str, offset: u64, buf: &[u8]) -> Result<usize, FsError> {
        debug!("write: {} offset={} len={}", full_path, offset, buf.len());
        self.count_operation();

        let mut file = self.read_file_entry(full_path).await?;
        if buf.is_empty() {
            return Ok(0);
        }

        let offset = to_usize(offset)?;
        let end = offset
            .checked_add(buf.len())
            .ok_or(FsError::InvalidArgument)?;
        self.ensure_within_limit(full_path, end)?;
        file.data = splice(&file.data, offset, buf);
        self.file_store.write(&mut file).await?;

        self.stats.record_write(buf.len());
        Ok(buf.len())
    }

    pub async fn truncate(&self, full_path: &str, size: u64) -> Result<(), FsError> {
        debug!("truncate: {} size={}", full_path, size);
        self.count_operation();

        let mut file = self.read_file_entry(full_path).await?;
        let size = to_usize(size)?;
        self.ensure_within_limit(full_path, size)?;
        if size <= file.data.len() {
            file.data = file.data.slice(..size);
        } else {
            let mut grown = BytesMut::from(file.data.as_ref());
            grown.resize(size, 0);
            file.data = grown.freeze();
        }
        self.file_store.write(&mut file).await
    }

    /// No handles are held between calls, so releasing is an acknowledgement.
    pub async fn release(&self, full_path: &str) -> Result<(), FsError> {
        debug!("release: {}", full_path);
        Ok(())
    }

    pub async fn delete_file(&self, full_path: &str) -> Result<(), FsError> {
        debug!("delete_file: {}", full_path);
        self.count_operation();

        ensure(!path::is_root(full_path), FsError::InvalidArgument)?;
        let (parent_path, name) = self.validate_file_path(full_path).await?;
        ensure(
            self.file_store.exists(full_path).await?,
            FsError::NoEntry,
        )?;

        self.file_store.delete(&parent_path, &name).await?;
        FileSystemStats::record(&self.stats.files_deleted);
        Ok(())
    }

    pub async fn delete_directory(&self, full_path: &str) -> Result<(), FsError> {
        debug!("delete_directory: {}", full_path);
        self.count_operation();

        ensure(!path::is_root(full_path), FsError::InvalidArgument)?;
        let directory = self.validate_directory(full_path).await?;
        let dir_path = directory.full_path();

        let has_children = self.file_store.has_children(&dir_path).await?
            || self.directory_store.has_children(&dir_path).await?;
        ensure(!has_children, FsError::DirectoryNotEmpty)?;

        self.directory_store
            .delete(&directory.parent_path, &directory.name)
            .await?;
        FileSystemStats::record(&self.stats.directories_deleted);
        Ok(())
    }

    /// Dispatches to a file or directory rename depending on what `from` is.
    pub async fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        debug!("rename: {} -> {}", from, to);
        self.count_operation();

        ensure(
            !path::is_root(from) && !path::is_root(to),
            FsError::InvalidArgument,
        )?;
        if path::normalize(from) == path::normalize(to) {
            return self.resolve(from, false).await.map(|_| ());
        }

        if self.file_store.exists(from).await? {
            self.rename_file(from, to).await
        } else {
            self.rename_directory(from, to).await
        }
    }

    async fn validate_rename_target(&self, to: &str) -> Result<(String, String), FsError> {
        let (parent_path, name) = path::split(to);
        validate_new_path(&parent_path, &name)?;
        self.validate_directory(&parent_path).await?;
        Ok((parent_path, name))
    }

    /// Moves the row only; chunked content stays under its blob id.
    pub async fn rename_file(&self, from: &str, to: &str) -> Result<(), FsError> {
        debug!("rename_file: {} -> {}", from, to);

        let mut file = self.read_file_metadata(from).await?;
        let (to_parent, to_name) = self.validate_rename_target(to).await?;
        ensure(
            !self.directory_store.exists(to).await?,
            FsError::IsDirectory,
        )?;
        ensure(!self.file_store.exists(to).await?, FsError::AlreadyExist)?;

        let (from_parent, from_name) = (file.parent_path.clone(), file.name.clone());
        file.parent_path = to_parent;
        file.name = to_name;
        self.file_store.update_metadata(&mut file).await?;
        self.file_store.delete_row(&from_parent, &from_name).await?;

        FileSystemStats::record(&self.stats.files_renamed);
        Ok(())
    }

    /// Breadth-first subtree move. Not atomic: a failure part way leaves
    /// some descendants under the new prefix and the rest under the old.
    pub async fn rename_directory(&self, from: &str, to: &str) -> Result<(), FsError> {
        debug!("rename_directory: {} -> {}", from, to);

        ensure(!path::is_root(from), FsError::InvalidArgument)?;
        let (from_parent, from_name) = path::split(from);
        self.validate_directory(&from_parent).await?;
        ensure(
            !self.file_store.exists(from).await?,
            FsError::NotDirectory,
        )?;
        let mut directory = self
            .directory_store
            .read(&from_parent, &from_name)
            .await?
            .ok_or(FsError::NoEntry)?;

        let from = directory.full_path();
        ensure(
            !path::is_same_or_descendant(&from, to),
            FsError::InvalidArgument,
        )?;
        let (to_parent, to_name) = self.validate_rename_target(to).await?;
        self.name_taken(to)
            .await
            .ensure(|taken| !taken, FsError::AlreadyExist)?;
        let to = path::join(&to_parent, &to_name);

        let (directories, files) = self.collect_subtree(&from).await?;
        let longest = directories
            .iter()
            .map(DirectoryEntry::full_path)
            .chain(files.iter().map(FileEntry::full_path))
            .map(|descendant| path::rebase(&descendant, &from, &to).len())
            .max()
            .unwrap_or(0);
        ensure(longest <= PATH_MAX, FsError::InvalidArgument)?;

        directory.parent_path = to_parent;
        directory.name = to_name;
        self.directory_store.write(&mut directory).await?;

        if let Err(e) = self.move_subtree(&from, &to, directories, files).await {
            warn!(
                "rename_directory {} -> {} failed part way ({}); the subtree is partially migrated",
                from, to, e
            );
            return Err(e);
        }

        self.directory_store.delete(&from_parent, &from_name).await?;
        FileSystemStats::record(&self.stats.directories_renamed);
        Ok(())
    }

    async fn collect_subtree(
        &self,
        root: &str,
    ) -> Result<(Vec<DirectoryEntry>, Vec<FileEntry>), FsError> {
        let mut directories = Vec::new();
        let mut files = Vec::new();
        let mut pending = VecDeque::from([root.to_string()]);

        while let Some(current) = pending.pop_front() {
            let children: Vec<DirectoryEntry> = self
                .directory_store
                .list_children(&current)
                .try_collect()
                .await?;
            pending.extend(children.iter().map(DirectoryEntry::full_path));
            directories.extend(children);

            let child_files: Vec<FileEntry> =
                self.file_store.list_children(&current).try_collect().await?;
            files.extend(child_files);
        }
        Ok((directories, files))
    }

    async fn move_subtree(
        &self,
        from: &str,
        to: &str,
        directories: Vec<DirectoryEntry>,
        files: Vec<FileEntry>,
    ) -> Result<(), FsError> {
        for mut file in files {
            let new_parent = path::rebase(&file.parent_path, from, to);
            let old_parent = std::mem::replace(&mut file.parent_path, new_parent);
            self.file_store.update_metadata(&mut file).await?;
            self.file_store.delete_row(&old_parent, &file.name).await?;
        }

        for mut directory in directories {
            let new_parent = path::rebase(&directory.parent_path, from, to);
            let old_parent = std::mem::replace(&mut directory.parent_path, new_parent);
            self.directory_store.write(&mut directory).await?;
            self.directory_store
                .delete(&old_parent, &directory.name)
                .await?;
        }
        Ok(())
    }

    pub async fn set_extended_attribute(
        &self,
        full_path: &str,
        name: &str,
        value: &[u8],
        flags: XattrFlags,
    ) -> Result<(), FsError> {
        debug!("set_extended_attribute: {} {} {:?}", full_path, name, flags);
        self.count_operation();

        let mut file = self.read_file_metadata(full_path).await?;
        let present = file.xattrs.contains_key(name);
        match flags {
            XattrFlags::CreateOnly if present => return Err(FsError::AlreadyExist),
            XattrFlags::ReplaceOnly if !present => return Err(FsError::NoAttribute),
            _ => {}
        }

        file.xattrs.insert(name.to_string(), value.to_vec());
        self.file_store.update_metadata(&mut file).await
    }

    /// Fails with `OutOfRange` when the value does not fit `buffer_len`.
    pub async fn get_extended_attribute(
        &self,
        full_path: &str,
        name: &str,
        buffer_len: usize,
    ) -> Result<Vec<u8>, FsError> {
        debug!("get_extended_attribute: {} {}", full_path, name);
        self.count_operation();

        let file = self.read_file_metadata(full_path).await?;
        file.xattrs
            .get(name)
            .cloned()
            .ok_or(FsError::NoAttribute)
            .ensure(|value| value.len() <= buffer_len, FsError::OutOfRange)
    }

    pub async fn list_extended_attributes(&self, full_path: &str) -> Result<Vec<String>, FsError> {
        debug!("list_extended_attributes: {}", full_path);
        self.count_operation();

        let file = self.read_file_metadata(full_path).await?;
        Ok(file.xattrs.into_keys().collect())
    }

    pub async fn remove_extended_attribute(&self, full_path: &str, name: &str) -> Result<(), FsError> {
        debug!("remove_extended_attribute: {} {}", full_path, name);
        self.count_operation();

        let mut file = self.read_file_metadata(full_path).await?;
        file.xattrs.remove(name).ok_or(FsError::NoAttribute)?;
        self.file_store.update_metadata(&mut file).await
    }

    pub async fn change_permissions(
        &self,
        creds: &Credentials,
        full_path: &str,
        mode: u32,
    ) -> Result<(), FsError> {
        debug!("change_permissions: {} mode={:o}", full_path, mode);
        self.count_operation();

        let mut entry = self.resolve(full_path, false).await?;
        check_ownership(&entry, creds)?;
        match &mut entry {
            Entry::File(file) => file.mode = validate_mode(mode),
            Entry::Directory(directory) => directory.mode = validate_mode(mode),
        }
        self.write_entry(&mut entry).await
    }

    pub async fn change_owner(
        &self,
        creds: &Credentials,
        full_path: &str,
        uid: u32,
        gid: u32,
    ) -> Result<(), FsError> {
        debug!("change_owner: {} {}:{}", full_path, uid, gid);
        self.count_operation();

        let mut entry = self.resolve(full_path, false).await?;
        ensure(
            can_change_ownership(entry.uid(), entry.gid(), creds.uid, uid, gid),
            FsError::PermissionDenied,
        )?;
        match &mut entry {
            Entry::File(file) => (file.uid, file.gid) = (uid, gid),
            Entry::Directory(directory) => (directory.uid, directory.gid) = (uid, gid),
        }
        self.write_entry(&mut entry).await
    }

    /// mknod: only regular files exist here, so special files are created as
    /// empty regular files with the requested mode.
    pub async fn create_special(
        &self,
        creds: &Credentials,
        full_path: &str,
        mode: u32,
        rdev: u64,
    ) -> Result<FileEntry, FsError> {
        debug!("create_special: {} mode={:o} rdev={}", full_path, mode, rdev);
        self.create_file(creds, full_path, mode).await
    }

    /// utime: access and modification times are not settable. The call only
    /// checks that the path resolves.
    pub async fn change_times(&self, full_path: &str) -> Result<(), FsError> {
        debug!("change_times: {}", full_path);
        self.count_operation();
        self.resolve(full_path, false).await.map(|_| ())
    }

    pub async fn check_access(
        &self,
        creds: &Credentials,
        full_path: &str,
        mask: AccessMask,
    ) -> Result<(), FsError> {
        debug!("check_access: {} {:?}", full_path, mask);
        self.count_operation();

        let entry = self.resolve(full_path, false).await?;
        check_access(&entry, creds, mask)
    }

    pub async fn filesystem_status(&self, full_path: &str) -> Result<StatFs, FsError> {
        debug!("filesystem_status: {}", full_path);
        self.count_operation();

        self.resolve(full_path, false).await?;
        Ok(StatFs {
            block_size: STATFS_BLOCK_SIZE,
            fragment_size: STATFS_BLOCK_SIZE,
            blocks: 1,
            blocks_free: u64::MAX,
            blocks_available: u64::MAX,
            files: STATFS_FILES,
            files_free: u64::MAX,
            files_available: u64::MAX,
            fsid: STATFS_FSID,
            name_max: NAME_MAX as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splice_extends_and_overwrites() {
        let data = Bytes::from_static(b"hello");
        assert_eq!(splice(&data, 1, b"EL"), Bytes::from_static(b"hELlo"));
        assert_eq!(splice(&data, 7, b"!"), Bytes::from_static(b"hello\0\0!"));
        assert_eq!(splice(&data, 3, b"p me"), Bytes::from_static(b"help me"));
    }

    #[test]
    fn test_validate_filename() {
        assert_eq!(validate_filename(""), Err(FsError::InvalidArgument));
        assert_eq!(
            validate_filename(&"x".repeat(NAME_MAX + 1)),
            Err(FsError::InvalidArgument)
        );
        assert!(validate_filename(&"x".repeat(NAME_MAX)).is_ok());
    }

    #[test]
    fn test_validate_new_path_limits_full_length() {
        let name = "x".repeat(NAME_MAX);
        let parent = format!("/{}", "y".repeat(PATH_MAX - NAME_MAX - 2));
        assert!(validate_new_path(&parent, &name).is_ok());

        let parent = format!("{}z", parent);
        assert_eq!(
            validate_new_path(&parent, &name),
            Err(FsError::InvalidArgument)
        );
    }
}
