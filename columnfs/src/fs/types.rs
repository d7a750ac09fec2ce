use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    Regular,
    Directory,
}

impl FileKind {
    pub fn type_bits(self) -> u32 {
        match self {
            FileKind::Regular => S_IFREG,
            FileKind::Directory => S_IFDIR,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub seconds: u64,
    pub nanoseconds: u32,
}

impl Timestamp {
    pub const EPOCH: Timestamp = Timestamp {
        seconds: 0,
        nanoseconds: 0,
    };

    pub fn from_nanos(nanos: u128) -> Self {
        Self {
            seconds: (nanos / 1_000_000_000) as u64,
            nanoseconds: (nanos % 1_000_000_000) as u32,
        }
    }

    pub fn as_nanos(&self) -> u128 {
        self.seconds as u128 * 1_000_000_000 + self.nanoseconds as u128
    }

    pub fn saturating_add(&self, duration: Duration) -> Self {
        Self::from_nanos(self.as_nanos().saturating_add(duration.as_nanos()))
    }
}

/// Attributes synthesized for lookup/getattr. `nlink` is always 1: hard links
/// are not supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub kind: FileKind,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub blocks: u64,
    pub block_size: u32,
    pub atime: Timestamp,
    pub mtime: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatFs {
    pub block_size: u64,
    pub fragment_size: u64,
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
    pub files: u64,
    pub files_free: u64,
    pub files_available: u64,
    pub fsid: u64,
    pub name_max: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub stat: FileStat,
}

/// The subset of open(2) flags the filesystem acts on. O_APPEND is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub create: bool,
    pub truncate: bool,
}

impl OpenFlags {
    pub fn from_bits(flags: i32) -> Self {
        Self {
            create: flags & libc::O_CREAT != 0,
            truncate: flags & libc::O_TRUNC != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum XattrFlags {
    #[default]
    CreateOrReplace,
    CreateOnly,
    ReplaceOnly,
}

impl XattrFlags {
    pub fn from_bits(flags: i32) -> Self {
        if flags & libc::XATTR_CREATE != 0 {
            XattrFlags::CreateOnly
        } else if flags & libc::XATTR_REPLACE != 0 {
            XattrFlags::ReplaceOnly
        } else {
            XattrFlags::CreateOrReplace
        }
    }
}

/// access(2) request; `F_OK` is the all-false mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessMask {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl AccessMask {
    pub fn from_bits(mask: i32) -> Self {
        Self {
            read: mask & libc::R_OK != 0,
            write: mask & libc::W_OK != 0,
            execute: mask & libc::X_OK != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_ordering_and_arithmetic() {
        let a = Timestamp {
            seconds: 10,
            nanoseconds: 999_999_999,
        };
        let b = a.saturating_add(Duration::from_nanos(1));
        assert_eq!(
            b,
            Timestamp {
                seconds: 11,
                nanoseconds: 0
            }
        );
        assert!(a < b);
        assert_eq!(Timestamp::from_nanos(a.as_nanos()), a);
    }

    #[test]
    fn test_flag_decoding() {
        let flags = OpenFlags::from_bits(libc::O_CREAT | libc::O_WRONLY);
        assert!(flags.create);
        assert!(!flags.truncate);

        assert_eq!(
            XattrFlags::from_bits(libc::XATTR_REPLACE),
            XattrFlags::ReplaceOnly
        );
        assert_eq!(XattrFlags::from_bits(0), XattrFlags::CreateOrReplace);

        let mask = AccessMask::from_bits(libc::R_OK | libc::X_OK);
        assert!(mask.read && mask.execute && !mask.write);
    }
}
