pub mod blob;
pub mod directory;
pub mod file;

pub use blob::{BlobMeta, BlobStore};
pub use directory::DirectoryStore;
pub use file::FileStore;

use crate::fs::errors::FsError;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::error;

/// Page size used when listing the children of a directory.
pub(crate) const LIST_PAGE_SIZE: usize = 256;

pub(crate) fn backend_error(operation: &str, e: anyhow::Error) -> FsError {
    error!("Backend failure during {}: {:#}", operation, e);
    FsError::IoError
}

pub(crate) fn encode_row<T: Serialize>(row: &T) -> Result<Bytes, FsError> {
    bincode::serialize(row).map(Bytes::from).map_err(|e| {
        error!("Failed to serialize row: {}", e);
        FsError::IoError
    })
}

pub(crate) fn decode_row<T: DeserializeOwned>(data: &[u8]) -> Result<T, FsError> {
    bincode::deserialize(data).map_err(|e| {
        error!("Failed to deserialize row: {}", e);
        FsError::StorageCorrupted
    })
}
