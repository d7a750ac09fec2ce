use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("Is a directory")]
    IsDirectory,
    #[error("Not a directory")]
    NotDirectory,
    #[error("No such file or directory")]
    NoEntry,
    #[error("Entry already exists")]
    AlreadyExist,
    #[error("Directory not empty")]
    DirectoryNotEmpty,
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("No such attribute")]
    NoAttribute,
    #[error("Buffer too small for value")]
    OutOfRange,
    #[error("Operation not permitted")]
    PermissionDenied,
    #[error("Permission denied")]
    AccessDenied,
    #[error("Stored content is corrupted")]
    StorageCorrupted,
    /// Backing store round trip failed. Not part of the path taxonomy.
    #[error("I/O error")]
    IoError,
}

impl FsError {
    pub fn to_errno(self) -> i32 {
        match self {
            FsError::IsDirectory => libc::EISDIR,
            FsError::NotDirectory => libc::ENOTDIR,
            FsError::NoEntry => libc::ENOENT,
            FsError::AlreadyExist => libc::EEXIST,
            FsError::DirectoryNotEmpty => libc::ENOTEMPTY,
            FsError::InvalidArgument => libc::EINVAL,
            FsError::NoAttribute => libc::ENODATA,
            FsError::OutOfRange => libc::ERANGE,
            FsError::PermissionDenied => libc::EPERM,
            FsError::AccessDenied => libc::EACCES,
            FsError::StorageCorrupted | FsError::IoError => libc::EIO,
        }
    }
}

/// Guard combinator for chained validation, complementing `map` and `and_then`.
pub trait Ensure<T> {
    fn ensure<F>(self, predicate: F, error: FsError) -> Result<T, FsError>
    where
        F: FnOnce(&T) -> bool;
}

impl<T> Ensure<T> for Result<T, FsError> {
    fn ensure<F>(self, predicate: F, error: FsError) -> Result<T, FsError>
    where
        F: FnOnce(&T) -> bool,
    {
        match self {
            Ok(value) if predicate(&value) => Ok(value),
            Ok(_) => Err(error),
            Err(e) => Err(e),
        }
    }
}

pub fn ensure(condition: bool, error: FsError) -> Result<(), FsError> {
    if condition { Ok(()) } else { Err(error) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_passes_value_through() {
        let result: Result<u32, FsError> = Ok(7);
        assert_eq!(result.ensure(|v| *v == 7, FsError::InvalidArgument), Ok(7));
    }

    #[test]
    fn test_ensure_replaces_value_with_error() {
        let result: Result<u32, FsError> = Ok(7);
        assert_eq!(
            result.ensure(|v| *v > 10, FsError::OutOfRange),
            Err(FsError::OutOfRange)
        );
    }

    #[test]
    fn test_ensure_keeps_first_error() {
        let result: Result<u32, FsError> = Err(FsError::NoEntry);
        assert_eq!(
            result.ensure(|_| false, FsError::OutOfRange),
            Err(FsError::NoEntry)
        );
    }

    #[test]
    fn test_errno_mapping() {
        assert_eq!(FsError::NoEntry.to_errno(), libc::ENOENT);
        assert_eq!(FsError::DirectoryNotEmpty.to_errno(), libc::ENOTEMPTY);
        assert_eq!(FsError::AccessDenied.to_errno(), libc::EACCES);
        assert_eq!(FsError::PermissionDenied.to_errno(), libc::EPERM);
        assert_eq!(FsError::StorageCorrupted.to_errno(), libc::EIO);
    }
}
