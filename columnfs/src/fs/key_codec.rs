use super::errors::FsError;
use bytes::Bytes;
use uuid::Uuid;

const PREFIX_DIRECTORIES: u8 = 0x01;
const PREFIX_FILES: u8 = 0x02;
const PREFIX_BLOB_CHUNKS: u8 = 0x03;
const PREFIX_BLOB_META: u8 = 0x04;

const TABLE_SIZE: usize = 1;
const PARTITION_LEN_SIZE: usize = 2;
const CHUNK_INDEX_SIZE: usize = 2;

/// Logical collections of the column store. Every key starts with the table
/// byte followed by a length-prefixed partition key, so one partition is
/// always a contiguous key range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Directories,
    Files,
    BlobChunks,
    BlobMeta,
}

impl TryFrom<u8> for Table {
    type Error = ();

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            PREFIX_DIRECTORIES => Ok(Self::Directories),
            PREFIX_FILES => Ok(Self::Files),
            PREFIX_BLOB_CHUNKS => Ok(Self::BlobChunks),
            PREFIX_BLOB_META => Ok(Self::BlobMeta),
            _ => Err(()),
        }
    }
}

impl From<Table> for u8 {
    fn from(table: Table) -> Self {
        match table {
            Table::Directories => PREFIX_DIRECTORIES,
            Table::Files => PREFIX_FILES,
            Table::BlobChunks => PREFIX_BLOB_CHUNKS,
            Table::BlobMeta => PREFIX_BLOB_META,
        }
    }
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Directories => "directories",
            Self::Files => "files",
            Self::BlobChunks => "blob_chunks",
            Self::BlobMeta => "blob_meta",
        }
    }

    pub fn of_key(key: &[u8]) -> Option<Table> {
        key.first().and_then(|&b| Table::try_from(b).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub table: Table,
    pub partition: Vec<u8>,
    pub clustering: Vec<u8>,
}

pub struct KeyCodec;

impl KeyCodec {
    pub fn partition_prefix(table: Table, partition: &[u8]) -> Bytes {
        let mut key = Vec::with_capacity(TABLE_SIZE + PARTITION_LEN_SIZE + partition.len());
        key.push(u8::from(table));
        key.extend_from_slice(&(partition.len() as u16).to_be_bytes());
        key.extend_from_slice(partition);
        Bytes::from(key)
    }

    fn row_key(table: Table, partition: &[u8], clustering: &[u8]) -> Bytes {
        let mut key = Vec::with_capacity(
            TABLE_SIZE + PARTITION_LEN_SIZE + partition.len() + clustering.len(),
        );
        key.push(u8::from(table));
        key.extend_from_slice(&(partition.len() as u16).to_be_bytes());
        key.extend_from_slice(partition);
        key.extend_from_slice(clustering);
        Bytes::from(key)
    }

    pub fn directory_key(parent_path: &str, name: &str) -> Bytes {
        Self::row_key(Table::Directories, parent_path.as_bytes(), name.as_bytes())
    }

    pub fn directory_partition(parent_path: &str) -> Bytes {
        Self::partition_prefix(Table::Directories, parent_path.as_bytes())
    }

    pub fn file_key(parent_path: &str, name: &str) -> Bytes {
        Self::row_key(Table::Files, parent_path.as_bytes(), name.as_bytes())
    }

    pub fn file_partition(parent_path: &str) -> Bytes {
        Self::partition_prefix(Table::Files, parent_path.as_bytes())
    }

    pub fn chunk_key(version: Uuid, chunk_index: u16) -> Bytes {
        Self::row_key(
            Table::BlobChunks,
            version.as_bytes(),
            &chunk_index.to_be_bytes(),
        )
    }

    pub fn chunk_partition(version: Uuid) -> Bytes {
        Self::partition_prefix(Table::BlobChunks, version.as_bytes())
    }

    pub fn blob_meta_key(blob_id: Uuid) -> Bytes {
        Self::row_key(Table::BlobMeta, blob_id.as_bytes(), &[])
    }

    /// Smallest key strictly greater than every key starting with `prefix`.
    pub fn prefix_end(prefix: &[u8]) -> Option<Bytes> {
        let mut end = prefix.to_vec();
        while let Some(last) = end.pop() {
            if last < u8::MAX {
                end.push(last + 1);
                return Some(Bytes::from(end));
            }
        }
        None
    }

    pub fn parse_key(key: &[u8]) -> Option<ParsedKey> {
        let table = Table::of_key(key)?;
        let len_bytes: [u8; PARTITION_LEN_SIZE] = key
            .get(TABLE_SIZE..TABLE_SIZE + PARTITION_LEN_SIZE)?
            .try_into()
            .ok()?;
        let partition_len = u16::from_be_bytes(len_bytes) as usize;
        let partition_start = TABLE_SIZE + PARTITION_LEN_SIZE;
        let partition = key.get(partition_start..partition_start + partition_len)?;
        let clustering = key.get(partition_start + partition_len..)?;
        Some(ParsedKey {
            table,
            partition: partition.to_vec(),
            clustering: clustering.to_vec(),
        })
    }

    /// Name component of a directory or file row key.
    pub fn parse_entry_name(key: &[u8]) -> Result<String, FsError> {
        let parsed = Self::parse_key(key).ok_or(FsError::StorageCorrupted)?;
        String::from_utf8(parsed.clustering).map_err(|_| FsError::StorageCorrupted)
    }

    pub fn parse_chunk_index(key: &[u8]) -> Option<u16> {
        let parsed = Self::parse_key(key)?;
        if parsed.table != Table::BlobChunks || parsed.clustering.len() != CHUNK_INDEX_SIZE {
            return None;
        }
        let bytes: [u8; CHUNK_INDEX_SIZE] = parsed.clustering.as_slice().try_into().ok()?;
        Some(u16::from_be_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_key_layout() {
        // [table | partition_len(2 bytes BE) | partition | clustering]
        let key = KeyCodec::file_key("/d", "f.txt");
        assert_eq!(key[0], u8::from(Table::Files));
        assert_eq!(&key[1..3], &2u16.to_be_bytes());
        assert_eq!(&key[3..5], b"/d");
        assert_eq!(&key[5..], b"f.txt");
        assert!(key.starts_with(&KeyCodec::file_partition("/d")));
    }

    #[test]
    fn test_partitions_do_not_overlap_on_shared_prefix() {
        // "/a" must not scan rows of "/ab".
        let partition = KeyCodec::directory_partition("/a");
        let foreign = KeyCodec::directory_key("/ab", "x");
        assert!(!foreign.starts_with(&partition));
    }

    #[test]
    fn test_chunk_keys_sort_by_index() {
        let version = Uuid::new_v4();
        let keys: Vec<Bytes> = [0u16, 1, 9, 10, 255, 256]
            .iter()
            .map(|i| KeyCodec::chunk_key(version, *i))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(KeyCodec::parse_chunk_index(&keys[4]), Some(255));
    }

    #[test]
    fn test_parse_entry_name() {
        let key = KeyCodec::directory_key("/", "docs");
        assert_eq!(KeyCodec::parse_entry_name(&key).unwrap(), "docs");
        let parsed = KeyCodec::parse_key(&key).unwrap();
        assert_eq!(parsed.table, Table::Directories);
        assert_eq!(parsed.partition, b"/");
    }

    #[test]
    fn test_prefix_end() {
        assert_eq!(
            KeyCodec::prefix_end(&[0x01, 0x02]),
            Some(Bytes::from_static(&[0x01, 0x03]))
        );
        assert_eq!(
            KeyCodec::prefix_end(&[0x01, 0xFF]),
            Some(Bytes::from_static(&[0x02]))
        );
        assert_eq!(KeyCodec::prefix_end(&[0xFF]), None);
    }

    #[test]
    fn test_invalid_key_parsing() {
        assert!(KeyCodec::parse_key(&[]).is_none());
        assert!(KeyCodec::parse_key(&[0xFF, 0, 0]).is_none());
        assert!(KeyCodec::parse_key(&[PREFIX_FILES, 0, 9, b'/']).is_none());
        assert!(KeyCodec::parse_chunk_index(&KeyCodec::blob_meta_key(Uuid::nil())).is_none());
    }
}
