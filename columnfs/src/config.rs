use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_INLINE_THRESHOLD: usize = 4 * 1024 * 1024;
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;
pub const DEFAULT_MAX_CHUNKS_PER_BLOB: u32 = 64;
pub const DEFAULT_FILE_TTL_SECS: u64 = 14 * 24 * 60 * 60;
pub const DEFAULT_OBSOLETE_TTL_SECS: u64 = 10 * 60;
pub const DEFAULT_TOMBSTONE_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub storage: StorageConfig,
    #[serde(default)]
    pub filesystem: FilesystemConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    pub url: String,
    /// Passed through to the object store (credentials, region, endpoint).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub options: HashMap<String, String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: "memory:///".to_string(),
            options: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FilesystemConfig {
    /// Content up to and including this many bytes is stored inline.
    pub inline_threshold: usize,
    pub chunk_size: usize,
    pub max_chunks_per_blob: u32,
    /// Expiry for file rows and their blobs; 0 keeps them forever.
    pub file_ttl_secs: u64,
    pub obsolete_ttl_secs: u64,
    pub tombstone_ttl_secs: u64,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunks_per_blob: DEFAULT_MAX_CHUNKS_PER_BLOB,
            file_ttl_secs: DEFAULT_FILE_TTL_SECS,
            obsolete_ttl_secs: DEFAULT_OBSOLETE_TTL_SECS,
            tombstone_ttl_secs: DEFAULT_TOMBSTONE_TTL_SECS,
        }
    }
}

impl FilesystemConfig {
    pub fn file_ttl(&self) -> Option<Duration> {
        (self.file_ttl_secs > 0).then(|| Duration::from_secs(self.file_ttl_secs))
    }

    pub fn obsolete_ttl(&self) -> Duration {
        Duration::from_secs(self.obsolete_ttl_secs)
    }

    pub fn tombstone_ttl(&self) -> Option<Duration> {
        (self.tombstone_ttl_secs > 0).then(|| Duration::from_secs(self.tombstone_ttl_secs))
    }

    pub fn max_blob_size(&self) -> usize {
        self.chunk_size.saturating_mul(self.max_chunks_per_blob as usize)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConnectionConfig {
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff_ms: 5000,
        }
    }
}

impl Settings {
    pub fn from_file(config_path: impl AsRef<Path>) -> Result<Self> {
        let path = config_path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let fs = &self.filesystem;
        if fs.chunk_size == 0 {
            bail!("filesystem.chunk_size must be greater than 0");
        }
        if fs.max_chunks_per_blob == 0 || fs.max_chunks_per_blob > u16::MAX as u32 {
            bail!(
                "filesystem.max_chunks_per_blob must be between 1 and {}",
                u16::MAX
            );
        }
        if fs.obsolete_ttl_secs == 0 {
            bail!("filesystem.obsolete_ttl_secs must be at least 1");
        }
        if self.connection.attempts == 0 {
            bail!("connection.attempts must be at least 1");
        }
        self.storage
            .url
            .parse::<url::Url>()
            .with_context(|| format!("storage.url '{}' is not a valid url", self.storage.url))?;
        Ok(())
    }

    pub fn generate_default() -> String {
        let defaults = FilesystemConfig::default();
        let connection = ConnectionConfig::default();
        format!(
            r#"# columnfs configuration

[storage]
# file:///var/lib/columnfs, s3://bucket/prefix, gs://bucket/prefix,
# az://container/prefix or memory:/// for a throwaway in-process store
url = "file:///var/lib/columnfs"

# Object store options, for example credentials for s3://
# [storage.options]
# aws_access_key_id = "..."
# aws_secret_access_key = "..."
# aws_region = "us-east-1"

[filesystem]
# Files up to this size (bytes) are stored inline in their row
inline_threshold = {}
# Larger files are split into chunks of this size
chunk_size = {}
max_chunks_per_blob = {}
# Expiry of file rows and blobs in seconds, 0 disables expiry
file_ttl_secs = {}
# Superseded chunks linger this long before the store reclaims them
obsolete_ttl_secs = {}
tombstone_ttl_secs = {}

[connection]
attempts = {}
backoff_ms = {}
"#,
            defaults.inline_threshold,
            defaults.chunk_size,
            defaults.max_chunks_per_blob,
            defaults.file_ttl_secs,
            defaults.obsolete_ttl_secs,
            defaults.tombstone_ttl_secs,
            connection.attempts,
            connection.backoff_ms,
        )
    }

    pub fn write_default_config(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, Self::generate_default())
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let settings: Settings = toml::from_str(&Settings::generate_default()).unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.filesystem.inline_threshold, DEFAULT_INLINE_THRESHOLD);
        assert_eq!(settings.filesystem.file_ttl(), Some(Duration::from_secs(1209600)));
        assert_eq!(settings.connection.attempts, 5);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [storage]
            url = "memory:///"
            "#,
        )
        .unwrap();
        assert_eq!(settings.filesystem.max_blob_size(), 64 * DEFAULT_CHUNK_SIZE);
        assert_eq!(settings.filesystem.obsolete_ttl(), Duration::from_secs(600));
    }

    #[test]
    fn test_zero_file_ttl_disables_expiry() {
        let settings: Settings = toml::from_str(
            r#"
            [storage]
            url = "memory:///"

            [filesystem]
            file_ttl_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(settings.filesystem.file_ttl(), None);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.filesystem.chunk_size = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.filesystem.max_chunks_per_blob = 70_000;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.filesystem.obsolete_ttl_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result: Result<Settings, _> = toml::from_str(
            r#"
            [storage]
            url = "memory:///"
            bogus = 1
            "#,
        );
        assert!(result.is_err());
    }
}
