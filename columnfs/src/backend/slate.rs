use super::{Cell, ColumnStore, WriteStamp};
use crate::config::Settings;
use crate::fs::clock::Clock;
use crate::fs::key_codec::{KeyCodec, Table};
use crate::fs::types::Timestamp;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use slatedb::config::{DurabilityLevel, PutOptions, ReadOptions, ScanOptions, Ttl, WriteOptions};
use slatedb::object_store::{ObjectStore, path::Path};
use slatedb::{Db, DbBuilder};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Column store persisted in SlateDB. Every row is a bincode encoded
/// [`Cell`]; timestamps are compared on write so a late, older write never
/// replaces a newer one. Expiry is checked on read and also handed to
/// SlateDB as a per-put TTL so compaction reclaims the space.
pub struct SlateStore {
    db: Arc<Db>,
    clock: Arc<dyn Clock>,
    tombstone_ttl: Option<Duration>,
}

fn read_options() -> ReadOptions {
    ReadOptions {
        durability_filter: DurabilityLevel::Memory,
        ..Default::default()
    }
}

fn scan_options() -> ScanOptions {
    ScanOptions {
        durability_filter: DurabilityLevel::Memory,
        read_ahead_bytes: 1024 * 1024,
        cache_blocks: true,
        max_fetch_tasks: 8,
        ..Default::default()
    }
}

const WRITE_OPTIONS: WriteOptions = WriteOptions {
    await_durable: false,
};

fn is_compressed(key: &[u8]) -> bool {
    Table::of_key(key) == Some(Table::BlobChunks)
}

fn encode_cell(key: &[u8], mut cell: Cell) -> Result<Vec<u8>> {
    if is_compressed(key)
        && let Some(value) = cell.value.take()
    {
        cell.value = Some(lz4_flex::compress_prepend_size(&value));
    }
    Ok(bincode::serialize(&cell)?)
}

fn decode_cell(key: &[u8], raw: &[u8]) -> Result<Cell> {
    let mut cell: Cell = bincode::deserialize(raw).context("Malformed cell envelope")?;
    if is_compressed(key)
        && let Some(value) = cell.value.take()
    {
        cell.value = Some(
            lz4_flex::decompress_size_prepended(&value).context("Malformed chunk payload")?,
        );
    }
    Ok(cell)
}

impl SlateStore {
    pub async fn open(url: &url::Url, settings: &Settings, clock: Arc<dyn Clock>) -> Result<Self> {
        if url.scheme() == "file" {
            tokio::fs::create_dir_all(url.path())
                .await
                .with_context(|| format!("Failed to create {}", url.path()))?;
        }

        let (object_store, db_path) =
            slatedb::object_store::parse_url_opts(url, settings.storage.options.iter())
                .with_context(|| format!("Unsupported storage url {}", url))?;
        let object_store: Arc<dyn ObjectStore> = Arc::from(object_store);

        Self::with_object_store(object_store, db_path, settings, clock).await
    }

    pub async fn with_object_store(
        object_store: Arc<dyn ObjectStore>,
        db_path: Path,
        settings: &Settings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let slate_settings = slatedb::config::Settings {
            // Chunk payloads are lz4 compressed before they reach SlateDB.
            compression_codec: None,
            compactor_options: Some(slatedb::config::CompactorOptions {
                ..Default::default()
            }),
            ..Default::default()
        };

        let db = DbBuilder::new(db_path, object_store)
            .with_settings(slate_settings)
            .build()
            .await
            .context("Failed to open SlateDB")?;

        Ok(Self {
            db: Arc::new(db),
            clock,
            tombstone_ttl: settings.filesystem.tombstone_ttl(),
        })
    }

    async fn read_cell(&self, key: &Bytes) -> Result<Option<Cell>> {
        match self.db.get_with_options(key, &read_options()).await? {
            Some(raw) => Ok(Some(decode_cell(key, &raw)?)),
            None => Ok(None),
        }
    }

    async fn write_cell(&self, key: &Bytes, cell: Cell) -> Result<()> {
        let now = self.clock.now();
        if let Some(existing) = self.read_cell(key).await?
            && !existing.is_superseded_by(cell.timestamp, now)
        {
            debug!("Skipping stale write to {:?}", key);
            return Ok(());
        }

        let ttl = match cell.expires_at {
            Some(at) => {
                let remaining = at.as_nanos().saturating_sub(now.as_nanos());
                Ttl::ExpireAfter((remaining / 1_000_000).max(1) as u64)
            }
            None => Ttl::NoExpiry,
        };

        let encoded = encode_cell(key, cell)?;
        self.db
            .put_with_options(key, &encoded, &PutOptions { ttl }, &WRITE_OPTIONS)
            .await
            .map_err(|e| {
                error!("SlateDB put failed: {}", e);
                anyhow::Error::from(e)
            })
    }
}

#[async_trait]
impl ColumnStore for SlateStore {
    async fn get(&self, key: &Bytes) -> Result<Option<Bytes>> {
        let now = self.clock.now();
        Ok(self
            .read_cell(key)
            .await?
            .and_then(|cell| cell.live_value(now).map(Bytes::copy_from_slice)))
    }

    async fn put(&self, key: &Bytes, value: Bytes, stamp: WriteStamp) -> Result<()> {
        self.write_cell(key, Cell::live(value.to_vec(), stamp)).await
    }

    async fn delete(&self, key: &Bytes, timestamp: Timestamp) -> Result<()> {
        self.write_cell(key, Cell::deleted(timestamp, self.tombstone_ttl))
            .await
    }

    async fn scan_page(
        &self,
        prefix: &Bytes,
        start_after: Option<&Bytes>,
        limit: usize,
    ) -> Result<Vec<(Bytes, Bytes)>> {
        let now = self.clock.now();
        let lower = match start_after {
            Some(cursor) => Bound::Excluded(cursor.clone()),
            None => Bound::Included(prefix.clone()),
        };
        let upper = match KeyCodec::prefix_end(prefix) {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };

        let mut iter = self
            .db
            .scan_with_options((lower, upper), &scan_options())
            .await?;

        let mut rows = Vec::with_capacity(limit.min(64));
        while rows.len() < limit {
            let Some(kv) = iter.next().await? else {
                break;
            };
            let cell = decode_cell(&kv.key, &kv.value)?;
            if let Some(value) = cell.live_value(now) {
                rows.push((kv.key, Bytes::copy_from_slice(value)));
            }
        }
        Ok(rows)
    }

    async fn dump(&self) -> Result<Vec<(Bytes, Cell)>> {
        let mut iter = self
            .db
            .scan_with_options(
                (Bound::<Bytes>::Unbounded, Bound::<Bytes>::Unbounded),
                &scan_options(),
            )
            .await?;

        let mut cells = Vec::new();
        while let Some(kv) = iter.next().await? {
            let cell = decode_cell(&kv.key, &kv.value)?;
            cells.push((kv.key, cell));
        }
        Ok(cells)
    }

    async fn flush(&self) -> Result<()> {
        self.db.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.db.close().await?;
        Ok(())
    }
}
