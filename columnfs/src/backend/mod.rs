pub mod memory;
pub mod slate;

use crate::config::Settings;
use crate::fs::clock::Clock;
use crate::fs::types::Timestamp;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use memory::MemoryStore;
pub use slate::SlateStore;

/// Timestamp and optional time-to-live attached to every upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteStamp {
    pub timestamp: Timestamp,
    pub ttl: Option<Duration>,
}

impl WriteStamp {
    pub fn new(timestamp: Timestamp, ttl: Option<Duration>) -> Self {
        Self { timestamp, ttl }
    }

    pub fn permanent(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            ttl: None,
        }
    }
}

/// One stored version of a row. `value == None` is a deletion marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub timestamp: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub value: Option<Vec<u8>>,
}

impl Cell {
    pub fn live(value: Vec<u8>, stamp: WriteStamp) -> Self {
        Self {
            timestamp: stamp.timestamp,
            expires_at: stamp.ttl.map(|ttl| stamp.timestamp.saturating_add(ttl)),
            value: Some(value),
        }
    }

    pub fn deleted(timestamp: Timestamp, retention: Option<Duration>) -> Self {
        Self {
            timestamp,
            expires_at: retention.map(|ttl| timestamp.saturating_add(ttl)),
            value: None,
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn live_value(&self, now: Timestamp) -> Option<&[u8]> {
        if self.is_expired(now) {
            None
        } else {
            self.value.as_deref()
        }
    }

    /// Last write wins; on a timestamp tie the incoming write is applied.
    /// An expired cell never blocks a write.
    pub fn is_superseded_by(&self, incoming: Timestamp, now: Timestamp) -> bool {
        self.is_expired(now) || incoming >= self.timestamp
    }
}

/// Wide-column store boundary: timestamped upserts and deletes with
/// per-write expiry, point reads and paged prefix scans. No multi-row
/// atomicity is offered.
#[async_trait]
pub trait ColumnStore: Send + Sync {
    async fn get(&self, key: &Bytes) -> Result<Option<Bytes>>;

    async fn put(&self, key: &Bytes, value: Bytes, stamp: WriteStamp) -> Result<()>;

    async fn delete(&self, key: &Bytes, timestamp: Timestamp) -> Result<()>;

    /// Live rows starting with `prefix`, ascending, strictly after
    /// `start_after` when given, at most `limit` of them.
    async fn scan_page(
        &self,
        prefix: &Bytes,
        start_after: Option<&Bytes>,
        limit: usize,
    ) -> Result<Vec<(Bytes, Bytes)>>;

    /// Every stored cell including deletion markers and expired rows.
    async fn dump(&self) -> Result<Vec<(Bytes, Cell)>>;

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct ScanState {
    store: Arc<dyn ColumnStore>,
    prefix: Bytes,
    cursor: Option<Bytes>,
    buffered: VecDeque<(Bytes, Bytes)>,
    page_size: usize,
    exhausted: bool,
}

/// Streams every live row under `prefix`, fetching `page_size` rows per
/// round trip.
pub fn scan_prefix(
    store: Arc<dyn ColumnStore>,
    prefix: Bytes,
    page_size: usize,
) -> impl Stream<Item = Result<(Bytes, Bytes)>> + Send {
    let state = ScanState {
        store,
        prefix,
        cursor: None,
        buffered: VecDeque::new(),
        page_size: page_size.max(1),
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.buffered.is_empty() && !state.exhausted {
            let page = state
                .store
                .scan_page(&state.prefix, state.cursor.as_ref(), state.page_size)
                .await;
            match page {
                Ok(rows) => {
                    state.exhausted = rows.len() < state.page_size;
                    state.cursor = rows.last().map(|(key, _)| key.clone());
                    state.buffered.extend(rows);
                }
                Err(e) => {
                    state.exhausted = true;
                    return Some((Err(e), state));
                }
            }
        }

        let row = state.buffered.pop_front()?;
        Some((Ok(row), state))
    })
}

/// Connects to the backend named by `storage.url`, retrying the connection
/// `connection.attempts` times. Only startup is retried.
pub async fn open(settings: &Settings, clock: Arc<dyn Clock>) -> Result<Arc<dyn ColumnStore>> {
    let url: url::Url = settings
        .storage
        .url
        .parse()
        .with_context(|| format!("Invalid storage url '{}'", settings.storage.url))?;

    if url.scheme() == "memory" {
        info!("Using in-memory column store");
        return Ok(Arc::new(MemoryStore::new(clock)));
    }

    let attempts = settings.connection.attempts.max(1);
    let backoff = Duration::from_millis(settings.connection.backoff_ms);
    let mut attempt = 1;
    loop {
        match SlateStore::open(&url, settings, clock.clone()).await {
            Ok(store) => {
                info!("Connected to {} (attempt {})", url, attempt);
                return Ok(Arc::new(store));
            }
            Err(e) if attempt < attempts => {
                warn!(
                    "Connection attempt {}/{} to {} failed: {:#}; retrying in {:?}",
                    attempt, attempts, url, e, backoff
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(e.context(format!(
                    "Failed to connect to {} after {} attempts",
                    url, attempts
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::clock::ManualClock;
    use crate::fs::key_codec::KeyCodec;
    use futures::TryStreamExt;

    #[test]
    fn test_cell_last_write_wins() {
        let t1 = Timestamp::from_nanos(1_000);
        let t2 = Timestamp::from_nanos(2_000);
        let cell = Cell::live(b"v".to_vec(), WriteStamp::permanent(t2));
        assert!(!cell.is_superseded_by(t1, t2));
        assert!(cell.is_superseded_by(t2, t2));
    }

    #[test]
    fn test_cell_expiry() {
        let t = Timestamp::from_nanos(0);
        let cell = Cell::live(b"v".to_vec(), WriteStamp::new(t, Some(Duration::from_secs(1))));
        assert_eq!(cell.live_value(t), Some(&b"v"[..]));
        assert_eq!(cell.live_value(t.saturating_add(Duration::from_secs(1))), None);
    }

    #[tokio::test]
    async fn test_scan_prefix_pages_through_all_rows() {
        let clock = Arc::new(ManualClock::default());
        let store: Arc<dyn ColumnStore> = Arc::new(MemoryStore::new(clock.clone()));
        for i in 0..25u16 {
            let key = KeyCodec::chunk_key(uuid::Uuid::nil(), i);
            store
                .put(&key, Bytes::from(vec![i as u8]), WriteStamp::permanent(clock.now()))
                .await
                .unwrap();
        }
        let other = KeyCodec::chunk_key(uuid::Uuid::from_u128(1), 0);
        store
            .put(&other, Bytes::from_static(b"x"), WriteStamp::permanent(clock.now()))
            .await
            .unwrap();

        let rows: Vec<(Bytes, Bytes)> =
            scan_prefix(store, KeyCodec::chunk_partition(uuid::Uuid::nil()), 10)
                .try_collect()
                .await
                .unwrap();
        assert_eq!(rows.len(), 25);
        for (i, (_, value)) in rows.iter().enumerate() {
            assert_eq!(value[0], i as u8);
        }
    }
}
