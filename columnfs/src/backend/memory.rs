use super::{Cell, ColumnStore, WriteStamp};
use crate::fs::clock::Clock;
use crate::fs::key_codec::KeyCodec;
use crate::fs::types::Timestamp;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock, RwLockReadGuard};

/// Process-local column store. Expiry is evaluated against the injected
/// clock, so tests can make TTLs elapse by advancing a `ManualClock`.
pub struct MemoryStore {
    cells: RwLock<BTreeMap<Bytes, Cell>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            cells: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    fn apply(&self, key: &Bytes, cell: Cell) -> Result<()> {
        let now = self.clock.now();
        let mut cells = self
            .cells
            .write()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        match cells.get(key) {
            Some(existing) if !existing.is_superseded_by(cell.timestamp, now) => {}
            _ => {
                cells.insert(key.clone(), cell);
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<RwLockReadGuard<'_, BTreeMap<Bytes, Cell>>> {
        self.cells
            .read()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

#[async_trait]
impl ColumnStore for MemoryStore {
    async fn get(&self, key: &Bytes) -> Result<Option<Bytes>> {
        let now = self.clock.now();
        let cells = self.snapshot()?;
        Ok(cells
            .get(key)
            .and_then(|cell| cell.live_value(now))
            .map(Bytes::copy_from_slice))
    }

    async fn put(&self, key: &Bytes, value: Bytes, stamp: WriteStamp) -> Result<()> {
        self.apply(key, Cell::live(value.to_vec(), stamp))
    }

    async fn delete(&self, key: &Bytes, timestamp: Timestamp) -> Result<()> {
        self.apply(key, Cell::deleted(timestamp, None))
    }

    async fn scan_page(
        &self,
        prefix: &Bytes,
        start_after: Option<&Bytes>,
        limit: usize,
    ) -> Result<Vec<(Bytes, Bytes)>> {
        let now = self.clock.now();
        let cells = self.snapshot()?;

        let lower = match start_after {
            Some(cursor) => Bound::Excluded(cursor.clone()),
            None => Bound::Included(prefix.clone()),
        };
        let upper = match KeyCodec::prefix_end(prefix) {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };

        Ok(cells
            .range((lower, upper))
            .filter_map(|(key, cell)| {
                cell.live_value(now)
                    .map(|value| (key.clone(), Bytes::copy_from_slice(value)))
            })
            .take(limit)
            .collect())
    }

    async fn dump(&self) -> Result<Vec<(Bytes, Cell)>> {
        let cells = self.snapshot()?;
        Ok(cells
            .iter()
            .map(|(key, cell)| (key.clone(), cell.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::clock::ManualClock;
    use std::time::Duration;

    fn store() -> (Arc<ManualClock>, MemoryStore) {
        let clock = Arc::new(ManualClock::default());
        (clock.clone(), MemoryStore::new(clock))
    }

    #[tokio::test]
    async fn test_older_write_is_ignored() {
        let (clock, store) = store();
        let key = Bytes::from_static(b"k");
        let older = clock.now();
        let newer = clock.now();

        store
            .put(&key, Bytes::from_static(b"new"), WriteStamp::permanent(newer))
            .await
            .unwrap();
        store
            .put(&key, Bytes::from_static(b"old"), WriteStamp::permanent(older))
            .await
            .unwrap();

        assert_eq!(store.get(&key).await.unwrap(), Some(Bytes::from_static(b"new")));
    }

    #[tokio::test]
    async fn test_delete_blocks_older_resurrection() {
        let (clock, store) = store();
        let key = Bytes::from_static(b"k");
        let before = clock.now();
        store.delete(&key, clock.now()).await.unwrap();
        store
            .put(&key, Bytes::from_static(b"late"), WriteStamp::permanent(before))
            .await
            .unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);

        store
            .put(&key, Bytes::from_static(b"again"), WriteStamp::permanent(clock.now()))
            .await
            .unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(Bytes::from_static(b"again")));
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let (clock, store) = store();
        let key = Bytes::from_static(b"k");
        store
            .put(
                &key,
                Bytes::from_static(b"v"),
                WriteStamp::new(clock.now(), Some(Duration::from_secs(10))),
            )
            .await
            .unwrap();
        assert!(store.get(&key).await.unwrap().is_some());

        clock.advance(Duration::from_secs(11));
        assert!(store.get(&key).await.unwrap().is_none());
        assert!(
            store
                .scan_page(&Bytes::from_static(b"k"), None, 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_scan_page_respects_cursor_and_limit() {
        let (clock, store) = store();
        for name in ["a", "b", "c", "d"] {
            let key = KeyCodec::file_key("/", name);
            store
                .put(&key, Bytes::from(name.as_bytes().to_vec()), WriteStamp::permanent(clock.now()))
                .await
                .unwrap();
        }
        let prefix = KeyCodec::file_partition("/");

        let first = store.scan_page(&prefix, None, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].1, Bytes::from_static(b"b"));

        let rest = store.scan_page(&prefix, Some(&first[1].0), 10).await.unwrap();
        let names: Vec<_> = rest.iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(names, vec![Bytes::from_static(b"c"), Bytes::from_static(b"d")]);
    }
}
