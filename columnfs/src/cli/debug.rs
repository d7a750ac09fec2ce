use crate::backend;
use crate::config::Settings;
use crate::fs::clock::{Clock, SystemClock};
use crate::fs::key_codec::{KeyCodec, Table};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

pub async fn list_keys(config_path: &Path) -> Result<()> {
    let settings = Settings::from_file(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let store = backend::open(&settings, clock.clone()).await?;
    let now = clock.now();

    println!("Scanning all keys in the store...\n");

    let mut count = 0;
    let mut count_by_table: HashMap<Table, usize> = HashMap::new();

    for (key, cell) in store.dump().await? {
        let Some(parsed) = KeyCodec::parse_key(&key) else {
            if key.is_empty() {
                println!("Empty key found");
            } else {
                println!("Unknown key: {:?}", key);
            }
            continue;
        };

        *count_by_table.entry(parsed.table).or_insert(0) += 1;
        count += 1;

        print!("[{}] ", parsed.table.as_str());

        match parsed.table {
            Table::Directories | Table::Files => {
                println!(
                    "parent=\"{}\", name=\"{}\"",
                    String::from_utf8_lossy(&parsed.partition),
                    String::from_utf8_lossy(&parsed.clustering)
                );
            }
            Table::BlobChunks => match (
                Uuid::from_slice(&parsed.partition),
                KeyCodec::parse_chunk_index(&key),
            ) {
                (Ok(version), Some(index)) => {
                    println!("version={}, chunk_index={}", version, index)
                }
                _ => println!("raw={:?}", key),
            },
            Table::BlobMeta => match Uuid::from_slice(&parsed.partition) {
                Ok(blob_id) => println!("blob_id={}", blob_id),
                Err(_) => println!("raw={:?}", key),
            },
        }

        if cell.value.is_none() {
            println!("    (deleted at {}s)", cell.timestamp.seconds);
        } else if cell.is_expired(now) {
            println!("    (expired)");
        } else if let Some(expires_at) = cell.expires_at {
            println!("    (expires at {}s)", expires_at.seconds);
        }
    }

    println!("\n=== Summary ===");
    println!("Total keys: {}", count);
    println!("\nKeys by table:");

    let mut table_counts: Vec<_> = count_by_table.iter().collect();
    table_counts.sort_by_key(|(table, _)| u8::from(**table));

    for (table, count) in table_counts {
        println!("  {}: {}", table.as_str(), count);
    }

    store.close().await?;
    Ok(())
}
