use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use num_format::{Locale, ToFormattedString};
use std::sync::atomic::{AtomicU64, Ordering};

const MB_IN_BYTES: f64 = 1_048_576.0;

#[derive(Default)]
pub struct FileSystemStats {
    // Namespace
    pub files_created: AtomicU64,
    pub files_deleted: AtomicU64,
    pub files_renamed: AtomicU64,
    pub directories_created: AtomicU64,
    pub directories_deleted: AtomicU64,
    pub directories_renamed: AtomicU64,

    // Content
    pub read_operations: AtomicU64,
    pub write_operations: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,

    // Blob storage
    pub blob_versions_written: AtomicU64,
    pub chunks_written: AtomicU64,
    pub chunks_obsoleted: AtomicU64,
    pub blobs_deleted: AtomicU64,

    pub total_operations: AtomicU64,
}

fn count(counter: &AtomicU64) -> String {
    counter.load(Ordering::Relaxed).to_formatted_string(&Locale::en)
}

fn section(table: &mut Table, title: &str) {
    table.add_row(vec![
        Cell::new(title)
            .fg(Color::Yellow)
            .add_attribute(Attribute::Bold),
        Cell::new(""),
    ]);
}

impl FileSystemStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read(&self, bytes: usize) {
        self.read_operations.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_write(&self, bytes: usize) {
        self.write_operations.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn report(&self) -> String {
        let mb_read = self.bytes_read.load(Ordering::Relaxed) as f64 / MB_IN_BYTES;
        let mb_written = self.bytes_written.load(Ordering::Relaxed) as f64 / MB_IN_BYTES;

        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("columnfs Statistics")
                .fg(Color::Cyan)
                .add_attribute(Attribute::Bold),
            Cell::new("Value")
                .fg(Color::Cyan)
                .add_attribute(Attribute::Bold),
        ]);

        section(&mut table, "Namespace (total)");
        table.add_row(vec![
            Cell::new("  Files"),
            Cell::new(format!(
                "Created: {} | Deleted: {} | Renamed: {}",
                count(&self.files_created),
                count(&self.files_deleted),
                count(&self.files_renamed)
            )),
        ]);
        table.add_row(vec![
            Cell::new("  Directories"),
            Cell::new(format!(
                "Created: {} | Deleted: {} | Renamed: {}",
                count(&self.directories_created),
                count(&self.directories_deleted),
                count(&self.directories_renamed)
            )),
        ]);

        section(&mut table, "Content (total)");
        table.add_row(vec![
            Cell::new("  Read"),
            Cell::new(format!(
                "{} ops ({mb_read:.2} MB)",
                count(&self.read_operations)
            ))
            .fg(Color::Green),
        ]);
        table.add_row(vec![
            Cell::new("  Write"),
            Cell::new(format!(
                "{} ops ({mb_written:.2} MB)",
                count(&self.write_operations)
            ))
            .fg(Color::Blue),
        ]);

        section(&mut table, "Blob Storage (total)");
        table.add_row(vec![
            Cell::new("  Versions"),
            Cell::new(format!(
                "{} written, {} chunks",
                count(&self.blob_versions_written),
                count(&self.chunks_written)
            )),
        ]);
        table.add_row(vec![
            Cell::new("  Obsolete"),
            Cell::new(format!(
                "{} chunks marked, {} blobs deleted",
                count(&self.chunks_obsoleted),
                count(&self.blobs_deleted)
            )),
        ]);

        table.add_row(vec![
            Cell::new("All Operations")
                .fg(Color::Magenta)
                .add_attribute(Attribute::Bold),
            Cell::new(count(&self.total_operations)).add_attribute(Attribute::Bold),
        ]);

        table.to_string()
    }

    pub fn output_report_debug(&self) {
        tracing::debug!("\n{}", self.report());
    }
}
