use std::sync::atomic::{AtomicU64, Ordering};

/// Engine-wide statistics
///
/// Thread-safe counters shared by every table of a database. Uses atomic
/// counters for lock-free updates; [`Statistics::snapshot`] copies them into
/// a plain struct.
#[derive(Debug, Default)]
pub struct Statistics {
    // Cell operations
    pub cells_written: AtomicU64,
    pub cells_deleted: AtomicU64,
    pub gets: AtomicU64,
    pub rows_scanned: AtomicU64,
    pub bytes_written: AtomicU64,

    // Flush
    pub num_flushes: AtomicU64,
    pub bytes_flushed: AtomicU64,

    // WAL
    pub wal_writes: AtomicU64,
    pub wal_bytes_written: AtomicU64,

    // Segments
    pub segment_blocks_read: AtomicU64,

    // Compaction
    pub num_compactions: AtomicU64,
    pub compaction_bytes_read: AtomicU64,
    pub compaction_bytes_written: AtomicU64,
    pub compaction_cells_dropped: AtomicU64,

    // Background job failures
    pub num_errors: AtomicU64,
}

/// Point-in-time copy of [`Statistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    pub cells_written: u64,
    pub cells_deleted: u64,
    pub gets: u64,
    pub rows_scanned: u64,
    pub bytes_written: u64,
    pub num_flushes: u64,
    pub bytes_flushed: u64,
    pub wal_writes: u64,
    pub wal_bytes_written: u64,
    pub segment_blocks_read: u64,
    pub num_compactions: u64,
    pub compaction_bytes_read: u64,
    pub compaction_bytes_written: u64,
    pub compaction_cells_dropped: u64,
    pub num_errors: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Statistics::default()
    }

    #[inline]
    pub fn record_write(&self, bytes: u64) {
        self.cells_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_delete(&self) {
        self.cells_deleted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_row_scanned(&self) {
        self.rows_scanned.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_flush(&self, bytes: u64) {
        self.num_flushes.fetch_add(1, Ordering::Relaxed);
        self.bytes_flushed.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_wal_write(&self, bytes: u64) {
        self.wal_writes.fetch_add(1, Ordering::Relaxed);
        self.wal_bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_block_read(&self) {
        self.segment_blocks_read.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_compaction(&self, bytes_read: u64, bytes_written: u64, cells_dropped: u64) {
        self.num_compactions.fetch_add(1, Ordering::Relaxed);
        self.compaction_bytes_read
            .fetch_add(bytes_read, Ordering::Relaxed);
        self.compaction_bytes_written
            .fetch_add(bytes_written, Ordering::Relaxed);
        self.compaction_cells_dropped
            .fetch_add(cells_dropped, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_error(&self) {
        self.num_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatisticsSnapshot {
            cells_written: load(&self.cells_written),
            cells_deleted: load(&self.cells_deleted),
            gets: load(&self.gets),
            rows_scanned: load(&self.rows_scanned),
            bytes_written: load(&self.bytes_written),
            num_flushes: load(&self.num_flushes),
            bytes_flushed: load(&self.bytes_flushed),
            wal_writes: load(&self.wal_writes),
            wal_bytes_written: load(&self.wal_bytes_written),
            segment_blocks_read: load(&self.segment_blocks_read),
            num_compactions: load(&self.num_compactions),
            compaction_bytes_read: load(&self.compaction_bytes_read),
            compaction_bytes_written: load(&self.compaction_bytes_written),
            compaction_cells_dropped: load(&self.compaction_cells_dropped),
            num_errors: load(&self.num_errors),
        }
    }

    pub fn compaction_read_write_ratio(&self) -> f64 {
        let read = self.compaction_bytes_read.load(Ordering::Relaxed) as f64;
        let written = self.compaction_bytes_written.load(Ordering::Relaxed) as f64;
        if written > 0.0 { read / written } else { 0.0 }
    }

    /// Get a formatted statistics report
    pub fn report(&self) -> String {
        let s = self.snapshot();
        format!(
            "Engine Statistics:\n\
            \n\
            Operations:\n\
            - Cells written: {}\n\
            - Cells deleted: {}\n\
            - Gets:          {}\n\
            - Rows scanned:  {}\n\
            - Bytes written: {} ({:.2} MB)\n\
            \n\
            Flush:\n\
            - Flushes:       {}\n\
            - Bytes flushed: {} ({:.2} MB)\n\
            \n\
            WAL:\n\
            - Writes:        {}\n\
            - Bytes written: {}\n\
            \n\
            Segments:\n\
            - Blocks read:   {}\n\
            \n\
            Compaction:\n\
            - Runs:          {}\n\
            - Bytes read:    {}\n\
            - Bytes written: {}\n\
            - Cells dropped: {}\n\
            - R/W ratio:     {:.2}\n\
            \n\
            Errors:          {}",
            s.cells_written,
            s.cells_deleted,
            s.gets,
            s.rows_scanned,
            s.bytes_written,
            s.bytes_written as f64 / 1024.0 / 1024.0,
            s.num_flushes,
            s.bytes_flushed,
            s.bytes_flushed as f64 / 1024.0 / 1024.0,
            s.wal_writes,
            s.wal_bytes_written,
            s.segment_blocks_read,
            s.num_compactions,
            s.compaction_bytes_read,
            s.compaction_bytes_written,
            s.compaction_cells_dropped,
            self.compaction_read_write_ratio(),
            s.num_errors,
        )
    }
}
