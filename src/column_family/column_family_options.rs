use serde::{Deserialize, Serialize};

use crate::{
    compression::CompressionType,
    segment::DEFAULT_INDEX_INTERVAL,
    util::{Result, Status},
};

/// Options for a specific Column Family
///
/// Part of the persisted table schema, so every field survives a restart
/// unchanged. Each family has its own:
/// - Write buffer size (MemTable size before flush)
/// - Segment layout (index interval and block compression)
/// - Retention policy (versions and TTL)
/// - Compaction trigger
///
/// # Example
///
/// ```ignore
/// use colstore::{ColumnFamilyOptions, CompressionType};
///
/// let options = ColumnFamilyOptions {
///     max_versions: 3,
///     ttl: Some(24 * 60 * 60 * 1000),  // one day
///     compression: CompressionType::Lz4,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnFamilyOptions {
    /// Size of write buffer (MemTable) in bytes before flushing to a segment
    /// Default: 4MB
    pub write_buffer_size: usize,

    /// Cells per segment block, and so per sparse index entry
    /// Default: 16
    pub index_interval: usize,

    /// Default: Snappy
    pub compression: CompressionType,

    /// Versions kept per column even when older than `ttl`
    /// Default: 0
    pub min_versions: usize,

    /// Versions kept per column at most
    /// Default: 1
    pub max_versions: usize,

    /// Age in milliseconds after which versions beyond `min_versions` expire
    /// Default: None (never)
    pub ttl: Option<u64>,

    /// Segment count above which a background compaction runs
    /// Default: 4
    pub compaction_trigger: usize,

    /// Upper bound on the summed size of segments merged by one background compaction
    /// Default: 64MB
    pub compaction_target_size: u64,
}

impl Default for ColumnFamilyOptions {
    fn default() -> Self {
        ColumnFamilyOptions {
            write_buffer_size: 4 * 1024 * 1024, // 4MB
            index_interval: DEFAULT_INDEX_INTERVAL,
            compression: CompressionType::Snappy,
            min_versions: 0,
            max_versions: 1,
            ttl: None,
            compaction_trigger: 4,
            compaction_target_size: 64 * 1024 * 1024,
        }
    }
}

impl ColumnFamilyOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_versions == 0 {
            return Err(Status::schema("max_versions must be at least 1"));
        }
        if self.min_versions > self.max_versions {
            return Err(Status::schema(format!(
                "min_versions {} exceeds max_versions {}",
                self.min_versions, self.max_versions
            )));
        }
        if self.write_buffer_size == 0 {
            return Err(Status::schema("write_buffer_size must be positive"));
        }
        if self.index_interval == 0 {
            return Err(Status::schema("index_interval must be positive"));
        }
        if self.compaction_trigger < 2 {
            return Err(Status::schema("compaction_trigger must be at least 2"));
        }
        Ok(())
    }
}
