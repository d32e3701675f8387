/// Column families of a table
///
/// A column family groups qualifiers that share storage and a retention
/// policy. Each family of a table has an independent:
/// - MemTable, plus one detached MemTable while a flush runs
/// - Write-ahead log
/// - Segment list
/// - Options (write buffer, compression, versions, TTL, compaction)
///
/// # Architecture
///
/// ```text
/// Table
///  ├─→ ColumnFamilyStore("base_info")
///  │    ├─→ MemTable
///  │    ├─→ Immutable MemTable
///  │    └─→ Segments (oldest → newest)
///  └─→ ColumnFamilyStore("history")
///       └─→ ...
/// ```
mod column_family_descriptor;
mod column_family_options;
mod column_family_store;
mod retention;

pub use column_family_descriptor::ColumnFamilyDescriptor;
pub use column_family_options::ColumnFamilyOptions;
pub use column_family_store::{ColumnFamilyStore, CompactionSummary, FamilyScanner, StoreContext};
pub use retention::{FilterMode, RetentionPolicy, VersionFilter};
