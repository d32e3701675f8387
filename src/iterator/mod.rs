//! Cell iterators for colstore
//!
//! Provides a unified cursor interface for traversing cells of one column
//! family across:
//! - MemTable (in-memory writes)
//! - Immutable MemTable (being flushed)
//! - Segments (on-disk data)
//!
//! # Architecture
//!
//! ```text
//! ColumnFamilyStore::scan()
//!     ↓
//! FamilyScanner (groups by row, applies visibility)
//!     ↓
//! MergingIterator
//!     ├─→ MemTableIterator (newest)
//!     ├─→ MemTableIterator (immutable)
//!     └─→ [SegmentIterator, SegmentIterator, ...] (newest to oldest)
//! ```
//!
//! The merge yields every distinct cell exactly once, tombstones included.
//! Deciding which versions are visible is left to the caller, since reads
//! and compaction apply the same rule with different inputs.
use crate::{
    cell::{Cell, CellKey},
    util::Result,
};

/// Forward cursor over cells in [`CellKey`] order
///
/// # Lifecycle
///
/// An iterator starts unpositioned. Call one of the seek methods
/// to position it:
///
/// ```ignore
/// let mut iter = memtable.iter();
/// iter.seek_to_first()?;
/// while let Some(cell) = iter.current() {
///     println!("{cell:?}");
///     iter.next()?;
/// }
/// ```
///
/// # Error Handling
///
/// Operations return `Result` to surface segment read errors. The iterator
/// becomes invalid on error.
pub trait CellIterator: Send {
    /// Position at the first cell in the source
    ///
    /// Returns Ok(true) if positioned, Ok(false) if source is empty
    fn seek_to_first(&mut self) -> Result<bool>;

    /// Position at the first cell with key >= target
    ///
    /// Returns Ok(true) if positioned, Ok(false) if no such cell exists
    fn seek(&mut self, target: &CellKey) -> Result<bool>;

    /// Move to the next cell
    ///
    /// Returns Ok(true) if moved, Ok(false) if reached end
    fn next(&mut self) -> Result<bool>;

    /// The cell under the cursor, `None` when unpositioned or exhausted
    fn current(&self) -> Option<&Cell>;

    fn valid(&self) -> bool {
        self.current().is_some()
    }
}

mod memtable_iterator;
mod merging_iterator;
mod segment_iterator;

pub use memtable_iterator::MemTableIterator;
pub use merging_iterator::MergingIterator;
pub use segment_iterator::SegmentIterator;
