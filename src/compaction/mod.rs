//! Background merging of a family's segments.
//!
//! [`CompactionPicker`] decides when and what to merge, [`Compactor`] writes
//! the merged segment, and [`BackgroundScheduler`] runs flushes and
//! compactions off the write path. Publishing the result is up to the
//! column family store, which owns the segment list.

mod background_scheduler;
mod compaction_picker;
mod compactor;

pub use background_scheduler::BackgroundScheduler;
pub use compaction_picker::CompactionPicker;
pub use compactor::{CompactionOutput, Compactor};
