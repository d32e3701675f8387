use crate::column_family::ColumnFamilyOptions;

/// CompactionPicker decides when a family needs a background compaction and
/// which of its segments to merge
///
/// Once the segment count exceeds the trigger, the oldest segments are
/// merged: as many as fit under the target size, but never fewer than two.
#[derive(Debug, Clone, Copy)]
pub struct CompactionPicker {
    /// Segment count above which a compaction is due
    trigger: usize,
    target_size: u64,
}

impl CompactionPicker {
    pub fn new(trigger: usize, target_size: u64) -> Self {
        CompactionPicker {
            trigger,
            target_size,
        }
    }

    pub fn from_options(options: &ColumnFamilyOptions) -> Self {
        Self::new(options.compaction_trigger, options.compaction_target_size)
    }

    pub fn needs_compaction(&self, segment_count: usize) -> bool {
        segment_count > self.trigger
    }

    /// Number of oldest segments to merge, given segment sizes oldest first
    pub fn pick(&self, sizes: &[u64]) -> Option<usize> {
        if !self.needs_compaction(sizes.len()) || sizes.len() < 2 {
            return None;
        }

        let mut count = 0;
        let mut total = 0u64;
        for &size in sizes {
            if count >= 2 && total.saturating_add(size) > self.target_size {
                break;
            }
            count += 1;
            total = total.saturating_add(size);
        }
        Some(count)
    }
}
