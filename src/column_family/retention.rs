//! Version visibility and retention.
//!
//! Reads and compaction walk the cells of a column newest first and run them
//! through the same [`VersionFilter`]:
//!
//! 1. a tombstone at `t` hides every version of its column with timestamp `<= t`
//! 2. the newest `min_versions` surviving versions are kept regardless of age
//! 3. past those, versions older than `now - ttl` are dropped
//! 4. no more than `max_versions` versions are kept
//!
//! Reads never return tombstones. Compaction keeps the newest tombstone of a
//! column unless it is rewriting every segment of the family. Tombstones
//! dropped that way are remembered, so the caller can carry back any that
//! still cover cells buffered in memory.

use crate::{cell::Cell, column_family::ColumnFamilyOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub min_versions: usize,
    pub max_versions: usize,
    /// Milliseconds
    pub ttl: Option<u64>,
}

impl RetentionPolicy {
    pub fn from_options(options: &ColumnFamilyOptions) -> Self {
        RetentionPolicy {
            min_versions: options.min_versions,
            max_versions: options.max_versions,
            ttl: options.ttl,
        }
    }

    /// Narrow the policy to a read asking for at most `max_versions`
    pub fn capped(self, max_versions: usize) -> Self {
        let max_versions = self.max_versions.min(max_versions);
        RetentionPolicy {
            min_versions: self.min_versions.min(max_versions),
            max_versions,
            ttl: self.ttl,
        }
    }

    pub fn is_expired(&self, timestamp: i64, now: i64) -> bool {
        self.ttl.is_some_and(|ttl| {
            let ttl = i64::try_from(ttl).unwrap_or(i64::MAX);
            timestamp < now.saturating_sub(ttl)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Read,
    Compaction { drop_tombstones: bool },
}

/// Applies a [`RetentionPolicy`] to cells arriving in key order
pub struct VersionFilter {
    policy: RetentionPolicy,
    now: i64,
    mode: FilterMode,
    /// Any cell of the column being walked
    column: Option<Cell>,
    deleted_at: Option<i64>,
    kept: usize,
    dropped: u64,
    purged: Vec<Cell>,
}

impl VersionFilter {
    pub fn new(policy: RetentionPolicy, now: i64, mode: FilterMode) -> Self {
        VersionFilter {
            policy,
            now,
            mode,
            column: None,
            deleted_at: None,
            kept: 0,
            dropped: 0,
            purged: Vec::new(),
        }
    }

    pub fn for_read(policy: RetentionPolicy, now: i64) -> Self {
        Self::new(policy, now, FilterMode::Read)
    }

    pub fn for_compaction(policy: RetentionPolicy, now: i64, drop_tombstones: bool) -> Self {
        Self::new(policy, now, FilterMode::Compaction { drop_tombstones })
    }

    /// Whether `cell` survives; cells must be fed in [`crate::cell::CellKey`] order
    pub fn admit(&mut self, cell: &Cell) -> bool {
        let keep = self.decide(cell);
        if !keep {
            self.dropped += 1;
        }
        keep
    }

    /// Cells rejected so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Newest tombstone of every column purged so far
    pub fn take_purged(&mut self) -> Vec<Cell> {
        std::mem::take(&mut self.purged)
    }

    fn decide(&mut self, cell: &Cell) -> bool {
        if !self.column.as_ref().is_some_and(|c| c.same_column(cell)) {
            self.column = Some(cell.clone());
            self.deleted_at = None;
            self.kept = 0;
        }

        let ts = cell.timestamp();
        if cell.is_tombstone() {
            let newest = self.deleted_at.is_none();
            self.deleted_at = Some(self.deleted_at.map_or(ts, |t| t.max(ts)));
            return match self.mode {
                FilterMode::Read => false,
                FilterMode::Compaction { drop_tombstones: true } => {
                    if newest {
                        self.purged.push(cell.clone());
                    }
                    false
                },
                FilterMode::Compaction { drop_tombstones: false } => newest,
            };
        }

        if self.deleted_at.is_some_and(|t| ts <= t) {
            return false;
        }
        if self.kept >= self.policy.max_versions {
            return false;
        }
        if self.kept >= self.policy.min_versions && self.policy.is_expired(ts, self.now) {
            return false;
        }
        self.kept += 1;
        true
    }
}
