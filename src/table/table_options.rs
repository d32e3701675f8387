use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    column_family::ColumnFamilyDescriptor,
    util::{Clock, SystemClock},
};

/// Schema of a table: its name and column families
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub families: Vec<ColumnFamilyDescriptor>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, families: Vec<ColumnFamilyDescriptor>) -> Self {
        TableDescriptor {
            name: name.into(),
            families,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Enabled,
    /// Rejects writes; reads still work
    Disabled,
    Dropped,
}

/// Runtime options of an open table; not persisted
#[derive(Clone)]
pub struct TableOptions {
    /// Log every write before applying it
    /// Default: true
    pub wal_enabled: bool,

    /// Sync the log after every write
    /// Default: false
    pub sync_writes: bool,

    /// Run flushes and compactions on a background thread. When off, they
    /// run inline on the writing thread.
    /// Default: true
    pub background_jobs: bool,

    /// Source of default timestamps and of `now` for TTL
    /// Default: wall clock
    pub clock: Arc<dyn Clock>,
}

impl Default for TableOptions {
    fn default() -> Self {
        TableOptions {
            wal_enabled: true,
            sync_writes: false,
            background_jobs: true,
            clock: Arc::new(SystemClock),
        }
    }
}

impl fmt::Debug for TableOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableOptions")
            .field("wal_enabled", &self.wal_enabled)
            .field("sync_writes", &self.sync_writes)
            .field("background_jobs", &self.background_jobs)
            .finish_non_exhaustive()
    }
}
