use std::{ops::Bound, sync::Arc};

use bytes::Bytes;
use crossbeam_skiplist::{SkipMap, map::Entry};

use crate::{
    cell::{Cell, CellKey},
    iterator::CellIterator,
    util::Result,
};

/// Iterator for MemTable
///
/// Holds its own reference to the skip list, so it stays usable after the
/// memtable has been rotated out. Insertions made while iterating may or may
/// not be observed.
///
/// # Implementation Notes
///
/// The crossbeam_skiplist iterator borrows the map, so it cannot be stored
/// next to the `Arc` it borrows from. We keep the current cell and use
/// `lower_bound()` to step to the next one.
pub struct MemTableIterator {
    map: Arc<SkipMap<CellKey, Bytes>>,
    current: Option<Cell>,
}

impl MemTableIterator {
    pub fn new(map: Arc<SkipMap<CellKey, Bytes>>) -> Self {
        MemTableIterator { map, current: None }
    }

    fn set_current(&mut self, entry: Option<Entry<'_, CellKey, Bytes>>) -> bool {
        self.current = entry.map(|e| Cell::from_parts(e.key().clone(), e.value().clone()));
        self.current.is_some()
    }
}

impl CellIterator for MemTableIterator {
    fn seek_to_first(&mut self) -> Result<bool> {
        let map = Arc::clone(&self.map);
        Ok(self.set_current(map.front()))
    }

    fn seek(&mut self, target: &CellKey) -> Result<bool> {
        let map = Arc::clone(&self.map);
        Ok(self.set_current(map.lower_bound(Bound::Included(target))))
    }

    fn next(&mut self) -> Result<bool> {
        let Some(current) = &self.current else {
            return Ok(false);
        };
        let key = current.key();
        let map = Arc::clone(&self.map);
        Ok(self.set_current(map.lower_bound(Bound::Excluded(&key))))
    }

    fn current(&self) -> Option<&Cell> {
        self.current.as_ref()
    }
}
