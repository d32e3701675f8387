use std::{
    ops::Bound,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;

use crate::{
    cell::{Cell, CellKey},
    iterator::MemTableIterator,
};

/// Mutable, ordered buffer of recent cells for one column family.
///
/// Backed by a lock-free skip list keyed by [`CellKey`], so two puts with an
/// identical `(row, family, qualifier, timestamp, kind)` replace each other.
/// Writers are serialized by the owning store; readers never block.
pub struct MemTable {
    map: Arc<SkipMap<CellKey, Bytes>>,
    approximate_memory: AtomicUsize,
}

impl MemTable {
    pub fn new() -> Self {
        MemTable {
            map: Arc::new(SkipMap::new()),
            approximate_memory: AtomicUsize::new(0),
        }
    }

    pub fn put(&self, cell: Cell) {
        self.approximate_memory
            .fetch_add(cell.approximate_size(), Ordering::Relaxed);
        self.map.insert(cell.key(), cell.value().clone());
    }

    /// Every version of one column held here, newest first, tombstones included
    pub fn get(&self, row: &[u8], family: &Arc<str>, qualifier: &[u8]) -> Vec<Cell> {
        let start = CellKey::first_of_column(
            Bytes::copy_from_slice(row),
            Arc::clone(family),
            Bytes::copy_from_slice(qualifier),
        );
        self.map
            .range(start..)
            .take_while(|entry| {
                let key = entry.key();
                key.row == row && key.family == *family && key.qualifier == qualifier
            })
            .map(|entry| Cell::from_parts(entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Cells with `start <= row < end` in key order; `None` leaves a side open
    pub fn scan<'a>(
        &'a self,
        start: Option<&[u8]>,
        end: Option<&'a [u8]>,
    ) -> impl Iterator<Item = Cell> + 'a {
        let lower = match start {
            Some(row) => Bound::Included(CellKey::first_of_row(Bytes::copy_from_slice(row))),
            None => Bound::Unbounded,
        };
        self.map
            .range((lower, Bound::Unbounded))
            .take_while(move |entry| end.is_none_or(|end| &entry.key().row[..] < end))
            .map(|entry| Cell::from_parts(entry.key().clone(), entry.value().clone()))
    }

    pub fn iter(&self) -> MemTableIterator {
        MemTableIterator::new(Arc::clone(&self.map))
    }

    pub fn size_bytes(&self) -> usize {
        self.approximate_memory.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl std::fmt::Debug for MemTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemTable")
            .field("cells", &self.len())
            .field("size_bytes", &self.size_bytes())
            .finish()
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
