use std::{cmp::Ordering, collections::BinaryHeap};

use crate::{
    cell::{Cell, CellKey},
    iterator::CellIterator,
    util::Result,
};

/// Merging iterator for combining multiple sorted iterators
///
/// Uses a min-heap to merge sorted child iterators, always exposing the
/// smallest cell across all sources. This combines the data of one column
/// family:
/// - MemTable (most recent writes)
/// - Immutable MemTable (being flushed)
/// - Segments, newest first
///
/// # Priority Rules
///
/// When several children hold a cell with an identical key (same row,
/// family, qualifier, timestamp and kind):
/// - The child with the lower index wins and is the one exposed
/// - The others are skipped past that key
/// - Index 0 = highest priority (active MemTable)
///
/// So a value re-written at the same timestamp after a flush shadows the
/// flushed copy, and every key is yielded once.
pub struct MergingIterator {
    children: Vec<Box<dyn CellIterator>>,
    heap: BinaryHeap<HeapEntry>,
}

/// Entry in the min-heap, ordered by key (reversed) then by index (reversed)
struct HeapEntry {
    key: CellKey,
    index: usize,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (BinaryHeap is max-heap by default)
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for HeapEntry {}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.index == other.index
    }
}

impl MergingIterator {
    /// Create a new merging iterator from multiple child iterators
    ///
    /// # Priority Order
    /// - children[0] has highest priority (e.g., active MemTable)
    /// - children[n] has lowest priority (e.g., oldest segment)
    pub fn new(children: Vec<Box<dyn CellIterator>>) -> Self {
        MergingIterator {
            children,
            heap: BinaryHeap::new(),
        }
    }

    /// Rebuild heap with current positions of all valid children
    fn rebuild_heap(&mut self) {
        self.heap.clear();
        for (index, child) in self.children.iter().enumerate() {
            if let Some(cell) = child.current() {
                self.heap.push(HeapEntry {
                    key: cell.key(),
                    index,
                });
            }
        }
    }

    /// Advance one child and put it back into the heap if it has more
    fn advance_child(&mut self, index: usize) -> Result<()> {
        let child = &mut self.children[index];
        if let Err(e) = child.next() {
            self.heap.clear();
            return Err(e);
        }
        if let Some(cell) = child.current() {
            self.heap.push(HeapEntry {
                key: cell.key(),
                index,
            });
        }
        Ok(())
    }

    fn position_all(&mut self, target: Option<&CellKey>) -> Result<bool> {
        for child in &mut self.children {
            let positioned = match target {
                Some(target) => child.seek(target),
                None => child.seek_to_first(),
            };
            if let Err(e) = positioned {
                self.heap.clear();
                return Err(e);
            }
        }
        self.rebuild_heap();
        Ok(self.valid())
    }
}

impl CellIterator for MergingIterator {
    fn seek_to_first(&mut self) -> Result<bool> {
        self.position_all(None)
    }

    fn seek(&mut self, target: &CellKey) -> Result<bool> {
        self.position_all(Some(target))
    }

    fn next(&mut self) -> Result<bool> {
        let Some(top) = self.heap.pop() else {
            return Ok(false);
        };
        self.advance_child(top.index)?;

        // Skip lower priority duplicates of the cell just yielded
        while let Some(entry) = self.heap.peek()
            && entry.key == top.key
        {
            let index = entry.index;
            self.heap.pop();
            self.advance_child(index)?;
        }

        Ok(self.valid())
    }

    fn current(&self) -> Option<&Cell> {
        let top = self.heap.peek()?;
        self.children[top.index].current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memtable::MemTable;

    fn merge(mt1: &MemTable, mt2: &MemTable) -> MergingIterator {
        let iter1: Box<dyn CellIterator> = Box::new(mt1.iter());
        let iter2: Box<dyn CellIterator> = Box::new(mt2.iter());
        MergingIterator::new(vec![iter1, iter2])
    }

    fn drain(iter: &mut MergingIterator) -> Vec<Cell> {
        let mut out = Vec::new();
        while let Some(cell) = iter.current() {
            out.push(cell.clone());
            iter.next().unwrap();
        }
        out
    }

    #[test]
    fn test_merging_iterator_two_memtables() {
        let mt1 = MemTable::new();
        mt1.put(Cell::put("row1", "cf", "q", 1, "v1"));
        mt1.put(Cell::put("row3", "cf", "q", 1, "v3"));

        let mt2 = MemTable::new();
        mt2.put(Cell::put("row2", "cf", "q", 1, "v2"));
        mt2.put(Cell::put("row4", "cf", "q", 1, "v4"));

        let mut merge_iter = merge(&mt1, &mt2);
        assert!(merge_iter.seek_to_first().unwrap());

        let rows: Vec<_> = drain(&mut merge_iter).iter().map(|c| c.row().clone()).collect();
        assert_eq!(rows, vec!["row1", "row2", "row3", "row4"]);
    }

    #[test]
    fn test_merging_iterator_priority() {
        // Same key in both; mt1 shadows mt2
        let mt1 = MemTable::new();
        mt1.put(Cell::put("row1", "cf", "q", 7, "new"));

        let mt2 = MemTable::new();
        mt2.put(Cell::put("row1", "cf", "q", 7, "old"));
        mt2.put(Cell::put("row1", "cf", "q", 6, "older"));

        let mut merge_iter = merge(&mt1, &mt2);
        merge_iter.seek_to_first().unwrap();

        let cells = drain(&mut merge_iter);
        assert_eq!(cells.len(), 2);
        assert_eq!(&cells[0].value()[..], b"new");
        assert_eq!(&cells[1].value()[..], b"older");
    }

    #[test]
    fn test_tombstones_pass_through() {
        let mt1 = MemTable::new();
        mt1.put(Cell::tombstone("row1", "cf", "q", 5));

        let mt2 = MemTable::new();
        mt2.put(Cell::put("row1", "cf", "q", 5, "v"));

        let mut merge_iter = merge(&mt1, &mt2);
        merge_iter.seek_to_first().unwrap();

        let cells = drain(&mut merge_iter);
        assert_eq!(cells.len(), 2);
        assert!(cells[0].is_tombstone());
        assert!(!cells[1].is_tombstone());
    }

    #[test]
    fn test_merging_iterator_seek() {
        let mt1 = MemTable::new();
        mt1.put(Cell::put("key1", "cf", "q", 1, "v"));
        mt1.put(Cell::put("key5", "cf", "q", 1, "v"));

        let mt2 = MemTable::new();
        mt2.put(Cell::put("key3", "cf", "q", 1, "v"));
        mt2.put(Cell::put("key7", "cf", "q", 1, "v"));

        let mut merge_iter = merge(&mt1, &mt2);

        assert!(merge_iter.seek(&CellKey::first_of_row("key3")).unwrap());
        assert_eq!(merge_iter.current().unwrap().row(), "key3");

        assert!(merge_iter.seek(&CellKey::first_of_row("key4")).unwrap());
        assert_eq!(merge_iter.current().unwrap().row(), "key5");

        assert!(!merge_iter.seek(&CellKey::first_of_row("key8")).unwrap());
    }

    #[test]
    fn test_empty_children() {
        let empty: Box<dyn CellIterator> = Box::new(MemTable::new().iter());
        let mut merge_iter = MergingIterator::new(vec![empty]);
        assert!(!merge_iter.seek_to_first().unwrap());
        assert!(!merge_iter.next().unwrap());
        assert!(MergingIterator::new(Vec::new()).current().is_none());
    }
}
