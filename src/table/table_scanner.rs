use std::{iter::Peekable, sync::Arc};

use bytes::Bytes;

use crate::{
    column_family::FamilyScanner, statistics::Statistics, table::RowResult, util::Result,
};

/// Rows of a table scan, joined across families by row key
///
/// A row present in only some families carries only those families' cells.
/// Each family scanner holds its own snapshot of sources, taken when the
/// scan started. The first read error ends the scan.
pub struct TableScanner {
    /// One per family, in family name order
    scanners: Vec<Peekable<FamilyScanner>>,
    stats: Arc<Statistics>,
    done: bool,
}

impl TableScanner {
    pub(crate) fn new(scanners: Vec<FamilyScanner>, stats: Arc<Statistics>) -> Self {
        TableScanner {
            scanners: scanners.into_iter().map(Iterator::peekable).collect(),
            stats,
            done: false,
        }
    }

    /// Smallest row any family has next, or the first pending error
    fn next_row(&mut self) -> Result<Option<Bytes>> {
        let mut next: Option<Bytes> = None;
        for scanner in &mut self.scanners {
            match scanner.peek() {
                Some(Ok((row, _))) => {
                    if next.as_ref().is_none_or(|n| row < n) {
                        next = Some(row.clone());
                    }
                },
                Some(Err(_)) => {
                    if let Some(Err(e)) = scanner.next() {
                        return Err(e);
                    }
                },
                None => {},
            }
        }
        Ok(next)
    }
}

impl Iterator for TableScanner {
    type Item = Result<RowResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let row = match self.next_row() {
            Ok(Some(row)) => row,
            Ok(None) => {
                self.done = true;
                return None;
            },
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            },
        };

        let mut cells = Vec::new();
        for scanner in &mut self.scanners {
            let same_row = |item: &Result<(Bytes, Vec<_>)>| matches!(item, Ok((r, _)) if *r == row);
            if let Some(Ok((_, family_cells))) = scanner.next_if(same_row) {
                cells.extend(family_cells);
            }
        }
        self.stats.record_row_scanned();
        Some(Ok(RowResult::new(row, cells)))
    }
}
