use std::sync::Arc;

use crate::{
    cell::{Cell, CellKey},
    iterator::CellIterator,
    segment::Segment,
    util::Result,
};

/// Iterator for a segment
///
/// Loads one block at a time and keeps the segment alive for as long as the
/// iterator exists, so an obsolete segment's file outlives every scan that
/// started before compaction replaced it.
pub struct SegmentIterator {
    segment: Arc<Segment>,
    block: usize,
    cells: Vec<Cell>,
    pos: usize,
}

impl SegmentIterator {
    pub fn new(segment: Arc<Segment>) -> Self {
        SegmentIterator {
            segment,
            block: 0,
            cells: Vec::new(),
            pos: 0,
        }
    }

    pub fn segment(&self) -> &Arc<Segment> {
        &self.segment
    }

    fn invalidate(&mut self) {
        self.block = self.segment.num_blocks();
        self.cells.clear();
        self.pos = 0;
    }

    fn load_block(&mut self, block: usize) -> Result<bool> {
        if block >= self.segment.num_blocks() {
            self.invalidate();
            return Ok(false);
        }
        match self.segment.read_block(block) {
            Ok(cells) => {
                self.block = block;
                self.cells = cells;
                self.pos = 0;
                Ok(!self.cells.is_empty())
            },
            Err(e) => {
                self.invalidate();
                Err(e)
            },
        }
    }
}

impl CellIterator for SegmentIterator {
    fn seek_to_first(&mut self) -> Result<bool> {
        self.load_block(0)
    }

    fn seek(&mut self, target: &CellKey) -> Result<bool> {
        let start = self.segment.block_for_row(&target.row);
        if !self.load_block(start)? {
            return Ok(false);
        }

        // Linear scan from the sampled position
        while let Some(cell) = self.current() {
            if cell.key() >= *target {
                return Ok(true);
            }
            self.next()?;
        }
        Ok(false)
    }

    fn next(&mut self) -> Result<bool> {
        if self.cells.is_empty() {
            return Ok(false);
        }
        self.pos += 1;
        if self.pos < self.cells.len() {
            return Ok(true);
        }
        self.load_block(self.block + 1)
    }

    fn current(&self) -> Option<&Cell> {
        self.cells.get(self.pos)
    }
}
