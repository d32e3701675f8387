//! Immutable sorted runs of cells on storage.
//!
//! A segment is written once by [`SegmentBuilder`] (flush or compaction),
//! opened read-only as [`Segment`] and shared through `Arc`. When compaction
//! supersedes a segment it is marked obsolete; the file is deleted when the
//! last reader drops its reference.

pub mod builder;
pub mod format;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use bytes::Bytes;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

pub use builder::{SegmentBuilder, build_segment};
pub use format::DEFAULT_INDEX_INTERVAL;

use crate::{
    cell::{Cell, CellCodec, CellKey},
    env::{Env, RandomAccessFile},
    iterator::{CellIterator, SegmentIterator},
    segment::format::{
        FOOTER_SIZE, Footer, IndexEntry, calculate_checksum, decode_index, open_block,
    },
    statistics::Statistics,
    util::{Result, Status},
};

/// What the manifest records about a live segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub id: u64,
    pub size: u64,
    pub num_cells: u64,
    pub min_row: Vec<u8>,
    pub max_row: Vec<u8>,
}

pub fn segment_file_name(dir: &str, id: u64) -> String {
    format!("{dir}/{id:06}.seg")
}

/// Inverse of [`segment_file_name`] for a bare file name
pub fn parse_segment_file_name(name: &str) -> Option<u64> {
    name.strip_suffix(".seg")?.parse().ok()
}

pub struct Segment {
    meta: SegmentMeta,
    file_name: String,
    env: Arc<dyn Env>,
    file: Box<dyn RandomAccessFile>,
    codec: Arc<CellCodec>,
    index: Vec<IndexEntry>,
    stats: Arc<Statistics>,
    obsolete: AtomicBool,
}

impl Segment {
    /// Open a finished segment and load its sparse index
    pub fn open(
        env: Arc<dyn Env>,
        dir: &str,
        id: u64,
        codec: Arc<CellCodec>,
        stats: Arc<Statistics>,
    ) -> Result<Arc<Segment>> {
        let file_name = segment_file_name(dir, id);
        let file = env.open(&file_name)?;
        let file_size = file.size();

        if file_size < FOOTER_SIZE as u64 {
            return Err(Status::corruption(format!(
                "{file_name}: file too small to be a segment"
            )));
        }

        let footer_data = file.read_at(file_size - FOOTER_SIZE as u64, FOOTER_SIZE)?;
        let footer = Footer::decode(&footer_data)?;

        let handle = footer.index_handle;
        let index_end = handle.offset.checked_add(handle.size);
        if index_end.is_none_or(|end| end > file_size - FOOTER_SIZE as u64) {
            return Err(Status::corruption(format!(
                "{file_name}: index block out of bounds"
            )));
        }
        let index_data = file.read_at(handle.offset, handle.size as usize)?;
        if calculate_checksum(&index_data) != footer.index_checksum {
            return Err(Status::corruption(format!(
                "{file_name}: index checksum mismatch"
            )));
        }
        let (index, max_row) = decode_index(&index_data)?;

        let indexed_cells: u64 = index.iter().map(|e| e.num_cells as u64).sum();
        if indexed_cells != footer.num_cells {
            return Err(Status::corruption(format!(
                "{file_name}: index covers {indexed_cells} cells, footer says {}",
                footer.num_cells
            )));
        }

        let meta = SegmentMeta {
            id,
            size: file_size,
            num_cells: footer.num_cells,
            min_row: index.first().map(|e| e.first_row.to_vec()).unwrap_or_default(),
            max_row: max_row.to_vec(),
        };

        debug!(
            "Opened segment {file_name}: {} cells, {} blocks",
            meta.num_cells,
            index.len()
        );

        Ok(Arc::new(Segment {
            meta,
            file_name,
            env,
            file,
            codec,
            index,
            stats,
            obsolete: AtomicBool::new(false),
        }))
    }

    pub fn id(&self) -> u64 {
        self.meta.id
    }

    pub fn meta(&self) -> &SegmentMeta {
        &self.meta
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn num_cells(&self) -> u64 {
        self.meta.num_cells
    }

    pub fn file_size(&self) -> u64 {
        self.meta.size
    }

    pub fn min_row(&self) -> &[u8] {
        &self.meta.min_row
    }

    pub fn max_row(&self) -> &[u8] {
        &self.meta.max_row
    }

    pub fn num_blocks(&self) -> usize {
        self.index.len()
    }

    /// Whether any row in `[start, end)` can fall inside this segment's key range
    pub fn overlaps(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> bool {
        if self.meta.num_cells == 0 {
            return false;
        }
        let after_start = start.is_none_or(|start| self.max_row() >= start);
        let before_end = end.is_none_or(|end| self.min_row() < end);
        after_start && before_end
    }

    pub fn may_contain_row(&self, row: &[u8]) -> bool {
        self.meta.num_cells > 0 && self.min_row() <= row && row <= self.max_row()
    }

    /// Schedule the file for deletion once the last reference is dropped
    pub fn mark_obsolete(&self) {
        self.obsolete.store(true, Ordering::Release);
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete.load(Ordering::Acquire)
    }

    /// Index of the block a forward search for `row` has to start from.
    ///
    /// That is the last block whose first row is strictly smaller than `row`:
    /// a row can straddle a block boundary, so the block starting with `row`
    /// itself may not hold its first cell.
    pub(crate) fn block_for_row(&self, row: &[u8]) -> usize {
        self.index
            .partition_point(|entry| &entry.first_row[..] < row)
            .saturating_sub(1)
    }

    /// Read, verify and decode every cell of one block
    pub(crate) fn read_block(&self, block: usize) -> Result<Vec<Cell>> {
        let entry = self.index.get(block).ok_or_else(|| {
            Status::invalid_argument(format!("{}: no block {block}", self.file_name))
        })?;

        let raw = self
            .file
            .read_at(entry.handle.offset, entry.handle.size as usize)?;
        let payload = open_block(&raw)
            .map_err(|e| Status::corruption(format!("{}: block {block}: {e}", self.file_name)))?;
        self.stats.record_block_read();

        let mut cells = Vec::with_capacity(entry.num_cells as usize);
        let mut offset = 0;
        while offset < payload.len() {
            let (cell, n) = self.codec.decode(&payload, offset)?;
            cells.push(cell);
            offset += n;
        }

        if cells.len() != entry.num_cells as usize {
            return Err(Status::corruption(format!(
                "{}: block {block} holds {} cells, index says {}",
                self.file_name,
                cells.len(),
                entry.num_cells
            )));
        }
        Ok(cells)
    }

    /// Unpositioned iterator over every cell
    pub fn iter(self: &Arc<Self>) -> SegmentIterator {
        SegmentIterator::new(Arc::clone(self))
    }

    /// Iterator positioned at the first cell whose row is `>= row`
    pub fn seek(self: &Arc<Self>, row: &[u8]) -> Result<SegmentIterator> {
        let mut iter = self.iter();
        iter.seek(&CellKey::first_of_row(Bytes::copy_from_slice(row)))?;
        Ok(iter)
    }

    /// Lazy ascending cells with `start <= row < end`.
    ///
    /// Nothing is read until the first call to `next`. Each call returns a
    /// fresh sequence, so a scan can be restarted by calling this again.
    pub fn range_scan(self: &Arc<Self>, start: Option<&[u8]>, end: Option<&[u8]>) -> RangeScan {
        RangeScan {
            iter: self.iter(),
            start: start.map(Bytes::copy_from_slice),
            end: end.map(Bytes::copy_from_slice),
            started: false,
            done: false,
        }
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if !self.is_obsolete() {
            return;
        }
        match self.env.delete(&self.file_name) {
            Ok(()) => debug!("Deleted obsolete segment {}", self.file_name),
            Err(e) => warn!("Failed to delete obsolete segment {}: {e}", self.file_name),
        }
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("file_name", &self.file_name)
            .field("meta", &self.meta)
            .field("obsolete", &self.is_obsolete())
            .finish()
    }
}

/// See [`Segment::range_scan`]
pub struct RangeScan {
    iter: SegmentIterator,
    start: Option<Bytes>,
    end: Option<Bytes>,
    started: bool,
    done: bool,
}

impl Iterator for RangeScan {
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let positioned = if self.started {
            self.iter.next()
        } else {
            self.started = true;
            match &self.start {
                Some(start) => self.iter.seek(&CellKey::first_of_row(start.clone())),
                None => self.iter.seek_to_first(),
            }
        };

        match positioned {
            Err(e) => {
                self.done = true;
                Some(Err(e))
            },
            Ok(_) => match self.iter.current() {
                Some(cell) if self.end.as_ref().is_none_or(|end| cell.row() < end) => {
                    Some(Ok(cell.clone()))
                },
                _ => {
                    self.done = true;
                    None
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compression::CompressionType, env::MemEnv};

    const DIR: &str = "users/base_info";

    fn codec() -> Arc<CellCodec> {
        Arc::new(CellCodec::new(&["base_info"]))
    }

    /// 30 rows, each with qualifiers `a` and `b` at two timestamps: 120 cells
    fn sample_cells() -> Vec<Cell> {
        let mut cells = Vec::new();
        for i in 0..30 {
            let row = format!("user{i:03}");
            for q in ["a", "b"] {
                for ts in [2, 1] {
                    let value = format!("{row}-{q}-{ts}");
                    cells.push(Cell::put(row.clone(), "base_info", q, ts, value));
                }
            }
        }
        cells
    }

    fn build(
        env: &Arc<dyn Env>,
        id: u64,
        cells: &[Cell],
        compression: CompressionType,
    ) -> Arc<Segment> {
        build_segment(
            env.clone(),
            DIR,
            id,
            codec(),
            16,
            compression,
            cells.iter().cloned().map(Ok),
        )
        .unwrap();
        Segment::open(env.clone(), DIR, id, codec(), Arc::default()).unwrap()
    }

    fn collect(iter: &mut SegmentIterator) -> Vec<Cell> {
        let mut out = Vec::new();
        while let Some(cell) = iter.current() {
            out.push(cell.clone());
            iter.next().unwrap();
        }
        out
    }

    #[test]
    fn test_open_reads_back_everything() {
        let env: Arc<dyn Env> = Arc::new(MemEnv::new());
        let cells = sample_cells();
        for (id, compression) in [
            (1, CompressionType::None),
            (2, CompressionType::Snappy),
            (3, CompressionType::Lz4),
        ] {
            let segment = build(&env, id, &cells, compression);
            assert_eq!(segment.num_cells(), 120);
            assert_eq!(segment.num_blocks(), 8);
            assert_eq!(segment.min_row(), b"user000");
            assert_eq!(segment.max_row(), b"user029");

            let mut iter = segment.iter();
            iter.seek_to_first().unwrap();
            assert_eq!(collect(&mut iter), cells);
        }
    }

    #[test]
    fn test_seek_lands_on_first_cell_of_row() {
        let env: Arc<dyn Env> = Arc::new(MemEnv::new());
        let segment = build(&env, 1, &sample_cells(), CompressionType::None);

        // user004 opens the second block, so its search starts one block earlier
        for i in [0, 3, 4, 7, 29] {
            let row = format!("user{i:03}");
            let iter = segment.seek(row.as_bytes()).unwrap();
            let cell = iter.current().unwrap();
            assert_eq!(cell.row(), row.as_bytes());
            assert_eq!(cell.qualifier(), "a");
            assert_eq!(cell.timestamp(), 2);
        }

        let iter = segment.seek(b"user0035").unwrap();
        assert_eq!(iter.current().unwrap().row(), "user004");
        assert!(segment.seek(b"user999").unwrap().current().is_none());
        assert_eq!(segment.seek(b"").unwrap().current().unwrap().row(), "user000");
    }

    #[test]
    fn test_range_scan_bounds_and_restart() {
        let env: Arc<dyn Env> = Arc::new(MemEnv::new());
        let segment = build(&env, 1, &sample_cells(), CompressionType::Snappy);

        let scan = || segment.range_scan(Some(&b"user010"[..]), Some(&b"user012"[..]));
        let cells: Vec<Cell> = scan().collect::<Result<_>>().unwrap();
        assert_eq!(cells.len(), 8);
        assert!(cells.iter().all(|c| c.row() == "user010" || c.row() == "user011"));

        let again: Vec<Cell> = scan().collect::<Result<_>>().unwrap();
        assert_eq!(cells, again);

        assert_eq!(segment.range_scan(None, None).count(), 120);
        assert_eq!(segment.range_scan(Some(&b"zzz"[..]), None).count(), 0);
    }

    #[test]
    fn test_obsolete_file_deleted_after_last_reference() {
        let env: Arc<dyn Env> = Arc::new(MemEnv::new());
        let segment = build(&env, 5, &sample_cells(), CompressionType::None);
        let file_name = segment.file_name().to_string();

        let mut reader = segment.iter();
        reader.seek_to_first().unwrap();

        segment.mark_obsolete();
        drop(segment);
        assert!(env.exists(&file_name), "reader still holds the segment");

        reader.next().unwrap();
        assert!(reader.current().is_some());
        drop(reader);
        assert!(!env.exists(&file_name));
    }

    #[test]
    fn test_live_segment_file_kept_on_drop() {
        let env: Arc<dyn Env> = Arc::new(MemEnv::new());
        let segment = build(&env, 6, &sample_cells(), CompressionType::None);
        let file_name = segment.file_name().to_string();
        drop(segment);
        assert!(env.exists(&file_name));
    }

    #[test]
    fn test_corrupt_block_fails_only_that_read() {
        let mem = MemEnv::new();
        let env: Arc<dyn Env> = Arc::new(mem.clone());
        let segment = build(&env, 1, &sample_cells(), CompressionType::None);

        // First byte of the first block
        mem.corrupt_byte(segment.file_name(), 0).unwrap();

        let err = segment.read_block(0).unwrap_err();
        assert!(err.is_corruption(), "{err}");
        assert_eq!(segment.read_block(1).unwrap().len(), 16);
        assert!(segment.seek(b"user010").unwrap().current().is_some());
    }

    #[test]
    fn test_truncated_file_is_corruption() {
        let env: Arc<dyn Env> = Arc::new(MemEnv::new());
        env.create("users/base_info/000009.seg")
            .unwrap()
            .append(b"short")
            .unwrap();
        let err = Segment::open(env, DIR, 9, codec(), Arc::default()).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_overlaps() {
        let env: Arc<dyn Env> = Arc::new(MemEnv::new());
        let segment = build(&env, 1, &sample_cells(), CompressionType::None);
        assert!(segment.overlaps(None, None));
        assert!(segment.overlaps(Some(&b"user029"[..]), None));
        assert!(!segment.overlaps(Some(&b"user0291"[..]), None));
        assert!(!segment.overlaps(None, Some(&b"user000"[..])));
        assert!(segment.overlaps(None, Some(&b"user0001"[..])));
    }

    #[test]
    fn test_file_names() {
        assert_eq!(segment_file_name(DIR, 42), "users/base_info/000042.seg");
        assert_eq!(parse_segment_file_name("000042.seg"), Some(42));
        assert_eq!(parse_segment_file_name("MANIFEST"), None);
    }
}
