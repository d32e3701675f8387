use std::{cmp::Ordering, sync::Arc};

use bytes::Bytes;
use log::{debug, warn};

use crate::{
    cell::{Cell, CellCodec},
    compression::CompressionType,
    env::{Env, WritableFile},
    segment::{
        SegmentMeta,
        format::{BlockHandle, Footer, IndexEntry, calculate_checksum, encode_index, seal_block},
        segment_file_name,
    },
    util::{Result, Status},
};

/// Writes one segment file from cells supplied in key order.
///
/// Cells are grouped `index_interval` to a block; every block gets one
/// sparse index entry keyed by its first row. Nothing is visible to readers
/// until the file is recorded in the manifest, so an unfinished file is only
/// garbage to be collected on the next open.
pub struct SegmentBuilder {
    env: Arc<dyn Env>,
    file_name: String,
    id: u64,
    file: Box<dyn WritableFile>,
    codec: Arc<CellCodec>,
    compression: CompressionType,
    index_interval: usize,

    offset: u64,
    block: Vec<u8>,
    block_cells: u32,
    block_first_row: Bytes,
    index: Vec<IndexEntry>,
    last: Option<Cell>,
    num_cells: u64,
}

impl SegmentBuilder {
    pub fn new(
        env: Arc<dyn Env>,
        dir: &str,
        id: u64,
        codec: Arc<CellCodec>,
        index_interval: usize,
        compression: CompressionType,
    ) -> Result<Self> {
        if index_interval == 0 {
            return Err(Status::invalid_argument("index_interval must be positive"));
        }
        let file_name = segment_file_name(dir, id);
        let file = env.create(&file_name)?;

        Ok(SegmentBuilder {
            env,
            file_name,
            id,
            file,
            codec,
            compression,
            index_interval,
            offset: 0,
            block: Vec::new(),
            block_cells: 0,
            block_first_row: Bytes::new(),
            index: Vec::new(),
            last: None,
            num_cells: 0,
        })
    }

    /// Add the next cell; it must sort strictly after the previous one
    pub fn add(&mut self, cell: &Cell) -> Result<()> {
        if let Some(last) = &self.last {
            let ordered = last.cmp_key(cell) == Ordering::Less;
            debug_assert!(ordered, "cells added out of order: {cell:?} after {last:?}");
            if !ordered {
                return Err(Status::invalid_argument(format!(
                    "Cells must be added in sorted order: {cell:?} after {last:?}"
                )));
            }
        }

        if self.block_cells == 0 {
            self.block_first_row = cell.row().clone();
        }
        self.codec.encode(cell, &mut self.block)?;
        self.block_cells += 1;
        self.num_cells += 1;
        self.last = Some(cell.clone());

        if self.block_cells as usize >= self.index_interval {
            self.flush_block()?;
        }
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.block_cells == 0 {
            return Ok(());
        }

        let sealed = seal_block(&self.block, self.compression)?;
        self.file.append(&sealed)?;

        self.index.push(IndexEntry {
            first_row: std::mem::take(&mut self.block_first_row),
            handle: BlockHandle::new(self.offset, sealed.len() as u64),
            num_cells: self.block_cells,
        });

        self.offset += sealed.len() as u64;
        self.block.clear();
        self.block_cells = 0;
        Ok(())
    }

    /// Write the index and footer and sync the file
    pub fn finish(mut self) -> Result<SegmentMeta> {
        self.flush_block()?;

        let max_row = self.last.as_ref().map(|c| c.row().clone()).unwrap_or_default();
        let index_data = encode_index(&self.index, &max_row);
        let footer = Footer {
            index_handle: BlockHandle::new(self.offset, index_data.len() as u64),
            num_cells: self.num_cells,
            index_checksum: calculate_checksum(&index_data),
        };
        let footer_data = footer.encode();
        self.file.append(&index_data)?;
        self.file.append(&footer_data)?;
        self.offset += (index_data.len() + footer_data.len()) as u64;
        self.file.sync()?;

        let min_row = self
            .index
            .first()
            .map(|e| e.first_row.to_vec())
            .unwrap_or_default();

        debug!(
            "Finished segment {}: {} cells in {} blocks, {} bytes",
            self.file_name,
            self.num_cells,
            self.index.len(),
            self.offset
        );

        Ok(SegmentMeta {
            id: self.id,
            size: self.offset,
            num_cells: self.num_cells,
            min_row,
            max_row: max_row.to_vec(),
        })
    }

    /// Drop the partially written file
    pub fn abandon(self) {
        let SegmentBuilder {
            env,
            file_name,
            file,
            ..
        } = self;
        drop(file);
        if let Err(e) = env.delete(&file_name) {
            warn!("Failed to delete abandoned segment {file_name}: {e}");
        }
    }

    pub fn num_cells(&self) -> u64 {
        self.num_cells
    }

    /// Bytes written so far, excluding the block being filled
    pub fn file_size(&self) -> u64 {
        self.offset
    }
}

/// Build a complete segment from an ordered stream of cells.
///
/// Any error, whether from the stream or from writing, removes the partial
/// file before it is returned.
pub fn build_segment<I>(
    env: Arc<dyn Env>,
    dir: &str,
    id: u64,
    codec: Arc<CellCodec>,
    index_interval: usize,
    compression: CompressionType,
    cells: I,
) -> Result<SegmentMeta>
where
    I: IntoIterator<Item = Result<Cell>>,
{
    let mut builder = SegmentBuilder::new(env, dir, id, codec, index_interval, compression)?;
    for cell in cells {
        if let Err(e) = cell.and_then(|cell| builder.add(&cell)) {
            builder.abandon();
            return Err(e);
        }
    }

    // `finish` consumes the builder, so remember what to clean up
    let env = Arc::clone(&builder.env);
    let file_name = builder.file_name.clone();
    builder.finish().inspect_err(|_| {
        if let Err(e) = env.delete(&file_name) {
            warn!("Failed to delete unfinished segment {file_name}: {e}");
        }
    })
}
