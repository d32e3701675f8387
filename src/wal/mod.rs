//! Per-family write-ahead log.
//!
//! Every mutation is appended to the active log of its family before it
//! enters the memtable. One logical record is one write batch:
//!
//! ```text
//! count   varint
//! cells   count encoded cells (see `cell::codec`)
//! ```
//!
//! A log file is retired once the memtable it backs has been flushed and the
//! segment recorded in the manifest.

pub mod log_format;
pub mod reader;
pub mod writer;

use bytes::Bytes;
use log::warn;

pub use log_format::{BLOCK_SIZE, HEADER_SIZE, RecordType, parse_wal_file_name, wal_file_name};
pub use reader::Reader;
pub use writer::Writer;

use crate::{
    cell::{Cell, CellCodec},
    env::Env,
    util::{
        Result, Status,
        coding::{decode_varint, put_varint},
    },
};

pub fn encode_batch(codec: &CellCodec, cells: &[Cell]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(cells.iter().map(|c| codec.encoded_len(c)).sum::<usize>() + 5);
    put_varint(&mut buf, cells.len() as u64);
    for cell in cells {
        codec.encode(cell, &mut buf)?;
    }
    Ok(buf)
}

pub fn decode_batch(codec: &CellCodec, data: &Bytes) -> Result<Vec<Cell>> {
    let (count, mut offset) =
        decode_varint(data).ok_or_else(|| Status::corruption("Bad WAL batch header"))?;

    let mut cells = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        let (cell, consumed) = codec.decode(data, offset)?;
        cells.push(cell);
        offset += consumed;
    }
    if offset != data.len() {
        return Err(Status::corruption(format!(
            "WAL batch has {} trailing bytes",
            data.len() - offset
        )));
    }
    Ok(cells)
}

/// Feed every cell of log `name` to `apply`, in write order
///
/// Returns the number of batches replayed.
pub fn replay(
    env: &dyn Env,
    name: &str,
    codec: &CellCodec,
    mut apply: impl FnMut(Cell),
) -> Result<usize> {
    let mut reader = Reader::new(env.read_all(name)?);
    let mut batches = 0;
    while let Some(record) = reader.read_record()? {
        for cell in decode_batch(codec, &record)? {
            apply(cell);
        }
        batches += 1;
    }
    if reader.hit_torn_tail() {
        warn!("Ignoring torn record at the end of {name} after {batches} batches");
    }
    Ok(batches)
}
