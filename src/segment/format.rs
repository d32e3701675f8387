/// Segment file format
///
/// A segment file consists of:
/// 1. Data blocks, each holding up to `index_interval` encoded cells
/// 2. Index block (one entry per data block)
/// 3. Footer (fixed 40 bytes at the end)
///
/// Data block format:
/// - Payload: concatenated cell records, possibly compressed
/// - Compression Type (1 byte)
/// - CRC32 of payload + type (4 bytes)
///
/// Index block format:
/// - Num Entries (varint)
/// - Entry 1 .. Entry N:
///   - First Row Len (varint), First Row (bytes)
///   - Block Offset (8 bytes), Block Size (8 bytes)
///   - Num Cells (varint)
/// - Max Row Len (varint), Max Row (bytes)
///
/// Footer format (40 bytes):
/// - Index Block Handle (offset: 8 bytes, size: 8 bytes)
/// - Num Cells (8 bytes)
/// - Index CRC32 (4 bytes)
/// - Padding (4 bytes)
/// - Magic Number (8 bytes)
use bytes::Bytes;
use crc32fast::Hasher;

use crate::{
    compression::{self, CompressionType},
    util::{
        Result, Status,
        coding::{decode_fixed32, decode_fixed64, decode_varint, put_varint},
    },
};

/// Cells per data block, which is also the sparse index sampling interval
pub const DEFAULT_INDEX_INTERVAL: usize = 16;

pub const FOOTER_SIZE: usize = 40;

pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Magic number for segment files
pub const MAGIC_NUMBER: u64 = 0x7365_676d_636f_6c73;

/// Offset and size of a block, trailer included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
}

impl BlockHandle {
    pub const fn new(offset: u64, size: u64) -> Self {
        BlockHandle { offset, size }
    }

    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&self.size.to_le_bytes());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    pub index_handle: BlockHandle,
    pub num_cells: u64,
    pub index_checksum: u32,
}

impl Footer {
    pub fn encode(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];
        buf[0..8].copy_from_slice(&self.index_handle.offset.to_le_bytes());
        buf[8..16].copy_from_slice(&self.index_handle.size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.num_cells.to_le_bytes());
        buf[24..28].copy_from_slice(&self.index_checksum.to_le_bytes());
        // 28..32 padding, already zeroed
        buf[32..40].copy_from_slice(&MAGIC_NUMBER.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != FOOTER_SIZE {
            return Err(Status::corruption("Segment footer has wrong size"));
        }
        let field = |offset| {
            decode_fixed64(data, offset).ok_or_else(|| Status::corruption("Truncated footer"))
        };

        if field(32)? != MAGIC_NUMBER {
            return Err(Status::corruption("Bad segment magic number"));
        }

        Ok(Footer {
            index_handle: BlockHandle::new(field(0)?, field(8)?),
            num_cells: field(16)?,
            index_checksum: decode_fixed32(data, 24)
                .ok_or_else(|| Status::corruption("Truncated footer"))?,
        })
    }
}

/// One sparse index entry: the first row of a data block and where it lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub first_row: Bytes,
    pub handle: BlockHandle,
    pub num_cells: u32,
}

pub fn encode_index(entries: &[IndexEntry], max_row: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    put_varint(&mut buf, entries.len() as u64);
    for entry in entries {
        put_varint(&mut buf, entry.first_row.len() as u64);
        buf.extend_from_slice(&entry.first_row);
        entry.handle.encode_to(&mut buf);
        put_varint(&mut buf, entry.num_cells as u64);
    }
    put_varint(&mut buf, max_row.len() as u64);
    buf.extend_from_slice(max_row);
    buf
}

/// Returns the index entries and the segment's largest row key
pub fn decode_index(data: &Bytes) -> Result<(Vec<IndexEntry>, Bytes)> {
    let mut pos = 0;
    let count = read_varint(data, &mut pos)?;
    let mut entries = Vec::with_capacity(count.min(1 << 16) as usize);
    for _ in 0..count {
        let first_row = read_bytes(data, &mut pos)?;
        let offset = decode_fixed64(data, pos).ok_or_else(truncated_index)?;
        let size = decode_fixed64(data, pos + 8).ok_or_else(truncated_index)?;
        pos += 16;
        let num_cells = read_varint(data, &mut pos)? as u32;
        entries.push(IndexEntry {
            first_row,
            handle: BlockHandle::new(offset, size),
            num_cells,
        });
    }
    let max_row = read_bytes(data, &mut pos)?;
    Ok((entries, max_row))
}

fn truncated_index() -> Status {
    Status::corruption("Truncated segment index")
}

fn read_varint(data: &[u8], pos: &mut usize) -> Result<u64> {
    let (value, n) = data
        .get(*pos..)
        .and_then(decode_varint)
        .ok_or_else(truncated_index)?;
    *pos += n;
    Ok(value)
}

fn read_bytes(data: &Bytes, pos: &mut usize) -> Result<Bytes> {
    let len = read_varint(data, pos)? as usize;
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(truncated_index)?;
    let out = data.slice(*pos..end);
    *pos = end;
    Ok(out)
}

/// Calculate CRC32 checksum
#[inline]
pub fn calculate_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Compress a block payload and append its trailer.
///
/// Falls back to no compression when it would not save at least 1/8.
pub fn seal_block(payload: &[u8], compression: CompressionType) -> Result<Vec<u8>> {
    let (mut block, compression) = match compression {
        CompressionType::None => (payload.to_vec(), CompressionType::None),
        other => {
            let compressed = compression::compress(other, payload)?;
            if compressed.len() < payload.len() - payload.len() / 8 {
                (compressed, other)
            } else {
                (payload.to_vec(), CompressionType::None)
            }
        },
    };
    block.push(compression as u8);
    let checksum = calculate_checksum(&block);
    block.extend_from_slice(&checksum.to_le_bytes());
    Ok(block)
}

/// Verify a block's trailer and return its decompressed payload
pub fn open_block(raw: &[u8]) -> Result<Bytes> {
    if raw.len() < BLOCK_TRAILER_SIZE {
        return Err(Status::corruption("Block too small"));
    }

    let len = raw.len();
    let stored_checksum =
        decode_fixed32(raw, len - 4).ok_or_else(|| Status::corruption("Block too small"))?;
    let actual_checksum = calculate_checksum(&raw[..len - 4]);
    if stored_checksum != actual_checksum {
        return Err(Status::corruption(format!(
            "Block checksum mismatch: expected {actual_checksum}, got {stored_checksum}"
        )));
    }

    let compression = CompressionType::from_u8(raw[len - 5])
        .ok_or_else(|| Status::corruption("Invalid compression type"))?;
    let payload = &raw[..len - BLOCK_TRAILER_SIZE];
    match compression {
        CompressionType::None => Ok(Bytes::copy_from_slice(payload)),
        other => Ok(Bytes::from(compression::decompress(other, payload)?)),
    }
}
