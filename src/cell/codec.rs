//! Binary layout of a single cell.
//!
//! ```text
//! row_len    varint
//! row        row_len bytes
//! family_id  varint
//! qual_len   varint
//! qualifier  qual_len bytes
//! timestamp  8 bytes, big-endian i64
//! flag       u8: 0 = value, 1 = tombstone
//! value_len  varint        *
//! value      value_len bytes *
//! ```
//!
//! `*` absent when the tombstone flag is 1. The family is stored as the index
//! of its name in the table schema, so a codec is bound to one schema.

use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;

use crate::{
    cell::Cell,
    util::{
        Result, Status,
        coding::{decode_varint, put_varint, varint_len},
    },
};

const FLAG_VALUE: u8 = 0;
const FLAG_TOMBSTONE: u8 = 1;

#[derive(Debug, Clone)]
pub struct CellCodec {
    families: Vec<Arc<str>>,
    ids: HashMap<Arc<str>, u32>,
}

impl CellCodec {
    /// Build a codec for a schema; a family's id is its position in `families`.
    pub fn new<S: AsRef<str>>(families: &[S]) -> Self {
        let families: Vec<Arc<str>> = families.iter().map(|f| Arc::from(f.as_ref())).collect();
        let ids = families
            .iter()
            .enumerate()
            .map(|(id, name)| (Arc::clone(name), id as u32))
            .collect();
        CellCodec { families, ids }
    }

    /// Shared name of a family, so every decoded cell points at one allocation
    pub fn family(&self, name: &str) -> Option<&Arc<str>> {
        let id = *self.ids.get(name)?;
        self.families.get(id as usize)
    }

    pub fn family_id(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    /// Append the encoding of `cell` to `buf`
    pub fn encode(&self, cell: &Cell, buf: &mut Vec<u8>) -> Result<()> {
        let family_id = self
            .family_id(cell.family())
            .ok_or_else(|| Status::unknown_family(cell.family()))?;

        buf.reserve(self.encoded_len(cell));
        put_varint(buf, cell.row().len() as u64);
        buf.extend_from_slice(cell.row());
        put_varint(buf, family_id as u64);
        put_varint(buf, cell.qualifier().len() as u64);
        buf.extend_from_slice(cell.qualifier());
        buf.extend_from_slice(&cell.timestamp().to_be_bytes());
        if cell.is_tombstone() {
            buf.push(FLAG_TOMBSTONE);
        } else {
            buf.push(FLAG_VALUE);
            put_varint(buf, cell.value().len() as u64);
            buf.extend_from_slice(cell.value());
        }
        Ok(())
    }

    pub fn encode_to_vec(&self, cell: &Cell) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len(cell));
        self.encode(cell, &mut buf)?;
        Ok(buf)
    }

    /// Upper bound of the encoded size (exact when the family is known)
    pub fn encoded_len(&self, cell: &Cell) -> usize {
        let family_id = self.family_id(cell.family()).unwrap_or(u32::MAX);
        let mut len = varint_len(cell.row().len() as u64)
            + cell.row().len()
            + varint_len(family_id as u64)
            + varint_len(cell.qualifier().len() as u64)
            + cell.qualifier().len()
            + 8
            + 1;
        if !cell.is_tombstone() {
            len += varint_len(cell.value().len() as u64) + cell.value().len();
        }
        len
    }

    /// Decode the cell starting at `offset`.
    ///
    /// Returns the cell and the number of bytes it occupied. Row, qualifier
    /// and value share `data`'s allocation.
    pub fn decode(&self, data: &Bytes, offset: usize) -> Result<(Cell, usize)> {
        let mut pos = offset;

        let row = read_prefixed(data, &mut pos, "row key")?;

        let family_id = read_varint(data, &mut pos, "family id")?;
        let family = self
            .families
            .get(family_id as usize)
            .ok_or_else(|| Status::corruption(format!("unknown family id {family_id}")))?;

        let qualifier = read_prefixed(data, &mut pos, "qualifier")?;

        let ts_bytes: [u8; 8] = data
            .get(pos..pos + 8)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| Status::corruption("timestamp overruns record"))?;
        let timestamp = i64::from_be_bytes(ts_bytes);
        pos += 8;

        let flag = *data
            .get(pos)
            .ok_or_else(|| Status::corruption("tombstone flag overruns record"))?;
        pos += 1;

        let cell = match flag {
            FLAG_TOMBSTONE => Cell::tombstone(row, Arc::clone(family), qualifier, timestamp),
            FLAG_VALUE => {
                let value = read_prefixed(data, &mut pos, "value")?;
                Cell::put(row, Arc::clone(family), qualifier, timestamp, value)
            },
            other => {
                return Err(Status::corruption(format!(
                    "tombstone flag out of range: {other}"
                )));
            },
        };

        Ok((cell, pos - offset))
    }
}

fn read_varint(data: &Bytes, pos: &mut usize, what: &str) -> Result<u64> {
    let rest = data
        .get(*pos..)
        .ok_or_else(|| Status::corruption(format!("{what} starts past end of record")))?;
    let (value, n) = decode_varint(rest)
        .ok_or_else(|| Status::corruption(format!("bad {what} length prefix")))?;
    *pos += n;
    Ok(value)
}

fn read_prefixed(data: &Bytes, pos: &mut usize, what: &str) -> Result<Bytes> {
    let len = read_varint(data, pos, what)? as usize;
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| Status::corruption(format!("{what} overruns record")))?;
    let out = data.slice(*pos..end);
    *pos = end;
    Ok(out)
}
