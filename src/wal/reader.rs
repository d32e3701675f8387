use bytes::{Bytes, BytesMut};

use crate::{
    util::{Result, Status},
    wal::log_format::{BLOCK_SIZE, HEADER_SIZE, RecordType, calculate_checksum, decode_header},
};

/// Reads the records of one log file
///
/// The file is loaded whole; logs are bounded by the write buffer size of
/// their family.
///
/// A record cut short by the end of the file (a write that was in flight
/// when the process died) ends the log: `read_record` returns `Ok(None)` and
/// [`Reader::hit_torn_tail`] reports it. A complete fragment whose checksum
/// does not match is corruption.
pub struct Reader {
    data: Bytes,
    /// Current position in the data
    offset: usize,
    torn_tail: bool,
}

enum Physical {
    Record(RecordType, Bytes),
    Eof,
    Torn,
}

impl Reader {
    pub fn new(data: Bytes) -> Self {
        Reader {
            data,
            offset: 0,
            torn_tail: false,
        }
    }

    /// Whether reading stopped at an incomplete trailing record
    pub fn hit_torn_tail(&self) -> bool {
        self.torn_tail
    }

    /// Read the next logical record
    pub fn read_record(&mut self) -> Result<Option<Bytes>> {
        let mut buffer: Option<BytesMut> = None;

        loop {
            let (record_type, fragment) = match self.read_physical_record()? {
                Physical::Record(record_type, fragment) => (record_type, fragment),
                Physical::Eof if buffer.is_none() => return Ok(None),
                Physical::Eof | Physical::Torn => {
                    self.torn_tail = true;
                    return Ok(None);
                },
            };

            match record_type {
                RecordType::Full if buffer.is_none() => return Ok(Some(fragment)),
                RecordType::First if buffer.is_none() => {
                    buffer = Some(BytesMut::from(&fragment[..]));
                    continue;
                },
                RecordType::Middle | RecordType::Last => {
                    if let Some(buf) = buffer.as_mut() {
                        buf.extend_from_slice(&fragment);
                        if record_type == RecordType::Last {
                            return Ok(buffer.take().map(BytesMut::freeze));
                        }
                        continue;
                    }
                },
                _ => {},
            }
            return Err(Status::corruption(format!(
                "Unexpected {record_type:?} fragment at offset {}",
                self.offset
            )));
        }
    }

    fn read_physical_record(&mut self) -> Result<Physical> {
        // Skip the padding at the end of a block
        let block_left = BLOCK_SIZE - self.offset % BLOCK_SIZE;
        if block_left < HEADER_SIZE {
            self.offset += block_left;
        }

        let remaining = self.data.len().saturating_sub(self.offset);
        if remaining == 0 {
            return Ok(Physical::Eof);
        }
        if remaining < HEADER_SIZE {
            return Ok(Physical::Torn);
        }

        let start = self.offset;
        let Some((checksum, length, kind)) = decode_header(&self.data[start..]) else {
            return Ok(Physical::Torn);
        };
        let data_start = start + HEADER_SIZE;
        let data_end = data_start + length as usize;
        if data_end > self.data.len() {
            return Ok(Physical::Torn);
        }

        let record_type = RecordType::from_u8(kind)
            .ok_or_else(|| Status::corruption(format!("Invalid WAL record type {kind}")))?;
        let fragment = self.data.slice(data_start..data_end);
        let expected = calculate_checksum(record_type, &fragment);
        if checksum != expected {
            return Err(Status::corruption(format!(
                "WAL checksum mismatch at offset {start}: expected {expected}, got {checksum}"
            )));
        }

        self.offset = data_end;
        Ok(Physical::Record(record_type, fragment))
    }
}
