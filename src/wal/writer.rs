use crate::{
    env::WritableFile,
    util::{Result, Status},
    wal::log_format::{BLOCK_SIZE, HEADER_SIZE, RecordType, calculate_checksum, encode_header},
};

/// Appends records to one log file
pub struct Writer {
    file: Box<dyn WritableFile>,
    number: u64,
    /// Current position in the file
    offset: usize,
    /// Current position in the current block
    block_offset: usize,
}

impl Writer {
    /// Wrap a freshly created file as log number `number`
    pub fn new(file: Box<dyn WritableFile>, number: u64) -> Self {
        Writer {
            file,
            number,
            offset: 0,
            block_offset: 0,
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    /// Add a record to the log
    ///
    /// An empty record is written as a single empty `Full` fragment.
    pub fn add_record(&mut self, data: &[u8]) -> Result<()> {
        let mut left = data.len();
        let mut ptr = 0;
        let mut begin = true;

        loop {
            let leftover = BLOCK_SIZE - self.block_offset;

            // Switch to a new block if needed
            if leftover < HEADER_SIZE {
                if leftover > 0 {
                    self.file.append(&[0u8; HEADER_SIZE][..leftover])?;
                    self.offset += leftover;
                }
                self.block_offset = 0;
            }

            let avail = BLOCK_SIZE - self.block_offset - HEADER_SIZE;
            let fragment_length = left.min(avail);

            let record_type = match (begin, left == fragment_length) {
                (true, true) => RecordType::Full,
                (true, false) => RecordType::First,
                (false, true) => RecordType::Last,
                (false, false) => RecordType::Middle,
            };

            self.emit_physical_record(record_type, &data[ptr..ptr + fragment_length])?;

            ptr += fragment_length;
            left -= fragment_length;
            begin = false;
            if left == 0 {
                return Ok(());
            }
        }
    }

    fn emit_physical_record(&mut self, record_type: RecordType, data: &[u8]) -> Result<()> {
        let length = u16::try_from(data.len())
            .map_err(|_| Status::invalid_argument("WAL fragment too large"))?;

        let checksum = calculate_checksum(record_type, data);
        let header = encode_header(checksum, length, record_type);

        let mut record = Vec::with_capacity(HEADER_SIZE + data.len());
        record.extend_from_slice(&header);
        record.extend_from_slice(data);
        self.file.append(&record)?;

        self.offset += record.len();
        self.block_offset += record.len();
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync()
    }

    /// Bytes written so far, padding included
    pub fn offset(&self) -> usize {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Env, MemEnv};

    fn writer(env: &MemEnv) -> Writer {
        Writer::new(env.create("t/cf/000001.wal").unwrap(), 1)
    }

    #[test]
    fn test_write_small_record() {
        let env = MemEnv::new();
        let mut writer = writer(&env);
        writer.add_record(b"hello world").unwrap();
        assert_eq!(writer.offset(), HEADER_SIZE + 11);
        assert_eq!(env.read_all("t/cf/000001.wal").unwrap().len(), HEADER_SIZE + 11);
    }

    #[test]
    fn test_write_multiple_records() {
        let env = MemEnv::new();
        let mut writer = writer(&env);
        writer.add_record(b"record1").unwrap();
        writer.add_record(b"record2").unwrap();
        writer.add_record(b"").unwrap();
        assert_eq!(writer.offset(), 3 * HEADER_SIZE + 14);
    }

    #[test]
    fn test_large_record_spans_blocks() {
        let env = MemEnv::new();
        let mut writer = writer(&env);
        writer.add_record(&vec![b'A'; BLOCK_SIZE * 2]).unwrap();
        // Three fragments, each with its own header
        assert_eq!(writer.offset(), BLOCK_SIZE * 2 + 3 * HEADER_SIZE);
    }

    #[test]
    fn test_pads_short_block_tail() {
        let env = MemEnv::new();
        let mut writer = writer(&env);
        // Leave 3 bytes in the first block
        writer.add_record(&vec![b'x'; BLOCK_SIZE - HEADER_SIZE - 3]).unwrap();
        writer.add_record(b"next").unwrap();
        assert_eq!(writer.offset(), BLOCK_SIZE + HEADER_SIZE + 4);
    }

    #[test]
    fn test_write_failure_propagates() {
        let env = MemEnv::new();
        let mut writer = writer(&env);
        env.set_fail_writes(true);
        assert!(writer.add_record(b"x").unwrap_err().is_io_error());
        assert!(writer.sync().is_err());
    }
}
