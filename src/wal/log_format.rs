/// Write-ahead log file format
///
/// A log file is a sequence of 32KB blocks. Each block holds one or more
/// physical records, and a logical record larger than the space left in a
/// block is split into fragments across blocks.
///
/// Physical record:
/// +----------+--------+------+--------+
/// | Checksum | Length | Type | Data   |
/// +----------+--------+------+--------+
/// | 4 bytes  | 2 bytes| 1 byte| N bytes|
/// +----------+--------+------+--------+
///
/// The checksum is a CRC32 over the type byte followed by the data. A block
/// tail shorter than a header is zero padding.
use crc32fast::Hasher;

/// Block size is 32KB
pub const BLOCK_SIZE: usize = 32 * 1024;

/// Header size: checksum(4) + length(2) + type(1) = 7 bytes
pub const HEADER_SIZE: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Complete record
    Full = 1,
    /// First fragment of a record
    First = 2,
    Middle = 3,
    /// Last fragment of a record
    Last = 4,
}

impl RecordType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(RecordType::Full),
            2 => Some(RecordType::First),
            3 => Some(RecordType::Middle),
            4 => Some(RecordType::Last),
            _ => None,
        }
    }
}

pub fn calculate_checksum(record_type: RecordType, data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[record_type as u8]);
    hasher.update(data);
    hasher.finalize()
}

/// Returns: [checksum(4), length(2), type(1)]
pub fn encode_header(checksum: u32, length: u16, record_type: RecordType) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(&checksum.to_le_bytes());
    header[4..6].copy_from_slice(&length.to_le_bytes());
    header[6] = record_type as u8;
    header
}

/// Returns (checksum, length, raw type byte); the type is validated by the caller
pub fn decode_header(header: &[u8]) -> Option<(u32, u16, u8)> {
    if header.len() < HEADER_SIZE {
        return None;
    }
    let checksum = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let length = u16::from_le_bytes([header[4], header[5]]);
    Some((checksum, length, header[6]))
}

/// Name of log file `number` in `dir`
pub fn wal_file_name(dir: &str, number: u64) -> String {
    crate::env::join(dir, &format!("{number:06}.wal"))
}

pub fn parse_wal_file_name(name: &str) -> Option<u64> {
    name.strip_suffix(".wal")?.parse().ok()
}
