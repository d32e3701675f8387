use serde::{Deserialize, Serialize};

use crate::util::{Result, Status};

/// Per-family block compression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompressionType {
    None = 0,
    #[default]
    Snappy = 1,
    Lz4 = 2,
}

impl CompressionType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Snappy),
            2 => Some(CompressionType::Lz4),
            _ => None,
        }
    }
}

/// Compress data using the specified compression type
pub fn compress(compression: CompressionType, data: &[u8]) -> Result<Vec<u8>> {
    match compression {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Snappy => compress_snappy(data),
        CompressionType::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
    }
}

/// Decompress data using the specified compression type
pub fn decompress(compression: CompressionType, data: &[u8]) -> Result<Vec<u8>> {
    match compression {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Snappy => decompress_snappy(data),
        CompressionType::Lz4 => lz4_flex::decompress_size_prepended(data)
            .map_err(|e| Status::corruption(format!("LZ4 decompression failed: {e:?}"))),
    }
}

fn compress_snappy(data: &[u8]) -> Result<Vec<u8>> {
    snap::raw::Encoder::new()
        .compress_vec(data)
        .map_err(|e| Status::io_error(format!("Snappy compression failed: {e}")))
}

fn decompress_snappy(data: &[u8]) -> Result<Vec<u8>> {
    snap::raw::Decoder::new()
        .decompress_vec(data)
        .map_err(|e| Status::corruption(format!("Snappy decompression failed: {e}")))
}
