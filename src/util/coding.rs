/// Encode varint (variable-length integer) onto the end of `buf`
#[inline]
pub fn put_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value & 0x7F | 0x80) as u8);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Number of bytes `put_varint` writes for `value`
#[inline]
pub fn varint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Decode varint
///
/// Returns `None` when the input ends before the terminating byte or the
/// value does not fit in 64 bits.
#[inline]
pub fn decode_varint(data: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        if shift >= 64 {
            return None;
        }
        value |= ((byte & 0x7F) as u64) << shift;
        if byte < 0x80 {
            return Some((value, i + 1));
        }
        shift += 7;
    }
    None
}

/// Read a fixed little-endian u32 at `offset`
#[inline]
pub fn decode_fixed32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes: [u8; 4] = data.get(offset..offset + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Read a fixed little-endian u64 at `offset`
#[inline]
pub fn decode_fixed64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes: [u8; 8] = data.get(offset..offset + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_encode_decode() {
        let test_cases = vec![0, 1, 127, 128, 255, 256, 16383, 16384, u64::MAX];

        for value in test_cases {
            let mut encoded = Vec::new();
            put_varint(&mut encoded, value);
            assert_eq!(encoded.len(), varint_len(value));
            let (decoded, len) = decode_varint(&encoded).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(len, encoded.len());
        }
    }

    #[test]
    fn test_varint_truncated() {
        let mut encoded = Vec::new();
        put_varint(&mut encoded, 300);
        assert!(decode_varint(&encoded[..1]).is_none());
        assert!(decode_varint(&[]).is_none());
    }

    #[test]
    fn test_fixed_out_of_range() {
        let data = [1u8, 0, 0, 0];
        assert_eq!(decode_fixed32(&data, 0), Some(1));
        assert_eq!(decode_fixed32(&data, 1), None);
        assert_eq!(decode_fixed64(&data, 0), None);
    }
}
