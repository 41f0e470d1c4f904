//! Variable-length integer codecs.
//!
//! Unsigned varints carry 7 bits per byte, least significant group first,
//! with the high bit set on every byte except the last. Signed values are
//! zig-zag mapped onto unsigned ones before encoding.

use bytes::{Buf, BufMut};

use crate::error::{WireError, WireResult};

/// Maximum encoded width of a 32-bit varint.
pub const MAX_VARINT_LEN: usize = 5;

/// Maximum encoded width of a 64-bit varint.
pub const MAX_VARLONG_LEN: usize = 10;

/// Map a signed 32-bit value onto the unsigned zig-zag space.
#[must_use]
pub fn zigzag_encode32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Inverse of [`zigzag_encode32`].
#[must_use]
pub fn zigzag_decode32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Map a signed 64-bit value onto the unsigned zig-zag space.
#[must_use]
pub fn zigzag_encode64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode64`].
#[must_use]
pub fn zigzag_decode64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Number of bytes `value` occupies as an unsigned varint.
#[must_use]
pub fn uvarint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Write an unsigned varint.
pub fn put_uvarint<B: BufMut>(buf: &mut B, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Write a zig-zag encoded 32-bit varint.
pub fn put_varint<B: BufMut>(buf: &mut B, value: i32) {
    put_uvarint(buf, u64::from(zigzag_encode32(value)));
}

/// Write a zig-zag encoded 64-bit varint.
pub fn put_varlong<B: BufMut>(buf: &mut B, value: i64) {
    put_uvarint(buf, zigzag_encode64(value));
}

/// Read an unsigned varint of at most `max_len` bytes.
///
/// # Errors
///
/// Returns [`WireError::UnexpectedEof`] if the input ends mid-value and
/// [`WireError::VarintOverflow`] if the continuation bit is still set after
/// `max_len` bytes.
pub fn get_uvarint<B: Buf>(buf: &mut B, max_len: usize) -> WireResult<u64> {
    let mut value: u64 = 0;
    for i in 0..max_len {
        if !buf.has_remaining() {
            return Err(WireError::UnexpectedEof {
                needed: 1,
                remaining: 0,
            });
        }
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(WireError::VarintOverflow { max_bytes: max_len })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn encode_u(value: u64) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_uvarint(&mut buf, value);
        buf.to_vec()
    }

    #[test]
    fn test_uvarint_known_encodings() {
        assert_eq!(encode_u(0), vec![0x00]);
        assert_eq!(encode_u(1), vec![0x01]);
        assert_eq!(encode_u(127), vec![0x7f]);
        assert_eq!(encode_u(128), vec![0x80, 0x01]);
        assert_eq!(encode_u(300), vec![0xac, 0x02]);
        assert_eq!(encode_u(u64::from(u32::MAX)), vec![0xff, 0xff, 0xff, 0xff, 0x0f]);
    }

    #[test]
    fn test_zigzag_known_values() {
        assert_eq!(zigzag_encode32(0), 0);
        assert_eq!(zigzag_encode32(-1), 1);
        assert_eq!(zigzag_encode32(1), 2);
        assert_eq!(zigzag_encode32(-2), 3);
        assert_eq!(zigzag_encode32(i32::MAX), u32::MAX - 1);
        assert_eq!(zigzag_encode32(i32::MIN), u32::MAX);
        assert_eq!(zigzag_encode64(-1), 1);
        assert_eq!(zigzag_decode64(3), -2);
    }

    #[test]
    fn test_uvarint_len_matches_encoding() {
        for value in [0u64, 1, 127, 128, 16_383, 16_384, u64::from(u32::MAX), u64::MAX] {
            assert_eq!(uvarint_len(value), encode_u(value).len());
        }
    }

    #[test]
    fn test_get_uvarint_truncated() {
        let mut input: &[u8] = &[0x80, 0x80];
        let err = get_uvarint(&mut input, MAX_VARINT_LEN).unwrap_err();
        assert!(matches!(err, WireError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_get_uvarint_overflow() {
        let mut input: &[u8] = &[0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        let err = get_uvarint(&mut input, MAX_VARINT_LEN).unwrap_err();
        assert_eq!(err, WireError::VarintOverflow { max_bytes: 5 });
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use bytes::BytesMut;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn varint_decodes_what_it_encodes(value in any::<i32>()) {
            let mut buf = BytesMut::new();
            put_varint(&mut buf, value);
            let mut bytes = buf.freeze();
            let raw = get_uvarint(&mut bytes, MAX_VARINT_LEN).unwrap();
            prop_assert_eq!(zigzag_decode32(raw as u32), value);
            prop_assert!(!bytes.has_remaining());
        }

        #[test]
        fn varlong_decodes_what_it_encodes(value in any::<i64>()) {
            let mut buf = BytesMut::new();
            put_varlong(&mut buf, value);
            let mut bytes = buf.freeze();
            let raw = get_uvarint(&mut bytes, MAX_VARLONG_LEN).unwrap();
            prop_assert_eq!(zigzag_decode64(raw), value);
        }
    }
}
