//! Checked big-endian reader over any [`Buf`].

use bytes::{Buf, Bytes};

use super::varint::{self, MAX_VARINT_LEN, MAX_VARLONG_LEN};
use crate::error::{WireError, WireResult};

/// Bounds-checked reader for wire formats.
///
/// All integers are big-endian. Every read verifies the remaining length
/// first, so a short buffer yields [`WireError::UnexpectedEof`] instead of
/// the panic `Buf` would raise.
#[derive(Debug)]
pub struct WireReader<B> {
    buf: B,
    consumed: usize,
}

macro_rules! checked_get {
    ($name:ident, $ty:ty, $get:ident) => {
        #[doc = concat!("Read a big-endian `", stringify!($ty), "`.")]
        ///
        /// # Errors
        ///
        /// Returns an error if the input is exhausted.
        pub fn $name(&mut self) -> WireResult<$ty> {
            self.ensure(std::mem::size_of::<$ty>())?;
            self.consumed += std::mem::size_of::<$ty>();
            Ok(self.buf.$get())
        }
    };
}

impl<B: Buf> WireReader<B> {
    /// Wrap a buffer.
    #[must_use]
    pub fn new(buf: B) -> Self {
        Self { buf, consumed: 0 }
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Bytes read so far.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Whether the input is exhausted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    /// Unwrap the remaining buffer.
    pub fn into_inner(self) -> B {
        self.buf
    }

    fn ensure(&self, needed: usize) -> WireResult<()> {
        let remaining = self.buf.remaining();
        if remaining < needed {
            return Err(WireError::UnexpectedEof { needed, remaining });
        }
        Ok(())
    }

    checked_get!(read_u8, u8, get_u8);
    checked_get!(read_i8, i8, get_i8);
    checked_get!(read_u16, u16, get_u16);
    checked_get!(read_i16, i16, get_i16);
    checked_get!(read_u32, u32, get_u32);
    checked_get!(read_i32, i32, get_i32);
    checked_get!(read_u64, u64, get_u64);
    checked_get!(read_i64, i64, get_i64);
    checked_get!(read_f32, f32, get_f32);
    checked_get!(read_f64, f64, get_f64);

    /// Read `len` raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than `len` bytes remain.
    pub fn read_bytes(&mut self, len: usize) -> WireResult<Bytes> {
        self.ensure(len)?;
        self.consumed += len;
        Ok(self.buf.copy_to_bytes(len))
    }

    /// Read a fixed-size array.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than `N` bytes remain.
    pub fn read_array<const N: usize>(&mut self) -> WireResult<[u8; N]> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        self.buf.copy_to_slice(&mut out);
        self.consumed += N;
        Ok(out)
    }

    /// Skip `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than `len` bytes remain.
    pub fn skip(&mut self, len: usize) -> WireResult<()> {
        self.ensure(len)?;
        self.buf.advance(len);
        self.consumed += len;
        Ok(())
    }

    /// Read an unsigned 32-bit varint.
    ///
    /// # Errors
    ///
    /// Returns an error on truncation or overflow.
    pub fn read_uvarint(&mut self) -> WireResult<u32> {
        let before = self.buf.remaining();
        let value = varint::get_uvarint(&mut self.buf, MAX_VARINT_LEN)?;
        self.consumed += before - self.buf.remaining();
        u32::try_from(value).map_err(|_| WireError::VarintOverflow {
            max_bytes: MAX_VARINT_LEN,
        })
    }

    /// Read an unsigned 64-bit varint.
    ///
    /// # Errors
    ///
    /// Returns an error on truncation or overflow.
    pub fn read_uvarlong(&mut self) -> WireResult<u64> {
        let before = self.buf.remaining();
        let value = varint::get_uvarint(&mut self.buf, MAX_VARLONG_LEN)?;
        self.consumed += before - self.buf.remaining();
        Ok(value)
    }

    /// Read a zig-zag 32-bit varint.
    ///
    /// # Errors
    ///
    /// Returns an error on truncation or overflow.
    pub fn read_varint(&mut self) -> WireResult<i32> {
        self.read_uvarint().map(varint::zigzag_decode32)
    }

    /// Read a zig-zag 64-bit varint.
    ///
    /// # Errors
    ///
    /// Returns an error on truncation or overflow.
    pub fn read_varlong(&mut self) -> WireResult<i64> {
        self.read_uvarlong().map(varint::zigzag_decode64)
    }
}
