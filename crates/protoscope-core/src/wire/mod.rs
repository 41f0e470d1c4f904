//! Wire primitives shared by the protocol decoders.
//!
//! - [`reader`] - bounds-checked big-endian reads over any `Buf`
//! - [`varint`] - unsigned and zig-zag variable-length integers
//! - [`pages`] - page-buffered, reference-counted byte sequences

pub mod pages;
pub mod reader;
pub mod varint;

pub use pages::{PagedBytes, PagedBytesBuilder, PagedCursor, DEFAULT_PAGE_SIZE};
pub use reader::WireReader;
