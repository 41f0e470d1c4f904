//! Page-buffered, reference-counted byte sequences.
//!
//! Large payloads (Kafka record sets, AMQP message bodies) are held as a
//! list of pages. Each page is a [`Bytes`] handle, so slicing a sequence
//! or cloning it shares the underlying storage instead of copying. A view
//! is `(pages, offset, len)`; [`PagedCursor`] walks a view as a [`Buf`].

use std::fmt;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};

/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

#[derive(Debug, Default)]
struct PageList {
    pages: Vec<Bytes>,
    /// Absolute start offset of each page.
    starts: Vec<usize>,
    total: usize,
}

impl PageList {
    /// Index of the page holding absolute offset `abs` (`abs < total`).
    fn locate(&self, abs: usize) -> usize {
        match self.starts.binary_search(&abs) {
            Ok(i) => i,
            Err(i) => i - 1,
        }
    }
}

/// An immutable view over shared pages.
#[derive(Clone, Default)]
pub struct PagedBytes {
    list: Arc<PageList>,
    offset: usize,
    len: usize,
}

impl PagedBytes {
    /// An empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Split `bytes` into pages of [`DEFAULT_PAGE_SIZE`] without copying.
    #[must_use]
    pub fn from_bytes(bytes: Bytes) -> Self {
        let mut builder = PagedBytesBuilder::new();
        builder.push(bytes);
        builder.build()
    }

    /// Copy a slice into freshly allocated pages.
    #[must_use]
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self::from_bytes(Bytes::copy_from_slice(data))
    }

    /// Length of the view in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of pages the view touches.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.chunks().count()
    }

    /// Byte at `index`, if in range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<u8> {
        if index >= self.len {
            return None;
        }
        let abs = self.offset + index;
        let page = self.list.locate(abs);
        Some(self.list.pages[page][abs - self.list.starts[page]])
    }

    /// A sub-view sharing the same pages, or `None` if out of range.
    #[must_use]
    pub fn slice(&self, start: usize, len: usize) -> Option<Self> {
        let end = start.checked_add(len)?;
        if end > self.len {
            return None;
        }
        Some(Self {
            list: Arc::clone(&self.list),
            offset: self.offset + start,
            len,
        })
    }

    /// Iterate the contiguous chunks of the view.
    pub fn chunks(&self) -> Chunks<'_> {
        Chunks {
            bytes: self,
            pos: 0,
        }
    }

    /// A [`Buf`] cursor over the view.
    #[must_use]
    pub fn cursor(&self) -> PagedCursor {
        PagedCursor {
            bytes: self.clone(),
            pos: 0,
        }
    }

    /// Contiguous copy of the view. Zero-copy when it sits in one page.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut cursor = self.cursor();
        cursor.copy_to_bytes(self.len)
    }

    /// The view as an owned vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for chunk in self.chunks() {
            out.extend_from_slice(chunk);
        }
        out
    }

    /// Chunk starting at view position `pos`, clipped to the view.
    fn chunk_at(&self, pos: usize) -> &[u8] {
        if pos >= self.len {
            return &[];
        }
        let abs = self.offset + pos;
        let page = self.list.locate(abs);
        let start = abs - self.list.starts[page];
        let page_bytes = &self.list.pages[page];
        let available = page_bytes.len() - start;
        let wanted = self.len - pos;
        &page_bytes[start..start + available.min(wanted)]
    }
}

impl PartialEq for PagedBytes {
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }
        let mut a = self.cursor();
        let mut b = other.cursor();
        while a.has_remaining() {
            let n = a.chunk().len().min(b.chunk().len());
            if a.chunk()[..n] != b.chunk()[..n] {
                return false;
            }
            a.advance(n);
            b.advance(n);
        }
        true
    }
}

impl Eq for PagedBytes {}

impl fmt::Debug for PagedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagedBytes")
            .field("len", &self.len)
            .field("pages", &self.page_count())
            .finish()
    }
}

impl From<Bytes> for PagedBytes {
    fn from(bytes: Bytes) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<&'static [u8]> for PagedBytes {
    fn from(data: &'static [u8]) -> Self {
        Self::from_bytes(Bytes::from_static(data))
    }
}

/// Iterator over the chunks of a [`PagedBytes`].
pub struct Chunks<'a> {
    bytes: &'a PagedBytes,
    pos: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.bytes.chunk_at(self.pos);
        if chunk.is_empty() {
            return None;
        }
        self.pos += chunk.len();
        Some(chunk)
    }
}

/// Cursor over a [`PagedBytes`] view. Supports partial consumption.
#[derive(Debug, Clone)]
pub struct PagedCursor {
    bytes: PagedBytes,
    pos: usize,
}

impl PagedCursor {
    /// The part of the view not yet consumed.
    #[must_use]
    pub fn rest(&self) -> PagedBytes {
        self.bytes
            .slice(self.pos, self.bytes.len - self.pos)
            .unwrap_or_default()
    }
}

impl Buf for PagedCursor {
    fn remaining(&self) -> usize {
        self.bytes.len - self.pos
    }

    fn chunk(&self) -> &[u8] {
        self.bytes.chunk_at(self.pos)
    }

    fn advance(&mut self, cnt: usize) {
        assert!(
            cnt <= self.remaining(),
            "cannot advance past end of paged bytes"
        );
        self.pos += cnt;
    }

    fn copy_to_bytes(&mut self, len: usize) -> Bytes {
        assert!(
            len <= self.remaining(),
            "cannot copy past end of paged bytes"
        );
        if len == 0 {
            return Bytes::new();
        }
        let abs = self.bytes.offset + self.pos;
        let list = &self.bytes.list;
        let page = list.locate(abs);
        let start = abs - list.starts[page];
        let out = if list.pages[page].len() - start >= len {
            list.pages[page].slice(start..start + len)
        } else {
            let mut buf = BytesMut::with_capacity(len);
            let mut copied = 0;
            while copied < len {
                let chunk = self.bytes.chunk_at(self.pos + copied);
                let n = chunk.len().min(len - copied);
                buf.extend_from_slice(&chunk[..n]);
                copied += n;
            }
            buf.freeze()
        };
        self.pos += len;
        out
    }
}

/// Accumulates bytes into pages.
#[derive(Debug)]
pub struct PagedBytesBuilder {
    page_size: usize,
    list: PageList,
    tail: BytesMut,
}

impl PagedBytesBuilder {
    /// Builder with [`DEFAULT_PAGE_SIZE`] pages.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Builder with a custom page size (minimum 1).
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            list: PageList::default(),
            tail: BytesMut::new(),
        }
    }

    /// Total bytes accumulated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.total + self.tail.len()
    }

    /// Whether nothing has been accumulated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append shared bytes as pages without copying.
    pub fn push(&mut self, mut bytes: Bytes) {
        self.flush_tail();
        while !bytes.is_empty() {
            let n = bytes.len().min(self.page_size);
            let page = bytes.split_to(n);
            self.push_page(page);
        }
    }

    /// Append by copying into the current page.
    pub fn extend_from_slice(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let room = self.page_size - self.tail.len();
            let n = room.min(data.len());
            self.tail.extend_from_slice(&data[..n]);
            data = &data[n..];
            if self.tail.len() == self.page_size {
                self.flush_tail();
            }
        }
    }

    /// Freeze into a [`PagedBytes`].
    #[must_use]
    pub fn build(mut self) -> PagedBytes {
        self.flush_tail();
        let len = self.list.total;
        PagedBytes {
            list: Arc::new(self.list),
            offset: 0,
            len,
        }
    }

    fn flush_tail(&mut self) {
        if !self.tail.is_empty() {
            let page = self.tail.split().freeze();
            self.push_page(page);
        }
    }

    fn push_page(&mut self, page: Bytes) {
        self.list.starts.push(self.list.total);
        self.list.total += page.len();
        self.list.pages.push(page);
    }
}

impl Default for PagedBytesBuilder {
    fn default() -> Self {
        Self::new()
    }
}
