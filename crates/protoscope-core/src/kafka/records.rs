//! Record batches carried in Produce requests and Fetch responses.
//!
//! The raw bytes of a record set are always kept, so re-encoding is
//! verbatim. On top of them the batch headers are parsed, and for
//! uncompressed magic 2 batches the individual records too. Compressed
//! and legacy (magic 0/1) batches expose their header only.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Serialize, Serializer};

use crate::error::{WireError, WireResult};
use crate::wire::varint::{put_varint, put_varlong};
use crate::wire::{PagedBytes, WireReader};

/// `baseOffset` + `batchLength`.
const LOG_OVERHEAD: usize = 12;

/// Bytes of a v2 batch after `batchLength`, up to and including the record count.
pub const BATCH_HEADER_AFTER_LENGTH: i32 = 49;

/// Compression codec from the low three attribute bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
    Unknown,
}

impl Compression {
    #[must_use]
    pub fn from_attributes(attributes: i16) -> Self {
        match attributes & 0x07 {
            0 => Self::None,
            1 => Self::Gzip,
            2 => Self::Snappy,
            3 => Self::Lz4,
            4 => Self::Zstd,
            _ => Self::Unknown,
        }
    }
}

fn serialize_opt_bytes<S: Serializer>(value: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(b) => serializer.serialize_str(&STANDARD.encode(b)),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordHeader {
    pub key: String,
    #[serde(serialize_with = "serialize_opt_bytes")]
    pub value: Option<Bytes>,
}

/// A single record of a magic 2 batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub attributes: i8,
    pub timestamp_delta: i64,
    pub offset_delta: i32,
    #[serde(serialize_with = "serialize_opt_bytes")]
    pub key: Option<Bytes>,
    #[serde(serialize_with = "serialize_opt_bytes")]
    pub value: Option<Bytes>,
    pub headers: Vec<RecordHeader>,
}

fn read_varbytes(reader: &mut WireReader<Bytes>) -> WireResult<Option<Bytes>> {
    let len = reader.read_varint()?;
    if len < 0 {
        return Ok(None);
    }
    reader.read_bytes(len as usize).map(Some)
}

fn put_varbytes(out: &mut BytesMut, value: Option<&[u8]>) {
    match value {
        Some(data) => {
            put_varint(out, data.len() as i32);
            out.put_slice(data);
        }
        None => put_varint(out, -1),
    }
}

impl Record {
    /// Decode one length-prefixed record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is truncated or its length is negative.
    pub fn decode(reader: &mut WireReader<Bytes>) -> WireResult<Self> {
        let length = reader.read_varint()?;
        let len = usize::try_from(length).map_err(|_| WireError::InvalidLength(length.into()))?;
        let mut body = WireReader::new(reader.read_bytes(len)?);

        let attributes = body.read_i8()?;
        let timestamp_delta = body.read_varlong()?;
        let offset_delta = body.read_varint()?;
        let key = read_varbytes(&mut body)?;
        let value = read_varbytes(&mut body)?;
        let count = body.read_varint()?.max(0) as usize;
        let mut headers = Vec::with_capacity(count.min(body.remaining()));
        for _ in 0..count {
            let key = read_varbytes(&mut body)?
                .map(|k| String::from_utf8_lossy(&k).into_owned())
                .unwrap_or_default();
            let value = read_varbytes(&mut body)?;
            headers.push(RecordHeader { key, value });
        }

        Ok(Self {
            attributes,
            timestamp_delta,
            offset_delta,
            key,
            value,
            headers,
        })
    }

    pub fn encode(&self, out: &mut BytesMut) {
        let mut body = BytesMut::new();
        body.put_i8(self.attributes);
        put_varlong(&mut body, self.timestamp_delta);
        put_varint(&mut body, self.offset_delta);
        put_varbytes(&mut body, self.key.as_deref());
        put_varbytes(&mut body, self.value.as_deref());
        put_varint(&mut body, self.headers.len() as i32);
        for header in &self.headers {
            put_varbytes(&mut body, Some(header.key.as_bytes()));
            put_varbytes(&mut body, header.value.as_deref());
        }
        put_varint(out, body.len() as i32);
        out.put_slice(&body);
    }
}

/// Header of one batch, with its records when they could be decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordBatch {
    pub base_offset: i64,
    pub batch_length: i32,
    pub partition_leader_epoch: i32,
    pub magic: i8,
    pub crc: u32,
    pub attributes: i16,
    pub last_offset_delta: i32,
    pub base_timestamp: i64,
    pub max_timestamp: i64,
    pub producer_id: i64,
    pub producer_epoch: i16,
    pub base_sequence: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<Record>>,
}

impl RecordBatch {
    #[must_use]
    pub fn compression(&self) -> Compression {
        Compression::from_attributes(self.attributes)
    }

    #[must_use]
    pub fn is_transactional(&self) -> bool {
        self.magic >= 2 && self.attributes & 0x10 != 0
    }

    #[must_use]
    pub fn is_control(&self) -> bool {
        self.magic >= 2 && self.attributes & 0x20 != 0
    }

    /// Parse the batch body that follows `baseOffset` and `batchLength`.
    fn decode(base_offset: i64, batch_length: i32, body: Bytes) -> Self {
        let mut batch = Self {
            base_offset,
            batch_length,
            ..Self::default()
        };
        if body.len() < 6 {
            return batch;
        }
        if body[4] < 2 {
            // legacy message: crc, magic, attributes, ...
            batch.crc = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
            batch.magic = body[4] as i8;
            batch.attributes = i16::from(body[5]);
            return batch;
        }

        let mut reader = WireReader::new(body);
        if let Ok(count) = batch.read_v2_header(&mut reader) {
            if batch.compression() == Compression::None {
                batch.records = (0..count.max(0))
                    .map(|_| Record::decode(&mut reader))
                    .collect::<WireResult<Vec<_>>>()
                    .ok();
            }
        }
        batch
    }

    fn read_v2_header(&mut self, reader: &mut WireReader<Bytes>) -> WireResult<i32> {
        self.partition_leader_epoch = reader.read_i32()?;
        self.magic = reader.read_i8()?;
        self.crc = reader.read_u32()?;
        self.attributes = reader.read_i16()?;
        self.last_offset_delta = reader.read_i32()?;
        self.base_timestamp = reader.read_i64()?;
        self.max_timestamp = reader.read_i64()?;
        self.producer_id = reader.read_i64()?;
        self.producer_epoch = reader.read_i16()?;
        self.base_sequence = reader.read_i32()?;
        reader.read_i32()
    }

    /// Write this batch in magic 2 layout, uncompressed.
    ///
    /// `batchLength` is recomputed from the records; `crc` is written as
    /// carried.
    pub fn encode(&self, out: &mut BytesMut) {
        let records = self.records.as_deref().unwrap_or_default();
        let mut body = BytesMut::new();
        for record in records {
            record.encode(&mut body);
        }

        out.put_i64(self.base_offset);
        out.put_i32(BATCH_HEADER_AFTER_LENGTH + body.len() as i32);
        out.put_i32(self.partition_leader_epoch);
        out.put_i8(2);
        out.put_u32(self.crc);
        out.put_i16(self.attributes);
        out.put_i32(self.last_offset_delta);
        out.put_i64(self.base_timestamp);
        out.put_i64(self.max_timestamp);
        out.put_i64(self.producer_id);
        out.put_i16(self.producer_epoch);
        out.put_i32(self.base_sequence);
        out.put_i32(records.len() as i32);
        out.put_slice(&body);
    }
}

/// The records field of a Produce or Fetch message.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet {
    raw: PagedBytes,
    batches: Vec<RecordBatch>,
    partial: bool,
}

impl RecordSet {
    /// Parse `raw` leniently; a trailing incomplete batch marks the set partial.
    #[must_use]
    pub fn decode(raw: Bytes) -> Self {
        let mut reader = WireReader::new(raw.clone());
        let mut batches = Vec::new();
        let mut partial = false;

        while reader.remaining() >= LOG_OVERHEAD {
            let (Ok(base_offset), Ok(batch_length)) = (reader.read_i64(), reader.read_i32()) else {
                partial = true;
                break;
            };
            let len = match usize::try_from(batch_length) {
                Ok(len) if len <= reader.remaining() => len,
                _ => {
                    partial = true;
                    break;
                }
            };
            match reader.read_bytes(len) {
                Ok(body) => batches.push(RecordBatch::decode(base_offset, batch_length, body)),
                Err(_) => {
                    partial = true;
                    break;
                }
            }
        }
        if !reader.is_empty() {
            partial = true;
        }

        Self {
            raw: PagedBytes::from_bytes(raw),
            batches,
            partial,
        }
    }

    /// Encode `batches` and parse the result back.
    #[must_use]
    pub fn from_batches(batches: &[RecordBatch]) -> Self {
        let mut out = BytesMut::new();
        for batch in batches {
            batch.encode(&mut out);
        }
        Self::decode(out.freeze())
    }

    /// The bytes as captured.
    #[must_use]
    pub fn raw(&self) -> &PagedBytes {
        &self.raw
    }

    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Whether trailing bytes did not form a complete batch.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Records decoded across all batches.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.batches
            .iter()
            .filter_map(|b| b.records.as_ref())
            .map(Vec::len)
            .sum()
    }
}

impl Serialize for RecordSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("sizeInBytes", &self.raw.len())?;
        map.serialize_entry("batches", &self.batches)?;
        if self.partial {
            map.serialize_entry("partial", &true)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(offset_delta: i32, value: &'static [u8]) -> Record {
        Record {
            offset_delta,
            key: None,
            value: Some(Bytes::from_static(value)),
            headers: vec![RecordHeader {
                key: "trace".into(),
                value: Some(Bytes::from_static(b"1")),
            }],
            ..Record::default()
        }
    }

    fn batch(records: Vec<Record>) -> RecordBatch {
        RecordBatch {
            base_offset: 100,
            magic: 2,
            crc: 0xdead_beef,
            last_offset_delta: records.len() as i32 - 1,
            base_timestamp: 1_700_000_000_000,
            max_timestamp: 1_700_000_000_000,
            producer_id: -1,
            producer_epoch: -1,
            base_sequence: -1,
            records: Some(records),
            ..RecordBatch::default()
        }
    }

    #[test]
    fn test_decode_uncompressed_batch() {
        let set = RecordSet::from_batches(&[batch(vec![record(0, b"a"), record(1, b"bc")])]);
        assert!(!set.is_partial());
        assert_eq!(set.batches().len(), 1);
        assert_eq!(set.record_count(), 2);

        let decoded = &set.batches()[0];
        assert_eq!(decoded.base_offset, 100);
        assert_eq!(decoded.magic, 2);
        assert_eq!(decoded.crc, 0xdead_beef);
        assert_eq!(decoded.compression(), Compression::None);
        let records = decoded.records.as_ref().unwrap();
        assert_eq!(records[1].value.as_deref(), Some(&b"bc"[..]));
        assert_eq!(records[1].headers[0].key, "trace");
    }

    #[test]
    fn test_batch_length_counts_header_and_records() {
        let mut out = BytesMut::new();
        batch(vec![]).encode(&mut out);
        assert_eq!(out.len(), LOG_OVERHEAD + BATCH_HEADER_AFTER_LENGTH as usize);
        assert_eq!(&out[8..12], &BATCH_HEADER_AFTER_LENGTH.to_be_bytes());
        // magic sits at offset 16
        assert_eq!(out[16], 2);
    }

    #[test]
    fn test_compressed_batch_stays_opaque() {
        let mut compressed = batch(vec![record(0, b"x")]);
        compressed.attributes = 1;
        let set = RecordSet::from_batches(&[compressed]);
        assert_eq!(set.batches()[0].compression(), Compression::Gzip);
        assert!(set.batches()[0].records.is_none());
        assert_eq!(set.record_count(), 0);
    }

    #[test]
    fn test_truncated_set_is_partial_and_raw_is_kept() {
        let mut out = BytesMut::new();
        batch(vec![record(0, b"a")]).encode(&mut out);
        batch(vec![record(0, b"b")]).encode(&mut out);
        let full = out.freeze();
        let cut = full.slice(..full.len() - 3);

        let set = RecordSet::decode(cut.clone());
        assert!(set.is_partial());
        assert_eq!(set.batches().len(), 1);
        assert_eq!(set.raw().to_bytes(), cut);
    }

    #[test]
    fn test_legacy_message_header() {
        let mut out = BytesMut::new();
        out.put_i64(5);
        out.put_i32(14);
        out.put_u32(0x0102_0304);
        out.put_i8(1);
        out.put_i8(0);
        out.put_slice(&[0; 8]);
        let set = RecordSet::decode(out.freeze());
        let legacy = &set.batches()[0];
        assert_eq!(legacy.magic, 1);
        assert_eq!(legacy.crc, 0x0102_0304);
        assert!(legacy.records.is_none());
        assert!(!set.is_partial());
    }

    #[test]
    fn test_json_shape() {
        let set = RecordSet::from_batches(&[batch(vec![record(0, b"hi")])]);
        let value = serde_json::to_value(&set).unwrap();
        assert_eq!(value["batches"][0]["baseOffset"], 100);
        assert_eq!(value["batches"][0]["records"][0]["value"], "aGk=");
        assert!(value["batches"][0]["records"][0]["key"].is_null());
        assert!(value.get("partial").is_none());
    }
}
