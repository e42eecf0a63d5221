//! Record framing: header layout, sealing and bounds-checked reads.

use crate::payload::PayloadEncode;
use bytes::{Buf, BufMut};
use drtrace_core::CoreError;

/// Size of the `{kind, total_length}` header
pub const HEADER_SIZE: usize = 8;

/// Tag of a block-created record
pub const TAG_BLOCK_CREATED: u32 = 0x4242_4242;
/// Tag of a block-deleted record
pub const TAG_BLOCK_DELETED: u32 = 0x4444_4444;
/// Tag of a trace-segment record
pub const TAG_TRACE_SEGMENT: u32 = 0x3030_3030;

/// Record kind, selected by the numeric tag in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// A code unit was created
    BlockCreated,
    /// A code unit was deleted
    BlockDeleted,
    /// A batch of executions by one thread
    TraceSegment,
    /// Any other tag; consumers must treat this as fatal
    Unrecognized(u32),
}

impl RecordKind {
    /// Map a wire tag to a kind
    #[must_use]
    pub const fn from_tag(tag: u32) -> Self {
        match tag {
            TAG_BLOCK_CREATED => Self::BlockCreated,
            TAG_BLOCK_DELETED => Self::BlockDeleted,
            TAG_TRACE_SEGMENT => Self::TraceSegment,
            other => Self::Unrecognized(other),
        }
    }

    /// Wire tag for this kind
    #[must_use]
    pub const fn tag(self) -> u32 {
        match self {
            Self::BlockCreated => TAG_BLOCK_CREATED,
            Self::BlockDeleted => TAG_BLOCK_DELETED,
            Self::TraceSegment => TAG_TRACE_SEGMENT,
            Self::Unrecognized(tag) => tag,
        }
    }

    /// Whether this is one of the three known kinds
    #[must_use]
    pub const fn is_recognized(self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlockCreated => write!(f, "block-created"),
            Self::BlockDeleted => write!(f, "block-deleted"),
            Self::TraceSegment => write!(f, "trace-segment"),
            Self::Unrecognized(tag) => write!(f, "unrecognized({:#x})", tag),
        }
    }
}

/// Decoded record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Record kind
    pub kind: RecordKind,
    /// Full size, including the header
    pub total_length: u32,
}

impl RecordHeader {
    /// Write the header in native byte order
    pub fn encode_into<B: BufMut>(&self, out: &mut B) {
        out.put_u32_ne(self.kind.tag());
        out.put_u32_ne(self.total_length);
    }

    /// Decode a header from the front of `bytes`
    #[must_use]
    pub fn decode(mut bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        let kind = RecordKind::from_tag(bytes.get_u32_ne());
        let total_length = bytes.get_u32_ne();
        Some(Self { kind, total_length })
    }
}

/// Why a record's framing cannot be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformation {
    /// Fewer than [`HEADER_SIZE`] bytes left
    TruncatedHeader {
        /// Bytes left at the record offset
        available: usize,
    },
    /// Declared length smaller than the header itself
    LengthTooShort {
        /// Declared length
        total_length: u32,
    },
    /// Declared length runs past the end of the input
    LengthOverrun {
        /// Declared length
        total_length: u32,
        /// Bytes left at the record offset
        available: usize,
    },
}

impl std::fmt::Display for Malformation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TruncatedHeader { available } => {
                write!(f, "only {} bytes left for an {}-byte header", available, HEADER_SIZE)
            }
            Self::LengthTooShort { total_length } => {
                write!(f, "declared length {} is shorter than the header", total_length)
            }
            Self::LengthOverrun {
                total_length,
                available,
            } => write!(
                f,
                "declared length {} exceeds the {} bytes left",
                total_length, available
            ),
        }
    }
}

/// Record framing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// Header or declared length is structurally impossible
    #[error("Malformed record at offset {offset:#x}: {detail}")]
    MalformedRecord { offset: usize, detail: Malformation },

    /// Not enough room to write a record
    #[error("Record buffer too small: need {needed} bytes, {available} available")]
    BufferTooSmall { needed: usize, available: usize },

    /// Record does not fit the 32-bit length field
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// A record whose header has been written but whose length is not yet known.
///
/// Returned by [`begin`] and consumed by [`OpenRecord::finish`], so a record
/// can only be sealed while it is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "an open record must be finished or discarded"]
pub struct OpenRecord {
    start: usize,
    kind: RecordKind,
}

impl OpenRecord {
    /// Offset of the record header
    #[must_use]
    pub const fn start(&self) -> usize {
        self.start
    }

    /// Kind written into the header
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Offset where payload bytes begin
    #[must_use]
    pub const fn payload_start(&self) -> usize {
        self.start + HEADER_SIZE
    }

    /// Seal the record: `total_length` becomes `end - start`.
    ///
    /// # Errors
    ///
    /// Returns error if `end` lies before the payload start or past the
    /// buffer, or if the length does not fit in 32 bits.
    pub fn finish(self, buf: &mut [u8], end: usize) -> Result<SealedRecord, FormatError> {
        if end > buf.len() {
            return Err(FormatError::BufferTooSmall {
                needed: end.saturating_sub(self.start),
                available: buf.len().saturating_sub(self.start),
            });
        }
        let len = end.saturating_sub(self.start);
        let total_length = u32::try_from(len).map_err(|_| CoreError::FieldOverflow {
            field: "total_length",
            value: len as u64,
        })?;
        if len < HEADER_SIZE {
            return Err(FormatError::MalformedRecord {
                offset: self.start,
                detail: Malformation::LengthTooShort { total_length },
            });
        }

        let mut header = &mut buf[self.start..self.start + HEADER_SIZE];
        RecordHeader {
            kind: self.kind,
            total_length,
        }
        .encode_into(&mut header);

        Ok(SealedRecord {
            start: self.start,
            kind: self.kind,
            total_length,
        })
    }
}

/// A record with its final length written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealedRecord {
    /// Offset of the record header
    pub start: usize,
    /// Record kind
    pub kind: RecordKind,
    /// Full size, including the header
    pub total_length: u32,
}

impl SealedRecord {
    /// Whether the record carries no payload
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total_length as usize == HEADER_SIZE
    }
}

/// Write a placeholder header for `kind` at `at` and open the record.
///
/// # Errors
///
/// Returns error if fewer than [`HEADER_SIZE`] bytes remain after `at`.
pub fn begin(buf: &mut [u8], at: usize, kind: RecordKind) -> Result<OpenRecord, FormatError> {
    let available = buf.len().saturating_sub(at);
    if available < HEADER_SIZE {
        return Err(FormatError::BufferTooSmall {
            needed: HEADER_SIZE,
            available,
        });
    }
    let mut header = &mut buf[at..at + HEADER_SIZE];
    RecordHeader {
        kind,
        total_length: 0,
    }
    .encode_into(&mut header);
    Ok(OpenRecord { start: at, kind })
}

/// A framed record borrowed from the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord<'a> {
    /// Offset of the header in the input
    pub offset: usize,
    /// Record kind
    pub kind: RecordKind,
    /// Full size, including the header
    pub total_length: u32,
    /// Payload bytes, not copied
    pub payload: &'a [u8],
}

/// Decode the record starting at `offset` without copying its payload.
///
/// # Errors
///
/// Returns [`FormatError::MalformedRecord`] if the header is truncated, the
/// declared length is shorter than the header, or the record would run past
/// the end of `bytes`.
pub fn read(bytes: &[u8], offset: usize) -> Result<RawRecord<'_>, FormatError> {
    let rest = bytes.get(offset..).unwrap_or(&[]);
    let header = RecordHeader::decode(rest).ok_or(FormatError::MalformedRecord {
        offset,
        detail: Malformation::TruncatedHeader {
            available: rest.len(),
        },
    })?;

    let len = header.total_length as usize;
    if len < HEADER_SIZE {
        return Err(FormatError::MalformedRecord {
            offset,
            detail: Malformation::LengthTooShort {
                total_length: header.total_length,
            },
        });
    }
    if len > rest.len() {
        return Err(FormatError::MalformedRecord {
            offset,
            detail: Malformation::LengthOverrun {
                total_length: header.total_length,
                available: rest.len(),
            },
        });
    }

    Ok(RawRecord {
        offset,
        kind: header.kind,
        total_length: header.total_length,
        payload: &rest[HEADER_SIZE..len],
    })
}

/// Frame raw payload bytes as a complete record.
///
/// # Errors
///
/// Returns error if the record length does not fit in 32 bits.
pub fn encode_raw(kind: RecordKind, payload: &[u8]) -> Result<Vec<u8>, FormatError> {
    let len = HEADER_SIZE + payload.len();
    let total_length = u32::try_from(len).map_err(|_| CoreError::FieldOverflow {
        field: "total_length",
        value: len as u64,
    })?;
    let mut out = Vec::with_capacity(len);
    RecordHeader { kind, total_length }.encode_into(&mut out);
    out.put_slice(payload);
    Ok(out)
}

/// Encode a typed payload as a complete record.
///
/// # Errors
///
/// Returns error if the record length does not fit in 32 bits.
pub fn encode_payload<P: PayloadEncode>(payload: &P) -> Result<Vec<u8>, FormatError> {
    let mut body = Vec::with_capacity(payload.encoded_len());
    payload.encode_into(&mut body);
    encode_raw(payload.kind(), &body)
}
