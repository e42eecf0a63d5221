//! Payload layouts for the three record kinds.
//!
//! All fields are native-endian. Addresses are `usize`-sized, matching the
//! producing platform. The block-created address sits at its natural
//! alignment, as a C producer lays out `{u32 id; uintptr_t pc; u8 code[];}`;
//! every other field is packed.

use crate::record::{FormatError, RawRecord, RecordKind};
use bytes::{Buf, BufMut};
use drtrace_core::{BlockId, CoreError, ThreadId};

/// Size of an address field
pub const ADDRESS_SIZE: usize = std::mem::size_of::<usize>();
/// Size of a block identifier on the wire
pub const BLOCK_ID_SIZE: usize = std::mem::size_of::<u32>();
/// Offset of the start address in a block-created payload
pub const BLOCK_ADDRESS_OFFSET: usize = align_up(BLOCK_ID_SIZE, std::mem::align_of::<usize>());
/// Fixed part of a block-created payload: id, padding, start address
pub const BLOCK_CREATED_FIXED: usize = BLOCK_ADDRESS_OFFSET + ADDRESS_SIZE;
/// Size of a block-deleted payload
pub const BLOCK_DELETED_SIZE: usize = BLOCK_ID_SIZE;
/// Fixed part of a trace-segment payload: thread id
pub const TRACE_SEGMENT_FIXED: usize = std::mem::size_of::<u32>();
/// Fixed part of a code chunk: pc, size
pub const CODE_CHUNK_FIXED: usize = ADDRESS_SIZE + std::mem::size_of::<u32>();

const fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) / align * align
}

fn get_address(buf: &mut &[u8]) -> usize {
    let mut raw = [0u8; ADDRESS_SIZE];
    buf.copy_to_slice(&mut raw);
    usize::from_ne_bytes(raw)
}

/// Payload decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    /// Payload cannot hold the fixed fields of its kind
    #[error("{kind} payload of {len} bytes is shorter than its {needed}-byte fixed part")]
    TooShort {
        kind: RecordKind,
        len: usize,
        needed: usize,
    },

    /// Trailing bytes that do not form a whole block id
    #[error("trace segment id list of {len} bytes is not a whole number of 32-bit ids")]
    RaggedIdList { len: usize },

    /// Chunk header cut off by the end of the code region
    #[error("code chunk header at byte {at} truncated: {available} bytes left")]
    TruncatedChunk { at: usize, available: usize },

    /// Chunk body runs past the end of the code region
    #[error("code chunk at byte {at} declares {size} bytes but only {available} remain")]
    ChunkOverrun {
        at: usize,
        size: usize,
        available: usize,
    },
}

/// Producer-side encoding of a typed payload
pub trait PayloadEncode {
    /// Record kind this payload is framed with
    fn kind(&self) -> RecordKind;

    /// Exact number of bytes [`PayloadEncode::encode_into`] writes
    fn encoded_len(&self) -> usize;

    /// Write the payload. `out` must have room for `encoded_len()` bytes.
    fn encode_into<B: BufMut>(&self, out: &mut B);
}

/// A code unit was created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCreated<'a> {
    /// Identifier, unique among live blocks
    pub id: BlockId,
    /// Address of the first instruction
    pub start_address: usize,
    /// Raw code region
    pub code: &'a [u8],
}

impl<'a> BlockCreated<'a> {
    /// Decode from a payload slice
    ///
    /// # Errors
    ///
    /// Returns error if the payload cannot hold the id and address.
    pub fn decode(mut bytes: &'a [u8]) -> Result<Self, PayloadError> {
        if bytes.len() < BLOCK_CREATED_FIXED {
            return Err(PayloadError::TooShort {
                kind: RecordKind::BlockCreated,
                len: bytes.len(),
                needed: BLOCK_CREATED_FIXED,
            });
        }
        let id = BlockId::new(bytes.get_u32_ne());
        bytes.advance(BLOCK_ADDRESS_OFFSET - BLOCK_ID_SIZE);
        let start_address = get_address(&mut bytes);
        Ok(Self {
            id,
            start_address,
            code: bytes,
        })
    }

    /// Interpret the code region as packed [`CodeChunk`]s
    #[must_use]
    pub fn chunks(&self) -> CodeChunks<'a> {
        CodeChunks::new(self.code)
    }
}

impl PayloadEncode for BlockCreated<'_> {
    fn kind(&self) -> RecordKind {
        RecordKind::BlockCreated
    }

    fn encoded_len(&self) -> usize {
        BLOCK_CREATED_FIXED + self.code.len()
    }

    fn encode_into<B: BufMut>(&self, out: &mut B) {
        out.put_u32_ne(self.id.as_u32());
        out.put_bytes(0, BLOCK_ADDRESS_OFFSET - BLOCK_ID_SIZE);
        out.put_slice(&self.start_address.to_ne_bytes());
        out.put_slice(self.code);
    }
}

/// A code unit was deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDeleted {
    /// Identifier of the deleted block
    pub id: BlockId,
}

impl BlockDeleted {
    /// Decode from a payload slice. Bytes past the id are ignored.
    ///
    /// # Errors
    ///
    /// Returns error if the payload cannot hold the id.
    pub fn decode(mut bytes: &[u8]) -> Result<Self, PayloadError> {
        if bytes.len() < BLOCK_DELETED_SIZE {
            return Err(PayloadError::TooShort {
                kind: RecordKind::BlockDeleted,
                len: bytes.len(),
                needed: BLOCK_DELETED_SIZE,
            });
        }
        Ok(Self {
            id: BlockId::new(bytes.get_u32_ne()),
        })
    }
}

impl PayloadEncode for BlockDeleted {
    fn kind(&self) -> RecordKind {
        RecordKind::BlockDeleted
    }

    fn encoded_len(&self) -> usize {
        BLOCK_DELETED_SIZE
    }

    fn encode_into<B: BufMut>(&self, out: &mut B) {
        out.put_u32_ne(self.id.as_u32());
    }
}

/// Decoded view of a trace segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceSegment<'a> {
    /// Thread that performed the executions
    pub thread_id: ThreadId,
    ids: &'a [u8],
}

impl<'a> TraceSegment<'a> {
    /// Decode from a payload slice
    ///
    /// # Errors
    ///
    /// Returns error if the thread id is missing or the id list is ragged.
    pub fn decode(mut bytes: &'a [u8]) -> Result<Self, PayloadError> {
        if bytes.len() < TRACE_SEGMENT_FIXED {
            return Err(PayloadError::TooShort {
                kind: RecordKind::TraceSegment,
                len: bytes.len(),
                needed: TRACE_SEGMENT_FIXED,
            });
        }
        let thread_id = ThreadId::new(bytes.get_u32_ne());
        if bytes.len() % BLOCK_ID_SIZE != 0 {
            return Err(PayloadError::RaggedIdList { len: bytes.len() });
        }
        Ok(Self {
            thread_id,
            ids: bytes,
        })
    }

    /// Number of executed block ids
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len() / BLOCK_ID_SIZE
    }

    /// Whether the segment carries no executions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Executed block ids in execution order
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + 'a {
        let ids: &'a [u8] = self.ids;
        ids.chunks_exact(BLOCK_ID_SIZE).map(|raw| {
            let mut raw = raw;
            BlockId::new(raw.get_u32_ne())
        })
    }
}

/// Producer-side trace segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceBatch<'a> {
    /// Thread that performed the executions
    pub thread_id: ThreadId,
    /// Executed block ids in execution order
    pub block_ids: &'a [BlockId],
}

impl PayloadEncode for TraceBatch<'_> {
    fn kind(&self) -> RecordKind {
        RecordKind::TraceSegment
    }

    fn encoded_len(&self) -> usize {
        TRACE_SEGMENT_FIXED + self.block_ids.len() * BLOCK_ID_SIZE
    }

    fn encode_into<B: BufMut>(&self, out: &mut B) {
        out.put_u32_ne(self.thread_id.as_u32());
        for id in self.block_ids {
            out.put_u32_ne(id.as_u32());
        }
    }
}

/// Typed payload, selected by record kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload<'a> {
    /// Block creation
    BlockCreated(BlockCreated<'a>),
    /// Block deletion
    BlockDeleted(BlockDeleted),
    /// Execution batch
    TraceSegment(TraceSegment<'a>),
    /// Unknown tag; the bytes cannot be interpreted
    Unrecognized {
        /// The offending tag
        tag: u32,
    },
}

impl<'a> Payload<'a> {
    /// Decode the payload of a framed record
    ///
    /// # Errors
    ///
    /// Returns error if the payload length is impossible for its kind.
    pub fn decode(record: &RawRecord<'a>) -> Result<Self, PayloadError> {
        Ok(match record.kind {
            RecordKind::BlockCreated => Self::BlockCreated(BlockCreated::decode(record.payload)?),
            RecordKind::BlockDeleted => Self::BlockDeleted(BlockDeleted::decode(record.payload)?),
            RecordKind::TraceSegment => Self::TraceSegment(TraceSegment::decode(record.payload)?),
            RecordKind::Unrecognized(tag) => Self::Unrecognized { tag },
        })
    }
}

/// One contiguous piece of raw code: `{pc, size: u32, bytes[size]}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeChunk<'a> {
    /// Program counter of the first byte
    pub pc: usize,
    /// Raw bytes
    pub code: &'a [u8],
}

impl CodeChunk<'_> {
    /// Encoded size of this chunk
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        CODE_CHUNK_FIXED + self.code.len()
    }

    /// Write the chunk. `out` must have room for `encoded_len()` bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the code is longer than the 32-bit size field allows;
    /// nothing is written in that case.
    pub fn encode_into<B: BufMut>(&self, out: &mut B) -> Result<(), FormatError> {
        let size = chunk_size(self.code.len())?;
        out.put_slice(&self.pc.to_ne_bytes());
        out.put_u32_ne(size);
        out.put_slice(self.code);
        Ok(())
    }
}

fn chunk_size(len: usize) -> Result<u32, FormatError> {
    u32::try_from(len).map_err(|_| {
        FormatError::from(CoreError::FieldOverflow {
            field: "code_chunk.size",
            value: len as u64,
        })
    })
}

/// Iterator over the packed chunks of a code region.
///
/// Stops after the first error.
#[derive(Debug, Clone)]
pub struct CodeChunks<'a> {
    rest: &'a [u8],
    at: usize,
    failed: bool,
}

impl<'a> CodeChunks<'a> {
    /// Iterate over the chunks of `region`
    #[must_use]
    pub fn new(region: &'a [u8]) -> Self {
        Self {
            rest: region,
            at: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for CodeChunks<'a> {
    type Item = Result<CodeChunk<'a>, PayloadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rest.is_empty() {
            return None;
        }
        if self.rest.len() < CODE_CHUNK_FIXED {
            self.failed = true;
            return Some(Err(PayloadError::TruncatedChunk {
                at: self.at,
                available: self.rest.len(),
            }));
        }

        let mut cursor = self.rest;
        let pc = get_address(&mut cursor);
        let size = cursor.get_u32_ne() as usize;
        if size > cursor.len() {
            self.failed = true;
            return Some(Err(PayloadError::ChunkOverrun {
                at: self.at,
                size,
                available: cursor.len(),
            }));
        }

        let (code, rest) = cursor.split_at(size);
        self.rest = rest;
        self.at += CODE_CHUNK_FIXED + size;
        Some(Ok(CodeChunk { pc, code }))
    }
}
