//! drtrace Record Log
//!
//! Self-describing type-length-value records, laid out back to back with no
//! padding. Every record starts with an 8-byte native-endian header
//! `{kind: u32, total_length: u32}` where `total_length` counts the header.
//! The framing layer is kind-agnostic; payload interpretation lives in
//! [`payload`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cursor;
pub mod payload;
pub mod record;
pub mod stream;

pub use cursor::Cursor;
pub use payload::{
    BlockCreated, BlockDeleted, CodeChunk, CodeChunks, Payload, PayloadEncode, PayloadError,
    TraceBatch, TraceSegment,
};
pub use record::{
    FormatError, HEADER_SIZE, Malformation, OpenRecord, RawRecord, RecordHeader, RecordKind,
    SealedRecord,
};
pub use stream::RecordStream;
