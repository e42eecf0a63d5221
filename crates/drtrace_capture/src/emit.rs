//! Record emitters used by the instrumentation callbacks.

use crate::buffer::{Completion, ThreadBuffer};
use crate::error::{CaptureError, CaptureResult};
use crate::flush::TraceSink;
use drtrace_core::BlockId;
use drtrace_log::payload::{
    BLOCK_ADDRESS_OFFSET, BLOCK_CREATED_FIXED, BLOCK_ID_SIZE, TRACE_SEGMENT_FIXED,
};
use drtrace_log::{BlockCreated, BlockDeleted, HEADER_SIZE, PayloadEncode, RecordKind};

/// Room a new trace segment needs: header, thread id and one block id
const SEGMENT_MIN: usize = HEADER_SIZE + TRACE_SEGMENT_FIXED + BLOCK_ID_SIZE;

impl<S: TraceSink> ThreadBuffer<S> {
    /// Emit a complete record for a typed payload.
    ///
    /// # Errors
    ///
    /// See [`ThreadBuffer::emit_with`].
    pub fn emit<P: PayloadEncode>(&mut self, payload: &P) -> CaptureResult<Completion> {
        let len = payload.encoded_len();
        self.emit_with(payload.kind(), |spare| {
            let mut out = spare.get_mut(..len)?;
            payload.encode_into(&mut out);
            Some(len)
        })
    }

    /// Emit a complete record whose payload `encode` writes in place.
    ///
    /// Any open record is completed first. If the payload does not fit, the
    /// attempt is cancelled, the buffer flushed and `encode` called once more
    /// on the empty buffer.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::RecordTooLarge`] if the payload does not fit
    /// even after a flush, or any flush error.
    pub fn emit_with<F>(&mut self, kind: RecordKind, mut encode: F) -> CaptureResult<Completion>
    where
        F: FnMut(&mut [u8]) -> Option<usize>,
    {
        self.complete()?;
        for retry in [false, true] {
            self.open(kind)?;
            if self.write_with(&mut encode)?.is_some() {
                return self.complete();
            }
            self.cancel();
            if !retry {
                self.flush()?;
            }
        }
        Err(CaptureError::RecordTooLarge {
            kind,
            capacity: self.capacity(),
        })
    }

    /// Record creation of a block whose code bytes are known up front
    ///
    /// # Errors
    ///
    /// See [`ThreadBuffer::emit_with`].
    pub fn record_block_created(
        &mut self,
        id: BlockId,
        start_address: usize,
        code: &[u8],
    ) -> CaptureResult<()> {
        self.emit(&BlockCreated {
            id,
            start_address,
            code,
        })?;
        Ok(())
    }

    /// Record creation of a block, letting `encode_code` write the code
    /// region directly after the fixed fields.
    ///
    /// `encode_code` returns the bytes written, or `None` if the code does
    /// not fit the slice it was given. It may be called twice.
    ///
    /// # Errors
    ///
    /// See [`ThreadBuffer::emit_with`].
    pub fn record_block_created_with<F>(
        &mut self,
        id: BlockId,
        start_address: usize,
        mut encode_code: F,
    ) -> CaptureResult<()>
    where
        F: FnMut(&mut [u8]) -> Option<usize>,
    {
        self.emit_with(RecordKind::BlockCreated, |spare| {
            if spare.len() < BLOCK_CREATED_FIXED {
                return None;
            }
            let (fixed, code) = spare.split_at_mut(BLOCK_CREATED_FIXED);
            let (head, address) = fixed.split_at_mut(BLOCK_ADDRESS_OFFSET);
            let (id_bytes, padding) = head.split_at_mut(BLOCK_ID_SIZE);
            id_bytes.copy_from_slice(&id.as_u32().to_ne_bytes());
            padding.fill(0);
            address.copy_from_slice(&start_address.to_ne_bytes());
            let written = encode_code(code)?;
            (written <= code.len()).then_some(BLOCK_CREATED_FIXED + written)
        })?;
        Ok(())
    }

    /// Record deletion of a block
    ///
    /// # Errors
    ///
    /// See [`ThreadBuffer::emit_with`].
    pub fn record_block_deleted(&mut self, id: BlockId) -> CaptureResult<()> {
        self.emit(&BlockDeleted { id })?;
        Ok(())
    }

    /// Append one executed block to this thread's open trace segment.
    ///
    /// A segment is opened on demand. When the buffer is full it is flushed,
    /// which completes the segment, and a fresh one is started.
    ///
    /// # Errors
    ///
    /// Returns error if the flush fails.
    pub fn record_execution(&mut self, id: BlockId) -> CaptureResult<()> {
        if !self.is_open(RecordKind::TraceSegment) || self.available() < BLOCK_ID_SIZE {
            self.start_segment()?;
        }
        self.append(&id.as_u32().to_ne_bytes())
    }

    fn start_segment(&mut self) -> CaptureResult<()> {
        self.complete()?;
        if self.available() < SEGMENT_MIN {
            self.flush()?;
            if self.available() < SEGMENT_MIN {
                return Err(CaptureError::RecordTooLarge {
                    kind: RecordKind::TraceSegment,
                    capacity: self.capacity(),
                });
            }
        }
        self.open(RecordKind::TraceSegment)?;
        let thread = self.thread_id().as_u32().to_ne_bytes();
        self.append(&thread)
    }
}
