//! Per-thread staging buffer.
//!
//! A buffer is either idle or has exactly one open record. Records are laid
//! out back to back from offset 0; the write cursor is always the end of the
//! last complete (or currently open) record.

use crate::error::{CaptureError, CaptureResult, terminate};
use crate::flush::{FlushCoordinator, FlushReport, TraceSink};
use drtrace_core::ThreadId;
use drtrace_log::record::{self, HEADER_SIZE, OpenRecord, RecordKind, SealedRecord};
use std::fs::File;
use std::sync::Arc;

/// Outcome of [`ThreadBuffer::complete`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// No record was open
    Idle,
    /// The record was sealed and stays in the buffer
    Kept(SealedRecord),
    /// An empty trace segment was discarded
    Elided,
}

/// Fixed-capacity record buffer owned by one thread
pub struct ThreadBuffer<S: TraceSink = File> {
    thread_id: ThreadId,
    data: Box<[u8]>,
    cursor: usize,
    open: Option<OpenRecord>,
    coordinator: Arc<FlushCoordinator<S>>,
    finished: bool,
}

impl<S: TraceSink> ThreadBuffer<S> {
    /// Create an empty buffer of `capacity` bytes
    #[must_use]
    pub fn new(thread_id: ThreadId, capacity: usize, coordinator: Arc<FlushCoordinator<S>>) -> Self {
        Self {
            thread_id,
            data: vec![0u8; capacity].into_boxed_slice(),
            cursor: 0,
            open: None,
            coordinator,
            finished: false,
        }
    }

    /// Owning thread
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Total size of the data region
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes staged, including any open record
    #[must_use]
    pub fn used(&self) -> usize {
        self.cursor
    }

    /// Bytes left between the write cursor and the end of the buffer
    #[must_use]
    pub fn available(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// Kind of the open record, if any
    #[must_use]
    pub fn open_kind(&self) -> Option<RecordKind> {
        self.open.map(|open| open.kind())
    }

    /// Whether a record of `kind` is open
    #[must_use]
    pub fn is_open(&self, kind: RecordKind) -> bool {
        self.open_kind() == Some(kind)
    }

    /// Staged bytes, including any open record
    #[must_use]
    pub fn staged(&self) -> &[u8] {
        &self.data[..self.cursor]
    }

    /// Start a record of `kind`, flushing first if the header would not fit.
    ///
    /// # Errors
    ///
    /// Returns error if a record is already open, or if the flush fails.
    pub fn open(&mut self, kind: RecordKind) -> CaptureResult<()> {
        if let Some(open) = self.open {
            return Err(CaptureError::RecordAlreadyOpen {
                requested: kind,
                open: open.kind(),
            });
        }
        if self.available() < HEADER_SIZE {
            self.flush()?;
        }
        let open = record::begin(&mut self.data, self.cursor, kind)?;
        self.cursor = open.payload_start();
        self.open = Some(open);
        Ok(())
    }

    /// Append payload bytes to the open record.
    ///
    /// # Errors
    ///
    /// Returns error if no record is open or the bytes do not fit; nothing is
    /// written in either case.
    pub fn append(&mut self, bytes: &[u8]) -> CaptureResult<()> {
        if self.open.is_none() {
            return Err(CaptureError::NoOpenRecord);
        }
        let available = self.available();
        if bytes.len() > available {
            return Err(CaptureError::Overflow {
                requested: bytes.len(),
                available,
            });
        }
        self.data[self.cursor..self.cursor + bytes.len()].copy_from_slice(bytes);
        self.cursor += bytes.len();
        Ok(())
    }

    /// Let `encode` write directly into the remaining region.
    ///
    /// `encode` returns how many bytes it wrote, or `None` if the payload did
    /// not fit, in which case the cursor does not move.
    ///
    /// # Errors
    ///
    /// Returns error if no record is open or `encode` claims more bytes than
    /// it was given.
    pub fn write_with<F>(&mut self, encode: F) -> CaptureResult<Option<usize>>
    where
        F: FnOnce(&mut [u8]) -> Option<usize>,
    {
        if self.open.is_none() {
            return Err(CaptureError::NoOpenRecord);
        }
        let spare = &mut self.data[self.cursor..];
        let available = spare.len();
        match encode(spare) {
            Some(written) if written <= available => {
                self.cursor += written;
                Ok(Some(written))
            }
            Some(written) => Err(CaptureError::Overflow {
                requested: written,
                available,
            }),
            None => Ok(None),
        }
    }

    /// Seal the open record. An empty trace segment is discarded instead,
    /// leaving the buffer exactly as it was before it was opened.
    ///
    /// # Errors
    ///
    /// Returns error if the record length cannot be encoded.
    pub fn complete(&mut self) -> CaptureResult<Completion> {
        let Some(open) = self.open.take() else {
            return Ok(Completion::Idle);
        };
        let sealed = open.finish(&mut self.data, self.cursor)?;
        if sealed.kind == RecordKind::TraceSegment && sealed.is_empty() {
            self.cursor = sealed.start;
            return Ok(Completion::Elided);
        }
        Ok(Completion::Kept(sealed))
    }

    /// Discard the open record, if any
    pub fn cancel(&mut self) {
        if let Some(open) = self.open.take() {
            self.cursor = open.start();
        }
    }

    /// Complete any open record and hand the staged bytes to the coordinator.
    ///
    /// Returns `None` without touching the file when nothing is staged.
    ///
    /// # Errors
    ///
    /// Flush failures are fatal; see [`CaptureError::is_fatal`].
    pub fn flush(&mut self) -> CaptureResult<Option<FlushReport>> {
        self.complete()?;
        if self.cursor == 0 {
            return Ok(None);
        }
        let report = self
            .coordinator
            .append(self.thread_id, &self.data[..self.cursor])?;
        self.cursor = 0;
        Ok(Some(report))
    }

    /// Flush at thread exit
    ///
    /// # Errors
    ///
    /// Flush failures are fatal; see [`CaptureError::is_fatal`].
    pub fn finish(mut self) -> CaptureResult<Option<FlushReport>> {
        tracing::info!(thread = %self.thread_id, staged = self.cursor, "cleaning up thread buffer");
        self.finished = true;
        self.flush()
    }
}

impl<S: TraceSink> Drop for ThreadBuffer<S> {
    fn drop(&mut self) {
        if self.finished || (self.cursor == 0 && self.open.is_none()) {
            return;
        }
        if let Err(err) = self.flush() {
            if err.is_fatal() {
                terminate(&err);
            }
            tracing::warn!(thread = %self.thread_id, error = %err, "dropping unflushed records");
        }
    }
}
