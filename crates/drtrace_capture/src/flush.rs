//! Serialized appends of whole thread buffers to the shared trace file.
//!
//! The lock is taken once per flushed buffer, not once per record. Within the
//! critical section the file offset is queried for diagnostics and the used
//! bytes are written with a single call, so records from different threads
//! never interleave mid-record.

use crate::error::{CaptureError, CaptureResult};
use drtrace_core::ThreadId;
use serde::{Deserialize, Serialize};
use std::io::{Seek, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Append-only destination for flushed buffers
pub trait TraceSink: Send {
    /// Current append offset
    fn tell(&mut self) -> std::io::Result<u64>;

    /// Write `bytes` with a single call, returning how many were taken
    fn append(&mut self, bytes: &[u8]) -> std::io::Result<usize>;

    /// Push buffered data to the underlying storage
    fn sync(&mut self) -> std::io::Result<()>;
}

impl<T: Write + Seek + Send> TraceSink for T {
    fn tell(&mut self) -> std::io::Result<u64> {
        self.stream_position()
    }

    fn append(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
        self.write(bytes)
    }

    fn sync(&mut self) -> std::io::Result<()> {
        self.flush()
    }
}

/// Where one flush landed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushReport {
    /// File offset of the first byte written
    pub offset: u64,
    /// Bytes written
    pub len: usize,
}

/// Flush counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlushStats {
    /// Successful flushes
    pub flushes: u64,
    /// Bytes written by successful flushes
    pub bytes: u64,
}

/// Owns the shared sink; the only way to reach it is a locked append.
pub struct FlushCoordinator<S> {
    sink: Mutex<S>,
    flushes: AtomicU64,
    bytes: AtomicU64,
}

impl<S: TraceSink> FlushCoordinator<S> {
    /// Wrap a sink
    #[must_use]
    pub fn new(sink: S) -> Self {
        Self {
            sink: Mutex::new(sink),
            flushes: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    /// Append `bytes` as one contiguous write on behalf of `thread_id`.
    ///
    /// # Errors
    ///
    /// Every error is fatal: the offset query failed, the write failed or
    /// took fewer bytes than given, or the lock is poisoned. Nothing is
    /// retried.
    pub fn append(&self, thread_id: ThreadId, bytes: &[u8]) -> CaptureResult<FlushReport> {
        let expected = bytes.len();
        let (offset, written) = {
            let mut sink = self.sink.lock().map_err(|_| CaptureError::LockPoisoned)?;
            let offset = sink.tell().map_err(CaptureError::Tell)?;
            tracing::info!(
                thread = %thread_id,
                size = expected,
                offset,
                "flushing thread buffer"
            );
            let written = sink.append(bytes).map_err(CaptureError::Write)?;
            (offset, written)
        };

        if written != expected {
            return Err(CaptureError::ShortWrite { written, expected });
        }

        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(expected as u64, Ordering::Relaxed);
        Ok(FlushReport {
            offset,
            len: expected,
        })
    }

    /// Push buffered data to storage
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned or the sink fails.
    pub fn sync(&self) -> CaptureResult<()> {
        let mut sink = self.sink.lock().map_err(|_| CaptureError::LockPoisoned)?;
        sink.sync().map_err(CaptureError::Write)
    }

    /// Run `f` against the sink while holding the lock
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn inspect<R>(&self, f: impl FnOnce(&S) -> R) -> CaptureResult<R> {
        let sink = self.sink.lock().map_err(|_| CaptureError::LockPoisoned)?;
        Ok(f(&sink))
    }

    /// Counters so far
    #[must_use]
    pub fn stats(&self) -> FlushStats {
        FlushStats {
            flushes: self.flushes.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    /// Recover the sink
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn into_inner(self) -> CaptureResult<S> {
        self.sink.into_inner().map_err(|_| CaptureError::LockPoisoned)
    }
}
