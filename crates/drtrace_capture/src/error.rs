//! Capture errors and the process-termination path.

use drtrace_log::{FormatError, RecordKind};

/// Capture result type
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Producer-side errors
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Invalid configuration
    #[error("Invalid capture configuration: {0}")]
    InvalidConfig(String),

    /// Opening the trace file failed
    #[error("Failed to open trace file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Querying the file offset failed
    #[error("Failed to query trace file offset: {0}")]
    Tell(#[source] std::io::Error),

    /// The write system call failed
    #[error("Failed to write trace file: {0}")]
    Write(#[source] std::io::Error),

    /// The write did not take every byte
    #[error("Short write to trace file: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// Another flusher panicked while holding the file lock
    #[error("Trace file lock poisoned")]
    LockPoisoned,

    /// A record was opened while another one is still open
    #[error("Cannot open {requested} record: {open} record still open")]
    RecordAlreadyOpen {
        requested: RecordKind,
        open: RecordKind,
    },

    /// Payload bytes written with no record open
    #[error("No record is open")]
    NoOpenRecord,

    /// Payload bytes do not fit in the remaining buffer
    #[error("Buffer overflow: {requested} bytes requested, {available} available")]
    Overflow { requested: usize, available: usize },

    /// A record cannot fit even in an empty buffer
    #[error("{kind} record does not fit an empty {capacity}-byte buffer")]
    RecordTooLarge { kind: RecordKind, capacity: usize },

    /// Record framing failed
    #[error(transparent)]
    Format(#[from] FormatError),
}

impl CaptureError {
    /// Whether the process must terminate.
    ///
    /// A partially flushed shared file cannot be repaired without risking
    /// interleaving with another writer, so flush-path failures are never
    /// retried.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Open { .. }
                | Self::Tell(_)
                | Self::Write(_)
                | Self::ShortWrite { .. }
                | Self::LockPoisoned
                | Self::RecordTooLarge { .. }
        )
    }
}

/// Log a fatal capture error and terminate the process with status 1.
pub fn terminate(err: &CaptureError) -> ! {
    tracing::error!(error = %err, "fatal capture error, terminating");
    std::process::exit(1)
}
