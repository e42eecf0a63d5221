//! Fatal replay errors.

use drtrace_log::{FormatError, PayloadError};

/// Replay result type
pub type ReplayResult<T> = Result<T, ReplayError>;

/// Why the record at some offset cannot be applied
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamFault {
    /// Header carries a tag outside the known kinds
    #[error("unexpected record kind {0:#x}")]
    UnrecognizedKind(u32),

    /// Header or declared length cannot be trusted
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Payload length is impossible for its kind
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Replay errors. Every variant stops the scan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    /// The stream cannot be framed or interpreted past `offset`
    #[error("Malformed stream at offset {offset:#x} ({}): {fault}", describe_previous(.previous))]
    MalformedStream {
        /// Offset of the offending record
        offset: usize,
        /// Offset of the last record applied, if any
        previous: Option<usize>,
        /// What went wrong
        fault: StreamFault,
    },
}

fn describe_previous(previous: &Option<usize>) -> String {
    match previous {
        Some(offset) => format!("previous record is at offset {:#x}", offset),
        None => "there is no previous record".to_string(),
    }
}
