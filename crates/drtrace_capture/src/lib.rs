//! drtrace Capture
//!
//! Producer side of the trace protocol. Each worker thread owns a
//! [`ThreadBuffer`] and stages records in it without synchronization; a full
//! or finished buffer is handed to the shared [`FlushCoordinator`], which
//! appends it to the trace file as one contiguous write under a lock.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod config;
pub mod emit;
pub mod error;
pub mod flush;
pub mod session;

pub use buffer::{Completion, ThreadBuffer};
pub use config::{CaptureConfig, DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE};
pub use error::{CaptureError, CaptureResult, terminate};
pub use flush::{FlushCoordinator, FlushReport, FlushStats, TraceSink};
pub use session::CaptureSession;
