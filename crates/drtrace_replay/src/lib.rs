//! drtrace Replay
//!
//! Single-pass, single-threaded consumer of a finished trace. Reconstructs
//! the set of live blocks from the append-only record stream, reports
//! advisory violations and accumulates execution statistics. A record that
//! cannot be framed or interpreted ends the scan with
//! [`ReplayError::MalformedStream`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dump;
pub mod engine;
pub mod error;
pub mod registry;
pub mod violation;

pub use engine::{ReplayConfig, ReplayState, ReplaySummary, Replayer, TrackedEvent};
pub use error::{ReplayError, ReplayResult, StreamFault};
pub use registry::{LiveBlock, LiveBlockRegistry};
pub use violation::{Violation, ViolationCounts};
