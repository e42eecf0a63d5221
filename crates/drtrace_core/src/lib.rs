//! drtrace Core Types
//!
//! Identifiers shared by the producer and consumer sides of the trace
//! protocol. This crate contains pure types and logic with no I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod id;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use id::{BlockId, ThreadId};
