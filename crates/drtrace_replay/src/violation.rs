//! Advisory protocol violations.
//!
//! A violation is logged and counted but never stops the scan.

use drtrace_core::{BlockId, ThreadId};
use serde::{Deserialize, Serialize};

/// An inconsistency between records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// A block was created while another block with the same id was live.
    /// The existing entry is kept.
    DuplicateBlock {
        /// Block identifier
        id: BlockId,
        /// Offset of the rejected creation
        offset: usize,
        /// Offset of the creation that stays live
        existing_offset: usize,
    },
    /// A block that is not live was deleted
    DanglingDelete {
        /// Block identifier
        id: BlockId,
        /// Offset of the deletion
        offset: usize,
    },
    /// A block that is not live was executed
    DanglingExecution {
        /// Block identifier
        id: BlockId,
        /// Executing thread
        thread_id: ThreadId,
        /// Offset of the trace segment
        offset: usize,
    },
}

impl Violation {
    /// Block the violation refers to
    #[must_use]
    pub fn block_id(&self) -> BlockId {
        match self {
            Self::DuplicateBlock { id, .. }
            | Self::DanglingDelete { id, .. }
            | Self::DanglingExecution { id, .. } => *id,
        }
    }

    /// Offset of the record that triggered it
    #[must_use]
    pub fn offset(&self) -> usize {
        match self {
            Self::DuplicateBlock { offset, .. }
            | Self::DanglingDelete { offset, .. }
            | Self::DanglingExecution { offset, .. } => *offset,
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateBlock {
                id,
                offset,
                existing_offset,
            } => write!(
                f,
                "duplicate block {} created at offset {:#x}, already live since {:#x}",
                id, offset, existing_offset
            ),
            Self::DanglingDelete { id, offset } => {
                write!(f, "non-existent block {} deleted at offset {:#x}", id, offset)
            }
            Self::DanglingExecution {
                id,
                thread_id,
                offset,
            } => write!(
                f,
                "non-existent block {} executed by thread {} at offset {:#x}",
                id, thread_id, offset
            ),
        }
    }
}

/// Per-kind violation counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViolationCounts {
    /// Rejected duplicate creations
    pub duplicate_blocks: u64,
    /// Deletions of blocks that were not live
    pub dangling_deletes: u64,
    /// Executions of blocks that were not live
    pub dangling_executions: u64,
}

impl ViolationCounts {
    /// Count one violation
    pub fn record(&mut self, violation: &Violation) {
        match violation {
            Violation::DuplicateBlock { .. } => self.duplicate_blocks += 1,
            Violation::DanglingDelete { .. } => self.dangling_deletes += 1,
            Violation::DanglingExecution { .. } => self.dangling_executions += 1,
        }
    }

    /// Sum over all kinds
    #[must_use]
    pub fn total(&self) -> u64 {
        self.duplicate_blocks + self.dangling_deletes + self.dangling_executions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let mut counts = ViolationCounts::default();
        counts.record(&Violation::DanglingDelete {
            id: BlockId::new(2),
            offset: 0,
        });
        counts.record(&Violation::DanglingExecution {
            id: BlockId::new(3),
            thread_id: ThreadId::new(1),
            offset: 12,
        });
        counts.record(&Violation::DanglingExecution {
            id: BlockId::new(3),
            thread_id: ThreadId::new(1),
            offset: 12,
        });
        assert_eq!(counts.dangling_deletes, 1);
        assert_eq!(counts.dangling_executions, 2);
        assert_eq!(counts.duplicate_blocks, 0);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_display() {
        let violation = Violation::DanglingDelete {
            id: BlockId::new(0x2a),
            offset: 0x18,
        };
        assert_eq!(
            violation.to_string(),
            "non-existent block 0x2a deleted at offset 0x18"
        );
        assert_eq!(violation.block_id(), BlockId::new(0x2a));
        assert_eq!(violation.offset(), 0x18);
    }

    #[test]
    fn test_serialized_tag() {
        let violation = Violation::DuplicateBlock {
            id: BlockId::new(1),
            offset: 40,
            existing_offset: 0,
        };
        let json = serde_json::to_value(violation).unwrap();
        assert_eq!(json["kind"], "duplicate_block");
        assert_eq!(json["id"], 1);
    }
}
