//! Single-pass replay of a finished trace.

use crate::dump;
use crate::error::{ReplayError, ReplayResult, StreamFault};
use crate::registry::LiveBlockRegistry;
use crate::violation::{Violation, ViolationCounts};
use drtrace_core::BlockId;
use drtrace_log::{BlockCreated, BlockDeleted, Payload, RawRecord, RecordStream, TraceSegment};
use serde::{Deserialize, Serialize};

/// Replay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Block whose creation and deletion are reported with their offsets
    pub track_block: Option<BlockId>,
    /// Dump the tracked block's code when it is created
    pub dump_code: bool,
    /// Keep every violation in [`ReplayState::violations`]. Counters and
    /// warnings are produced either way.
    pub retain_violations: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            track_block: None,
            dump_code: true,
            retain_violations: false,
        }
    }
}

impl ReplayConfig {
    /// Track one block id
    #[must_use]
    pub fn with_track_block(mut self, id: BlockId) -> Self {
        self.track_block = Some(id);
        self
    }

    /// Enable or disable the code dump
    #[must_use]
    pub fn with_dump_code(mut self, dump_code: bool) -> Self {
        self.dump_code = dump_code;
        self
    }

    /// Keep or drop individual violation records
    #[must_use]
    pub fn with_retain_violations(mut self, retain: bool) -> Self {
        self.retain_violations = retain;
        self
    }
}

/// Lifecycle event of the tracked block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackedEvent {
    /// Created by the record at `offset`
    Created {
        /// Record offset
        offset: usize,
    },
    /// Deleted by the record at `offset`
    Deleted {
        /// Record offset
        offset: usize,
    },
}

/// Aggregate results of a replay
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReplaySummary {
    /// Records applied
    pub records: usize,
    /// Blocks still live at end of stream
    pub live_blocks: usize,
    /// Executed block references, resolved or not
    pub blocks_executed: u64,
    /// Advisory violations by kind
    pub violations: ViolationCounts,
    /// Lifecycle of the tracked block
    pub tracked: Vec<TrackedEvent>,
}

/// State reconstructed so far
#[derive(Debug, Clone, Default)]
pub struct ReplayState<'a> {
    registry: LiveBlockRegistry<'a>,
    records: usize,
    blocks_executed: u64,
    violations: Vec<Violation>,
    counts: ViolationCounts,
    tracked: Vec<TrackedEvent>,
    retain_violations: bool,
}

impl<'a> ReplayState<'a> {
    /// Empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Live blocks
    #[must_use]
    pub fn registry(&self) -> &LiveBlockRegistry<'a> {
        &self.registry
    }

    /// Records applied
    #[must_use]
    pub fn records(&self) -> usize {
        self.records
    }

    /// Executed block references
    #[must_use]
    pub fn blocks_executed(&self) -> u64 {
        self.blocks_executed
    }

    /// Violations in stream order; empty unless
    /// [`ReplayConfig::retain_violations`] is set
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Violation counters
    #[must_use]
    pub fn violation_counts(&self) -> ViolationCounts {
        self.counts
    }

    /// Tracked block events in stream order
    #[must_use]
    pub fn tracked(&self) -> &[TrackedEvent] {
        &self.tracked
    }

    /// Snapshot of the aggregate counters
    #[must_use]
    pub fn summary(&self) -> ReplaySummary {
        ReplaySummary {
            records: self.records,
            live_blocks: self.registry.len(),
            blocks_executed: self.blocks_executed,
            violations: self.counts,
            tracked: self.tracked.clone(),
        }
    }

    fn report(&mut self, violation: Violation) {
        tracing::warn!("{}", violation);
        self.counts.record(&violation);
        if self.retain_violations {
            self.violations.push(violation);
        }
    }
}

/// Replays a trace image front to back
#[derive(Debug, Clone, Default)]
pub struct Replayer {
    config: ReplayConfig,
}

impl Replayer {
    /// Create a replayer
    #[must_use]
    pub fn new(config: ReplayConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Replay `bytes` to the end.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::MalformedStream`] at the first record that
    /// cannot be framed or interpreted. Violations are not errors.
    pub fn replay<'a>(&self, bytes: &'a [u8]) -> ReplayResult<ReplayState<'a>> {
        self.replay_with_callback(bytes, |_, _| {})
    }

    /// Replay `bytes`, calling `observe` after every applied record
    ///
    /// # Errors
    ///
    /// See [`Replayer::replay`].
    pub fn replay_with_callback<'a, F>(
        &self,
        bytes: &'a [u8],
        mut observe: F,
    ) -> ReplayResult<ReplayState<'a>>
    where
        F: FnMut(&RawRecord<'a>, &ReplayState<'a>),
    {
        if let Some(id) = self.config.track_block {
            tracing::info!(block = %id, "tracking block");
        }

        let mut state = ReplayState {
            retain_violations: self.config.retain_violations,
            ..ReplayState::new()
        };
        let mut stream = RecordStream::new(bytes);

        loop {
            let offset = stream.position();
            let previous = stream.previous_offset();
            let record = match stream.next() {
                None => break,
                Some(Ok(record)) => record,
                Some(Err(err)) => return Err(malformed(offset, previous, err.into())),
            };
            self.apply(&mut state, &record)
                .map_err(|fault| malformed(record.offset, previous, fault))?;
            state.records += 1;
            observe(&record, &state);
        }

        Ok(state)
    }

    fn apply<'a>(
        &self,
        state: &mut ReplayState<'a>,
        record: &RawRecord<'a>,
    ) -> Result<(), StreamFault> {
        match Payload::decode(record)? {
            Payload::BlockCreated(block) => self.created(state, record.offset, block),
            Payload::BlockDeleted(deleted) => self.deleted(state, record.offset, deleted),
            Payload::TraceSegment(segment) => executed(state, record.offset, &segment),
            Payload::Unrecognized { tag } => return Err(StreamFault::UnrecognizedKind(tag)),
        }
        Ok(())
    }

    fn is_tracked(&self, id: BlockId) -> bool {
        self.config.track_block == Some(id)
    }

    fn created<'a>(&self, state: &mut ReplayState<'a>, offset: usize, block: BlockCreated<'a>) {
        match state.registry.insert(offset, block) {
            Ok(()) => {
                if self.is_tracked(block.id) {
                    tracing::info!(
                        block = %block.id,
                        offset = format_args!("{:#x}", offset),
                        "tracked block created"
                    );
                    state.tracked.push(TrackedEvent::Created { offset });
                    if self.config.dump_code {
                        dump::log_code(&block);
                    }
                }
            }
            Err(existing) => state.report(Violation::DuplicateBlock {
                id: block.id,
                offset,
                existing_offset: existing.offset,
            }),
        }
    }

    fn deleted(&self, state: &mut ReplayState<'_>, offset: usize, deleted: BlockDeleted) {
        match state.registry.remove(deleted.id) {
            Some(_) => {
                if self.is_tracked(deleted.id) {
                    tracing::info!(
                        block = %deleted.id,
                        offset = format_args!("{:#x}", offset),
                        "tracked block deleted"
                    );
                    state.tracked.push(TrackedEvent::Deleted { offset });
                }
            }
            None => state.report(Violation::DanglingDelete {
                id: deleted.id,
                offset,
            }),
        }
    }
}

fn executed(state: &mut ReplayState<'_>, offset: usize, segment: &TraceSegment<'_>) {
    for id in segment.block_ids() {
        if !state.registry.contains(id) {
            state.report(Violation::DanglingExecution {
                id,
                thread_id: segment.thread_id,
                offset,
            });
        }
        state.blocks_executed += 1;
    }
}

fn malformed(offset: usize, previous: Option<usize>, fault: StreamFault) -> ReplayError {
    tracing::error!(offset = format_args!("{:#x}", offset), "{}", fault);
    match previous {
        Some(previous) => {
            tracing::info!(offset = format_args!("{:#x}", previous), "previous record")
        }
        None => tracing::info!("there is no previous record"),
    }
    ReplayError::MalformedStream {
        offset,
        previous,
        fault,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drtrace_core::ThreadId;
    use drtrace_log::record::{encode_payload, encode_raw};
    use drtrace_log::{CodeChunk, FormatError, PayloadError, RecordKind, TraceBatch};
    use proptest::prelude::*;

    fn created(id: u32) -> Vec<u8> {
        encode_payload(&BlockCreated {
            id: BlockId::new(id),
            start_address: 0x1000,
            code: &[],
        })
        .unwrap()
    }

    fn deleted(id: u32) -> Vec<u8> {
        encode_payload(&BlockDeleted { id: BlockId::new(id) }).unwrap()
    }

    fn trace(thread: u32, ids: &[u32]) -> Vec<u8> {
        let ids: Vec<BlockId> = ids.iter().copied().map(BlockId::new).collect();
        encode_payload(&TraceBatch {
            thread_id: ThreadId::new(thread),
            block_ids: &ids,
        })
        .unwrap()
    }

    fn stream(records: &[Vec<u8>]) -> Vec<u8> {
        records.iter().flatten().copied().collect()
    }

    #[test]
    fn test_create_execute_delete() {
        let bytes = stream(&[created(1), trace(7, &[1]), deleted(1)]);
        let state = Replayer::default().replay(&bytes).unwrap();
        let summary = state.summary();
        assert_eq!(summary.records, 3);
        assert_eq!(summary.live_blocks, 0);
        assert_eq!(summary.blocks_executed, 1);
        assert_eq!(summary.violations.total(), 0);
    }

    #[test]
    fn test_duplicate_creation_keeps_first() {
        let first = encode_payload(&BlockCreated {
            id: BlockId::new(1),
            start_address: 0x1000,
            code: &[0x90],
        })
        .unwrap();
        let second = encode_payload(&BlockCreated {
            id: BlockId::new(1),
            start_address: 0x2000,
            code: &[0xcc],
        })
        .unwrap();
        let bytes = stream(&[first.clone(), second]);

        let config = ReplayConfig::default().with_retain_violations(true);
        let state = Replayer::new(config).replay(&bytes).unwrap();
        assert_eq!(state.registry().len(), 1);
        assert_eq!(state.violation_counts().duplicate_blocks, 1);
        assert_eq!(
            state.violations(),
            &[Violation::DuplicateBlock {
                id: BlockId::new(1),
                offset: first.len(),
                existing_offset: 0,
            }]
        );
        let live = state.registry().get(BlockId::new(1)).unwrap();
        assert_eq!(live.block.start_address, 0x1000);
    }

    #[test]
    fn test_unrecognized_kind_is_fatal() {
        let bytes = stream(&[
            created(1),
            encode_raw(RecordKind::Unrecognized(0xdead_beef), &[0; 4]).unwrap(),
        ]);
        let err = Replayer::default().replay(&bytes).unwrap_err();
        assert_eq!(
            err,
            ReplayError::MalformedStream {
                offset: created(1).len(),
                previous: Some(0),
                fault: StreamFault::UnrecognizedKind(0xdead_beef),
            }
        );
    }

    #[test]
    fn test_unrecognized_first_record_has_no_previous() {
        let bytes = encode_raw(RecordKind::Unrecognized(1), &[]).unwrap();
        let err = Replayer::default().replay(&bytes).unwrap_err();
        assert!(matches!(
            err,
            ReplayError::MalformedStream {
                offset: 0,
                previous: None,
                ..
            }
        ));
    }

    #[test]
    fn test_dangling_delete_and_execution() {
        let bytes = stream(&[deleted(5), trace(3, &[5, 5])]);
        let config = ReplayConfig::default().with_retain_violations(true);
        let state = Replayer::new(config).replay(&bytes).unwrap();
        let counts = state.violation_counts();
        assert_eq!(counts.dangling_deletes, 1);
        assert_eq!(counts.dangling_executions, 2);
        assert_eq!(state.blocks_executed(), 2);
        assert!(matches!(
            state.violations()[1],
            Violation::DanglingExecution {
                thread_id,
                offset: 12,
                ..
            } if thread_id == ThreadId::new(3)
        ));
    }

    #[test]
    fn test_violations_counted_not_kept_by_default() {
        let ids: Vec<u32> = (0..10_000).collect();
        let bytes = stream(&[trace(1, &ids), deleted(3)]);
        let state = Replayer::default().replay(&bytes).unwrap();
        assert!(state.violations().is_empty());
        assert_eq!(state.violation_counts().dangling_executions, 10_000);
        assert_eq!(state.violation_counts().dangling_deletes, 1);
        assert_eq!(state.blocks_executed(), 10_000);
    }

    #[test]
    fn test_empty_stream() {
        let state = Replayer::default().replay(&[]).unwrap();
        assert_eq!(state.summary(), ReplaySummary::default());
    }

    #[test]
    fn test_truncated_tail_is_fatal() {
        let mut bytes = stream(&[created(1), deleted(1)]);
        bytes.truncate(bytes.len() - 2);
        let err = Replayer::default().replay(&bytes).unwrap_err();
        let ReplayError::MalformedStream {
            offset,
            previous,
            fault,
        } = err;
        assert_eq!(offset, created(1).len());
        assert_eq!(previous, Some(0));
        assert!(matches!(
            fault,
            StreamFault::Format(FormatError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_ragged_segment_is_fatal() {
        let bytes = encode_raw(RecordKind::TraceSegment, &[7, 0, 0, 0, 1]).unwrap();
        let err = Replayer::default().replay(&bytes).unwrap_err();
        assert!(matches!(
            err,
            ReplayError::MalformedStream {
                fault: StreamFault::Payload(PayloadError::RaggedIdList { len: 1 }),
                ..
            }
        ));
    }

    #[test]
    fn test_tracked_block_events() {
        let mut region: Vec<u8> = Vec::new();
        CodeChunk {
            pc: 0x1000,
            code: &[0x90, 0xc3],
        }
        .encode_into(&mut region)
        .unwrap();
        let tracked = encode_payload(&BlockCreated {
            id: BlockId::new(0x2a),
            start_address: 0x1000,
            code: &region,
        })
        .unwrap();
        let bytes = stream(&[created(1), tracked.clone(), deleted(0x2a), deleted(0x2a)]);
        let deleted_at = created(1).len() + tracked.len();

        let config = ReplayConfig::default().with_track_block(BlockId::new(0x2a));
        let state = Replayer::new(config).replay(&bytes).unwrap();
        assert_eq!(
            state.tracked(),
            &[
                TrackedEvent::Created {
                    offset: created(1).len()
                },
                TrackedEvent::Deleted { offset: deleted_at }
            ]
        );
        assert_eq!(state.violation_counts().dangling_deletes, 1);
    }

    #[test]
    fn test_callback_sees_every_record() {
        let bytes = stream(&[created(1), created(2), trace(1, &[1, 2]), deleted(2)]);
        let mut live = Vec::new();
        let mut offsets = Vec::new();
        Replayer::default()
            .replay_with_callback(&bytes, |record, state| {
                offsets.push(record.offset);
                live.push(state.registry().len());
            })
            .unwrap();
        assert_eq!(live, vec![1, 2, 2, 1]);
        assert_eq!(offsets.len(), 4);
        assert_eq!(offsets[0], 0);
    }

    #[test]
    fn test_summary_serializes() {
        let bytes = stream(&[created(1), trace(7, &[1, 9])]);
        let summary = Replayer::default().replay(&bytes).unwrap().summary();
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["records"], 2);
        assert_eq!(json["live_blocks"], 1);
        assert_eq!(json["blocks_executed"], 2);
        assert_eq!(json["violations"]["dangling_executions"], 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Create(u32),
        Delete(u32),
        Execute(Vec<u32>),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..8).prop_map(Op::Create),
            (0u32..8).prop_map(Op::Delete),
            proptest::collection::vec(0u32..8, 0..6).prop_map(Op::Execute),
        ]
    }

    fn encode_ops(ops: &[Op]) -> Vec<u8> {
        let records: Vec<Vec<u8>> = ops
            .iter()
            .map(|op| match op {
                Op::Create(id) => created(*id),
                Op::Delete(id) => deleted(*id),
                Op::Execute(ids) => trace(1, ids),
            })
            .collect();
        stream(&records)
    }

    proptest! {
        #[test]
        fn prop_live_set_matches_model(ops in proptest::collection::vec(op_strategy(), 0..60)) {
            let bytes = encode_ops(&ops);
            let mut observed = Vec::new();
            let state = Replayer::default()
                .replay_with_callback(&bytes, |_, state| {
                    let mut live: Vec<u32> = state.registry().ids().map(BlockId::as_u32).collect();
                    live.sort_unstable();
                    observed.push(live);
                })
                .unwrap();

            let mut model = std::collections::BTreeSet::new();
            let mut expected = Vec::new();
            let mut duplicates = 0u64;
            let mut dangling_deletes = 0u64;
            for op in &ops {
                match op {
                    Op::Create(id) => {
                        if !model.insert(*id) {
                            duplicates += 1;
                        }
                    }
                    Op::Delete(id) => {
                        if !model.remove(id) {
                            dangling_deletes += 1;
                        }
                    }
                    Op::Execute(_) => {}
                }
                expected.push(model.iter().copied().collect::<Vec<u32>>());
            }

            prop_assert_eq!(observed, expected);
            prop_assert_eq!(state.violation_counts().duplicate_blocks, duplicates);
            prop_assert_eq!(state.violation_counts().dangling_deletes, dangling_deletes);
            prop_assert_eq!(state.records(), ops.len());
        }

        #[test]
        fn prop_every_execution_counted(ops in proptest::collection::vec(op_strategy(), 0..60)) {
            let bytes = encode_ops(&ops);
            let state = Replayer::default().replay(&bytes).unwrap();
            let expected: usize = ops
                .iter()
                .map(|op| match op {
                    Op::Execute(ids) => ids.len(),
                    _ => 0,
                })
                .sum();
            prop_assert_eq!(state.blocks_executed(), expected as u64);
        }
    }
}
