//! Blocks that are live at the current point of the scan.

use drtrace_core::BlockId;
use drtrace_log::BlockCreated;
use indexmap::IndexMap;

/// A live block and where it was created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveBlock<'a> {
    /// Offset of the creating record
    pub offset: usize,
    /// Creation payload, borrowed from the trace
    pub block: BlockCreated<'a>,
}

/// Live blocks keyed by id. Iteration order is unspecified once a block
/// has been removed.
#[derive(Debug, Clone, Default)]
pub struct LiveBlockRegistry<'a> {
    blocks: IndexMap<BlockId, LiveBlock<'a>>,
}

impl<'a> LiveBlockRegistry<'a> {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a newly created block.
    ///
    /// # Errors
    ///
    /// If the id is already live the registry is left unchanged and the
    /// existing entry is returned.
    pub fn insert(&mut self, offset: usize, block: BlockCreated<'a>) -> Result<(), LiveBlock<'a>> {
        if let Some(existing) = self.blocks.get(&block.id) {
            return Err(*existing);
        }
        self.blocks.insert(block.id, LiveBlock { offset, block });
        Ok(())
    }

    /// Remove a deleted block, returning it if it was live
    pub fn remove(&mut self, id: BlockId) -> Option<LiveBlock<'a>> {
        self.blocks.swap_remove(&id)
    }

    /// Look up a live block
    #[must_use]
    pub fn get(&self, id: BlockId) -> Option<&LiveBlock<'a>> {
        self.blocks.get(&id)
    }

    /// Whether `id` is live
    #[must_use]
    pub fn contains(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id)
    }

    /// Number of live blocks
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether no block is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Live block ids, in no particular order
    pub fn ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.keys().copied()
    }

    /// Live blocks
    pub fn iter(&self) -> impl Iterator<Item = &LiveBlock<'a>> {
        self.blocks.values()
    }
}
