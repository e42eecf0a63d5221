//! Byte-offset cursor for walking a record stream.

/// Position in a record stream, remembering where the last record started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    position: usize,
    previous: Option<usize>,
}

impl Cursor {
    /// Cursor at offset 0 with no previous record
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Step over a record of `len` bytes starting at the current position
    pub fn advance(&mut self, len: usize) {
        self.previous = Some(self.position);
        self.position = self.position.saturating_add(len);
    }

    /// Current offset
    #[must_use]
    pub const fn pos(&self) -> usize {
        self.position
    }

    /// Offset of the record most recently stepped over
    #[must_use]
    pub const fn previous(&self) -> Option<usize> {
        self.previous
    }
}
