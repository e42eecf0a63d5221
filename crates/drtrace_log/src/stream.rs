//! Sequential record access over a finished trace.

use crate::cursor::Cursor;
use crate::record::{self, FormatError, RawRecord};

/// Walks records from offset 0, advancing by each `total_length`.
///
/// Yields at most one error, after which the stream is exhausted: once a
/// length cannot be trusted, nothing after it can be framed.
pub struct RecordStream<'a> {
    bytes: &'a [u8],
    cursor: Cursor,
    failed: bool,
}

impl<'a> RecordStream<'a> {
    /// Stream over a complete trace image
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            cursor: Cursor::new(),
            failed: false,
        }
    }

    /// Offset of the next record
    #[must_use]
    pub fn position(&self) -> usize {
        self.cursor.pos()
    }

    /// Offset of the last record yielded
    #[must_use]
    pub fn previous_offset(&self) -> Option<usize> {
        self.cursor.previous()
    }

    /// Whether the cursor sits exactly at end of input
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.cursor.pos() >= self.bytes.len()
    }
}

impl<'a> Iterator for RecordStream<'a> {
    type Item = Result<RawRecord<'a>, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.is_end() {
            return None;
        }
        match record::read(self.bytes, self.cursor.pos()) {
            Ok(record) => {
                self.cursor.advance(record.total_length as usize);
                Some(Ok(record))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{HEADER_SIZE, RecordKind, encode_raw};
    use proptest::prelude::*;

    fn concat(records: &[Vec<u8>]) -> Vec<u8> {
        records.iter().flatten().copied().collect()
    }

    #[test]
    fn test_empty_input() {
        let mut stream = RecordStream::new(&[]);
        assert!(stream.is_end());
        assert!(stream.next().is_none());
        assert_eq!(stream.previous_offset(), None);
    }

    #[test]
    fn test_offsets_and_previous() {
        let bytes = concat(&[
            encode_raw(RecordKind::BlockDeleted, &[1, 0, 0, 0]).unwrap(),
            encode_raw(RecordKind::TraceSegment, &[7, 0, 0, 0]).unwrap(),
        ]);
        let mut stream = RecordStream::new(&bytes);

        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.offset, 0);
        assert_eq!(stream.previous_offset(), Some(0));

        let second = stream.next().unwrap().unwrap();
        assert_eq!(second.offset, 12);
        assert_eq!(stream.previous_offset(), Some(12));
        assert!(stream.next().is_none());
        assert_eq!(stream.position(), bytes.len());
    }

    #[test]
    fn test_stops_after_error() {
        let mut bytes = encode_raw(RecordKind::BlockDeleted, &[1, 0, 0, 0]).unwrap();
        bytes.extend_from_slice(&[0xff; 3]);
        let mut stream = RecordStream::new(&bytes);

        assert!(stream.next().unwrap().is_ok());
        let err = stream.next().unwrap().unwrap_err();
        assert!(matches!(err, FormatError::MalformedRecord { offset: 12, .. }));
        assert_eq!(stream.previous_offset(), Some(0));
        assert!(stream.next().is_none());
        assert_eq!(stream.position(), 12);
    }

    proptest! {
        #[test]
        fn prop_offsets_cover_input_exactly(
            payloads in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 0..40),
                0..20
            )
        ) {
            let records: Vec<Vec<u8>> = payloads
                .iter()
                .map(|p| encode_raw(RecordKind::TraceSegment, p).unwrap())
                .collect();
            let bytes = concat(&records);

            let mut stream = RecordStream::new(&bytes);
            let mut expected_offset = 0;
            let mut yielded = 0;
            for (record, payload) in stream.by_ref().zip(&payloads) {
                let record = record.unwrap();
                prop_assert_eq!(record.offset, expected_offset);
                prop_assert_eq!(record.total_length as usize, HEADER_SIZE + payload.len());
                expected_offset += record.total_length as usize;
                yielded += 1;
            }
            prop_assert_eq!(expected_offset, bytes.len());
            prop_assert_eq!(yielded, payloads.len());
            prop_assert!(stream.is_end());
        }
    }
}
