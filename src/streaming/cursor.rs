//! Progressive stream position for one asset

use crate::services::ByteRange;

/// Where the next progressive chunk starts and what is left over from the last one.
///
/// Carried by value from one chunk task to the next; each asset's stream has
/// exactly one live cursor.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgressiveCursor {
    /// Stream offset of the next byte range to fetch
    pub offset: u64,
    /// Length of the next byte range to fetch
    pub length: u64,
    /// Refinement records decoded so far
    pub refinements_read: u32,
    /// Total record count, known once the stream header has been read
    pub num_refinements: Option<u32>,
    /// Bytes of an incomplete trailing record carried to the next chunk
    pub buffered: Vec<u8>,
}

impl ProgressiveCursor {
    /// Cursor for the first chunk of a stream
    pub fn start(chunk_size: u64) -> Self {
        Self {
            length: chunk_size,
            ..Default::default()
        }
    }

    /// True once every refinement record has been decoded
    pub fn is_exhausted(&self) -> bool {
        matches!(self.num_refinements, Some(total) if self.refinements_read >= total)
    }

    /// Byte range this cursor fetches
    pub fn range(&self) -> ByteRange {
        ByteRange::new(self.offset, self.length)
    }

    /// Stream offset just past this cursor's range
    pub fn consumed_end(&self) -> u64 {
        self.offset + self.length
    }

    /// Cursor for the chunk after this one, given what decoding this chunk produced.
    pub fn advance(
        &self,
        refinements_read: u32,
        num_refinements: Option<u32>,
        buffered: Vec<u8>,
        chunk_size: u64,
    ) -> Self {
        Self {
            offset: self.consumed_end(),
            length: chunk_size,
            refinements_read: refinements_read.max(self.refinements_read),
            num_refinements: num_refinements.or(self.num_refinements),
            buffered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_is_not_exhausted() {
        let cursor = ProgressiveCursor::start(1024);
        assert_eq!(cursor.range(), ByteRange::new(0, 1024));
        assert!(!cursor.is_exhausted());
    }

    #[test]
    fn test_advance_moves_offset_and_keeps_total() {
        let cursor = ProgressiveCursor::start(100);
        let next = cursor.advance(3, Some(10), b"partial".to_vec(), 100);
        assert_eq!(next.offset, 100);
        assert_eq!(next.refinements_read, 3);
        assert_eq!(next.num_refinements, Some(10));
        assert_eq!(next.buffered, b"partial");

        // A chunk that only carries bytes keeps the known total
        let after = next.advance(3, None, Vec::new(), 100);
        assert_eq!(after.offset, 200);
        assert_eq!(after.num_refinements, Some(10));
    }

    #[test]
    fn test_refinements_read_never_decreases() {
        let cursor = ProgressiveCursor::start(10).advance(5, Some(8), Vec::new(), 10);
        let next = cursor.advance(2, Some(8), Vec::new(), 10);
        assert_eq!(next.refinements_read, 5);
    }

    #[test]
    fn test_exhausted_when_all_read() {
        let cursor = ProgressiveCursor::start(10).advance(8, Some(8), Vec::new(), 10);
        assert!(cursor.is_exhausted());

        let empty_stream = ProgressiveCursor::start(10).advance(0, Some(0), Vec::new(), 10);
        assert!(empty_stream.is_exhausted());
    }
}
