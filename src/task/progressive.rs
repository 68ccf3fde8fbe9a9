//! Progressive stream chunk download

use crate::core::{Error, Result, StreamParams};
use crate::services::Services;
use crate::streaming::{DecodedRefinements, ProgressiveCursor, RefinementRecord};

/// One byte range of an asset's progressive stream
#[derive(Debug)]
pub struct ProgressiveChunk {
    stream_hash: String,
    cursor: ProgressiveCursor,
    decoded: Option<DecodedRefinements>,
}

impl ProgressiveChunk {
    pub fn new(stream_hash: String, cursor: ProgressiveCursor) -> Self {
        Self {
            stream_hash,
            cursor,
            decoded: None,
        }
    }

    pub fn stream_hash(&self) -> &str {
        &self.stream_hash
    }

    /// Position this chunk was fetched from
    pub fn cursor(&self) -> &ProgressiveCursor {
        &self.cursor
    }

    /// Records completed by this chunk
    pub fn records(&self) -> &[RefinementRecord] {
        match &self.decoded {
            Some(decoded) => &decoded.records,
            None => &[],
        }
    }

    pub fn take_records(&mut self) -> Vec<RefinementRecord> {
        self.decoded.as_mut().map(|d| std::mem::take(&mut d.records)).unwrap_or_default()
    }

    /// Records decoded so far across the stream, and the total once known
    pub fn progress(&self) -> (u32, Option<u32>) {
        match &self.decoded {
            Some(d) => (d.refinements_read, d.num_refinements),
            None => (self.cursor.refinements_read, self.cursor.num_refinements),
        }
    }

    /// Keep the decoded output; returns the next chunk unless the stream is exhausted.
    pub(super) fn record(&mut self, decoded: DecodedRefinements, params: &StreamParams) -> Option<ProgressiveChunk> {
        let next = self.cursor.advance(
            decoded.refinements_read,
            decoded.num_refinements,
            decoded.remainder.clone(),
            params.chunk_size,
        );
        log::trace!(
            "stream {} read {}/{:?} refinements at offset {}",
            self.stream_hash,
            next.refinements_read,
            next.num_refinements,
            next.offset
        );
        self.decoded = Some(decoded);

        (!next.is_exhausted()).then(|| ProgressiveChunk::new(self.stream_hash.clone(), next))
    }
}

/// Worker body: fetch the next range and decode what it completes
pub(super) fn fetch_and_decode(
    stream_hash: &str,
    cursor: &ProgressiveCursor,
    services: &Services,
) -> Result<DecodedRefinements> {
    let fetched = services.fetcher.fetch(stream_hash, Some(cursor.range()))?;
    if fetched.is_empty() {
        return Err(Error::Decode(format!(
            "progressive stream {stream_hash} truncated at offset {} after {} refinements",
            cursor.offset, cursor.refinements_read
        )));
    }

    let mut data = Vec::with_capacity(cursor.buffered.len() + fetched.len());
    data.extend_from_slice(&cursor.buffered);
    data.extend_from_slice(&fetched);

    services
        .decoder
        .decode(&data, cursor.refinements_read, cursor.num_refinements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{ByteRange, MemoryContentStore};
    use crate::test_support::{self, TestEnv};

    #[test]
    fn test_chain_follows_stream_to_the_end() {
        let stream = test_support::pdae_stream(6, 3);
        let len = stream.len() as u64;
        let env = TestEnv::new(MemoryContentStore::new().with_object("stream", stream));
        let params = StreamParams {
            chunk_size: len / 3 + 1,
            ..Default::default()
        };

        let mut chunk = ProgressiveChunk::new("stream".into(), ProgressiveCursor::start(params.chunk_size));
        let mut offsets = Vec::new();
        let mut last_read = 0;
        loop {
            offsets.push(chunk.cursor().offset);
            let decoded = fetch_and_decode("stream", chunk.cursor(), &env.services).unwrap();
            match chunk.record(decoded, &params) {
                Some(next) => {
                    let (read, _) = chunk.progress();
                    assert!(read >= last_read);
                    last_read = read;
                    chunk = next;
                }
                None => break,
            }
        }

        assert_eq!(offsets, vec![0, params.chunk_size, 2 * params.chunk_size]);
        assert_eq!(chunk.progress(), (6, Some(6)));
    }

    #[test]
    fn test_buffered_bytes_are_prepended() {
        let stream = test_support::pdae_stream(2, 1);
        let split = 9;
        let env = TestEnv::new(MemoryContentStore::new().with_object("stream", stream.clone()));

        let cursor = ProgressiveCursor {
            offset: split as u64,
            length: stream.len() as u64,
            buffered: stream[..split].to_vec(),
            ..Default::default()
        };
        let decoded = fetch_and_decode("stream", &cursor, &env.services).unwrap();
        assert_eq!(decoded.refinements_read, 2);
        assert_eq!(
            env.content.fetches_of("stream"),
            vec![Some(ByteRange::new(split as u64, stream.len() as u64))]
        );
    }

    #[test]
    fn test_truncated_stream_fails() {
        let stream = test_support::pdae_stream(4, 2);
        let short = stream[..stream.len() / 2].to_vec();
        let env = TestEnv::new(MemoryContentStore::new().with_object("stream", short.clone()));

        let cursor = ProgressiveCursor {
            offset: short.len() as u64,
            length: 128,
            refinements_read: 1,
            num_refinements: Some(4),
            ..Default::default()
        };
        let err = fetch_and_decode("stream", &cursor, &env.services).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_take_records() {
        let params = StreamParams::default();
        let mut chunk = ProgressiveChunk::new("s".into(), ProgressiveCursor::start(params.chunk_size));
        let decoded = DecodedRefinements {
            refinements_read: 1,
            num_refinements: Some(1),
            records: vec![RefinementRecord::default()],
            remainder: Vec::new(),
        };
        assert!(chunk.record(decoded, &params).is_none());
        assert_eq!(chunk.records().len(), 1);
        assert_eq!(chunk.take_records().len(), 1);
        assert!(chunk.records().is_empty());
    }
}
