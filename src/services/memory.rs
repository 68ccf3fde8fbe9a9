//! In-memory content store
//!
//! Serves content by hash from a map, with the same range semantics as the
//! CDN. Used for offline runs, benches and tests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::{ByteRange, ContentFetch};
use crate::core::{Error, Result};

/// A fetch that reached the store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRecord {
    pub hash: String,
    pub range: Option<ByteRange>,
}

/// Hash-addressed objects plus a path -> hash table
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    objects: HashMap<String, Vec<u8>>,
    paths: HashMap<String, String>,
    log: Mutex<Vec<FetchRecord>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object under `hash`
    pub fn with_object(mut self, hash: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.insert(hash, data);
        self
    }

    /// Make `path` resolve to `hash`
    pub fn with_path(mut self, path: impl Into<String>, hash: impl Into<String>) -> Self {
        self.paths.insert(path.into(), hash.into());
        self
    }

    pub fn insert(&mut self, hash: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.objects.insert(hash.into(), data.into());
    }

    /// Every fetch served so far, in order
    pub fn fetches(&self) -> Vec<FetchRecord> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Fetches of one object, in order
    pub fn fetches_of(&self, hash: &str) -> Vec<Option<ByteRange>> {
        self.fetches()
            .into_iter()
            .filter(|record| record.hash == hash)
            .map(|record| record.range)
            .collect()
    }
}

impl ContentFetch for MemoryContentStore {
    fn fetch(&self, hash: &str, range: Option<ByteRange>) -> Result<Vec<u8>> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FetchRecord { hash: hash.to_string(), range });

        let data = self
            .objects
            .get(hash)
            .ok_or_else(|| Error::fetch(hash, "not found"))?;

        let Some(range) = range else {
            return Ok(data.clone());
        };
        let len = data.len() as u64;
        let start = range.offset.min(len) as usize;
        let end = range.end().min(len) as usize;
        Ok(data[start..end].to_vec())
    }

    fn resolve(&self, path: &str) -> Result<String> {
        self.paths
            .get(path)
            .cloned()
            .ok_or_else(|| Error::fetch(path, "unknown path"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_whole_and_range() {
        let store = MemoryContentStore::new().with_object("h", b"0123456789".to_vec());

        assert_eq!(store.fetch("h", None).unwrap(), b"0123456789");
        assert_eq!(store.fetch("h", Some(ByteRange::new(2, 3))).unwrap(), b"234");
    }

    #[test]
    fn test_range_is_clamped() {
        let store = MemoryContentStore::new().with_object("h", b"0123456789".to_vec());

        assert_eq!(store.fetch("h", Some(ByteRange::new(8, 100))).unwrap(), b"89");
        assert!(store.fetch("h", Some(ByteRange::new(50, 10))).unwrap().is_empty());
    }

    #[test]
    fn test_missing_hash() {
        let store = MemoryContentStore::new();
        assert!(matches!(store.fetch("nope", None), Err(Error::Fetch { .. })));
    }

    #[test]
    fn test_resolve_and_log() {
        let store = MemoryContentStore::new()
            .with_object("h", b"x".to_vec())
            .with_path("/a/tex.png", "h");

        assert_eq!(store.resolve("/a/tex.png").unwrap(), "h");
        assert!(store.resolve("/a/other.png").is_err());

        store.fetch("h", Some(ByteRange::new(0, 1))).unwrap();
        store.fetch("h", None).unwrap();
        assert_eq!(store.fetches_of("h"), vec![Some(ByteRange::new(0, 1)), None]);
    }
}
