//! Streamer configuration
//!
//! Loaded from JSON; every field falls back to its default when absent.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::streaming::priority::PriorityWeights;

/// Default byte length of one progressive stream request (500 KiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 500 * 1024;

/// Configuration for an [`Orchestrator`](crate::orchestrator::Orchestrator) run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    /// Worker threads for download-class tasks (I/O bound)
    pub download_workers: usize,
    /// Worker threads for materialize tasks (CPU bound)
    pub materialize_workers: usize,
    /// Sleep between coordinating-loop iterations, in milliseconds
    pub poll_interval_ms: u64,
    /// Interval between pool status log lines, in seconds
    pub status_interval_secs: u64,
    /// Byte length of each progressive stream chunk request
    pub progressive_chunk_size: u64,
    /// Smallest width or height accepted as the base texture level
    pub min_base_texture_dimension: u32,
    /// Directory holding materialized artifacts
    pub cache_dir: PathBuf,
    /// Priority scaling weights
    pub weights: PriorityWeights,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            download_workers: 4,
            materialize_workers: 2,
            poll_interval_ms: 50,
            status_interval_secs: 5,
            progressive_chunk_size: DEFAULT_CHUNK_SIZE,
            min_base_texture_dimension: 128,
            cache_dir: PathBuf::from(".temp_models"),
            weights: PriorityWeights::default(),
        }
    }
}

impl StreamerConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.download_workers == 0 || self.materialize_workers == 0 {
            return Err(Error::Config("worker counts must be at least 1".into()));
        }
        if self.progressive_chunk_size == 0 {
            return Err(Error::Config("progressive_chunk_size must be positive".into()));
        }
        if !(1..1000).contains(&self.poll_interval_ms) {
            return Err(Error::Config(format!(
                "poll_interval_ms must be in 1..1000, got {}",
                self.poll_interval_ms
            )));
        }
        self.weights.validate()
    }

    /// Coordinating-loop sleep interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Pool status logging interval
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    /// The subset of settings task bodies need
    pub fn stream_params(&self) -> StreamParams {
        StreamParams {
            chunk_size: self.progressive_chunk_size,
            min_base_texture_dimension: self.min_base_texture_dimension,
            weights: self.weights,
        }
    }
}

/// Settings read by task bodies on worker threads and by `finished` hooks
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StreamParams {
    pub chunk_size: u64,
    pub min_base_texture_dimension: u32,
    pub weights: PriorityWeights,
}

impl Default for StreamParams {
    fn default() -> Self {
        StreamerConfig::default().stream_params()
    }
}
