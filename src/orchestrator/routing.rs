//! Which pool each task variant runs in

use std::collections::HashMap;

use crate::core::{Error, Result};
use crate::task::TaskTag;

/// Pool classes owned by the orchestrator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PoolClass {
    /// I/O-bound fetches
    Download,
    /// CPU-bound artifact building
    Materialize,
}

/// Tag to pool mapping
#[derive(Clone, Debug)]
pub struct RoutingTable {
    routes: HashMap<TaskTag, PoolClass>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::empty()
            .with(TaskTag::MeshDownload, PoolClass::Download)
            .with(TaskTag::TextureDownload, PoolClass::Download)
            .with(TaskTag::ProgressiveChunk, PoolClass::Download)
            .with(TaskTag::Materialize, PoolClass::Materialize)
    }
}

impl RoutingTable {
    pub fn empty() -> Self {
        Self { routes: HashMap::new() }
    }

    pub fn with(mut self, tag: TaskTag, class: PoolClass) -> Self {
        self.routes.insert(tag, class);
        self
    }

    pub fn without(mut self, tag: TaskTag) -> Self {
        self.routes.remove(&tag);
        self
    }

    pub fn route(&self, tag: TaskTag) -> Result<PoolClass> {
        self.routes.get(&tag).copied().ok_or(Error::Unroutable(tag))
    }
}
