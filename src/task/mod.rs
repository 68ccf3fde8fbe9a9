//! Units of scheduled work
//!
//! A [`Task`] pairs a priority with one of four payloads. Its body runs on a
//! worker thread; [`Task::finished`] runs afterwards on the coordinating
//! thread and attaches the work the result made possible as dependents.

pub mod mesh;
pub mod texture;
pub mod progressive;
pub mod materialize;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::asset::AssetDescriptor;
use crate::core::{Error, Result, StreamParams};
use crate::scheduler::{PendingResult, WorkerPool};
use crate::services::ArtifactHandle;
use crate::streaming::{DecodedRefinements, Priority};

pub use mesh::{MeshDownload, MeshFetch, MeshPayload, TexturePlan};
pub use texture::TextureDownload;
pub use progressive::ProgressiveChunk;
pub use materialize::Materialize;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique task identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl TaskId {
    fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Payload-free variant tag, used for routing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskTag {
    MeshDownload,
    TextureDownload,
    ProgressiveChunk,
    Materialize,
}

impl TaskTag {
    pub const ALL: [TaskTag; 4] = [
        TaskTag::MeshDownload,
        TaskTag::TextureDownload,
        TaskTag::ProgressiveChunk,
        TaskTag::Materialize,
    ];
}

/// Variant payloads
#[derive(Debug)]
pub enum TaskKind {
    MeshDownload(MeshDownload),
    TextureDownload(TextureDownload),
    ProgressiveChunk(ProgressiveChunk),
    Materialize(Materialize),
}

/// What a task body hands back to the coordinating thread
#[derive(Debug)]
pub enum TaskOutput {
    Mesh(MeshFetch),
    Texture(Vec<u8>),
    Refinements(DecodedRefinements),
    Artifact(ArtifactHandle),
}

impl TaskOutput {
    fn name(&self) -> &'static str {
        match self {
            Self::Mesh(_) => "mesh",
            Self::Texture(_) => "texture",
            Self::Refinements(_) => "refinements",
            Self::Artifact(_) => "artifact",
        }
    }
}

/// A prioritized unit of work for one asset
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    asset: Arc<AssetDescriptor>,
    priority: Priority,
    solid_angle: f64,
    kind: TaskKind,
    dependents: Vec<Task>,
}

impl Task {
    pub(crate) fn new(asset: Arc<AssetDescriptor>, solid_angle: f64, priority: Priority, kind: TaskKind) -> Self {
        Self {
            id: TaskId::next(),
            asset,
            priority,
            solid_angle,
            kind,
            dependents: Vec::new(),
        }
    }

    /// Initial download task for a freshly submitted asset
    pub fn mesh_download(asset: Arc<AssetDescriptor>, solid_angle: f64, priority: Priority) -> Self {
        Self::new(asset, solid_angle, priority, TaskKind::MeshDownload(MeshDownload))
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn asset(&self) -> &Arc<AssetDescriptor> {
        &self.asset
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn solid_angle(&self) -> f64 {
        self.solid_angle
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn into_kind(self) -> TaskKind {
        self.kind
    }

    pub fn tag(&self) -> TaskTag {
        match self.kind {
            TaskKind::MeshDownload(_) => TaskTag::MeshDownload,
            TaskKind::TextureDownload(_) => TaskTag::TextureDownload,
            TaskKind::ProgressiveChunk(_) => TaskTag::ProgressiveChunk,
            TaskKind::Materialize(_) => TaskTag::Materialize,
        }
    }

    pub fn dependents(&self) -> &[Task] {
        &self.dependents
    }

    /// Remove and return the dependents, in the order they were attached
    pub fn take_dependents(&mut self) -> Vec<Task> {
        std::mem::take(&mut self.dependents)
    }

    pub(crate) fn push_dependent(&mut self, task: Task) {
        self.dependents.push(task);
    }

    /// Hand the task body to a worker. Never blocks.
    pub fn run(&self, pool: &WorkerPool) -> PendingResult {
        log::trace!("{} {:?} for {} starting", self.id, self.tag(), self.asset.id);
        let asset = Arc::clone(&self.asset);
        match &self.kind {
            TaskKind::MeshDownload(_) => {
                pool.submit(move |services| mesh::fetch(&asset, services).map(TaskOutput::Mesh))
            }
            TaskKind::TextureDownload(download) => {
                let (hash, level) = (download.atlas_hash().to_string(), *download.level());
                pool.submit(move |services| texture::fetch_level(&hash, &level, services).map(TaskOutput::Texture))
            }
            TaskKind::ProgressiveChunk(chunk) => {
                let (hash, cursor) = (chunk.stream_hash().to_string(), chunk.cursor().clone());
                pool.submit(move |services| {
                    progressive::fetch_and_decode(&hash, &cursor, services).map(TaskOutput::Refinements)
                })
            }
            TaskKind::Materialize(materialize) => {
                let payload = materialize.payload();
                pool.submit(move |services| {
                    materialize::materialize(&asset, &payload, services).map(TaskOutput::Artifact)
                })
            }
        }
    }

    /// Record the body's output and attach dependents.
    ///
    /// Called once, on the coordinating thread.
    pub fn finished(&mut self, output: TaskOutput, params: &StreamParams) -> Result<()> {
        let tag = self.tag();
        match (&mut self.kind, output) {
            (TaskKind::MeshDownload(_), TaskOutput::Mesh(fetch)) => {
                let materialize = mesh::materialize_task(&self.asset, self.solid_angle, fetch, params);
                self.dependents.push(materialize);
            }
            (TaskKind::TextureDownload(texture), TaskOutput::Texture(bytes)) => texture.store(bytes),
            (TaskKind::ProgressiveChunk(chunk), TaskOutput::Refinements(decoded)) => {
                if let Some(next) = chunk.record(decoded, params) {
                    let priority = params.weights.next_chunk(self.solid_angle, chunk.cursor().consumed_end(), params.chunk_size);
                    let kind = TaskKind::ProgressiveChunk(next);
                    self.dependents.push(Task::new(Arc::clone(&self.asset), self.solid_angle, priority, kind));
                }
            }
            (TaskKind::Materialize(materialize), TaskOutput::Artifact(handle)) => materialize.store(handle),
            (_, output) => {
                return Err(Error::OutputMismatch { tag, output: output.name() });
            }
        }
        log::trace!("{} finished with {} dependents", self.id, self.dependents.len());
        Ok(())
    }
}
