//! Assets submitted for streaming and their per-asset progress

use std::fmt;
use std::sync::Arc;

use super::manifest::{AssetManifest, ModelVariant, VariantManifest};
use crate::core::{Result, Vec3};
use crate::services::ArtifactHandle;
use crate::streaming::Priority;

/// Caller-chosen asset identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(pub u32);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset#{}", self.0)
    }
}

/// Everything the scheduler needs to know about one asset. Immutable once submitted.
#[derive(Clone, Debug)]
pub struct AssetDescriptor {
    pub id: AssetId,
    pub manifest: AssetManifest,
    pub variant: ModelVariant,
    /// World-space centre
    pub position: Vec3,
    /// Uniform scale; the bounding radius derives from it
    pub scale: f32,
    /// Estimated bytes of the initial download, if known
    pub download_size: Option<u64>,
    /// A previous run already published this asset's artifact
    pub already_materialized: bool,
}

impl AssetDescriptor {
    pub fn new(id: AssetId, manifest: AssetManifest, variant: ModelVariant, position: Vec3, scale: f32) -> Self {
        Self {
            id,
            manifest,
            variant,
            position,
            scale,
            download_size: None,
            already_materialized: false,
        }
    }

    pub fn with_download_size(mut self, download_size: Option<u64>) -> Self {
        self.download_size = download_size;
        self
    }

    pub fn with_materialized(mut self, already_materialized: bool) -> Self {
        self.already_materialized = already_materialized;
        self
    }

    pub fn name(&self) -> &str {
        &self.manifest.full_path
    }

    pub fn variant_manifest(&self) -> Result<&VariantManifest> {
        self.manifest.variant(self.variant)
    }

    /// Artifact store key: one artifact per (model, variant)
    pub fn artifact_key(&self) -> String {
        format!("{}.{}", self.manifest.full_path.trim_start_matches('/'), self.variant.as_str())
    }
}

/// Lifecycle of an asset inside the orchestrator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetPhase {
    /// Submitted, nothing scheduled yet
    Pending,
    /// Initial download or materialization in flight
    Downloading,
    /// Renderable; textures or refinements may still follow
    BaseMaterialized,
    /// Applying progressive refinements
    Refining,
    /// No further work outstanding
    Complete,
    /// Failed before becoming renderable
    Failed,
}

/// Orchestrator-side record of one asset
#[derive(Clone, Debug)]
pub struct AssetState {
    pub descriptor: Arc<AssetDescriptor>,
    pub solid_angle: f64,
    pub priority: Priority,
    phase: AssetPhase,
    artifact: Option<ArtifactHandle>,
    refinements_read: u32,
    num_refinements: Option<u32>,
    textures_applied: u32,
    outstanding: usize,
    last_error: Option<String>,
}

impl AssetState {
    pub fn new(descriptor: Arc<AssetDescriptor>, solid_angle: f64, priority: Priority) -> Self {
        Self {
            descriptor,
            solid_angle,
            priority,
            phase: AssetPhase::Pending,
            artifact: None,
            refinements_read: 0,
            num_refinements: None,
            textures_applied: 0,
            outstanding: 0,
            last_error: None,
        }
    }

    pub fn phase(&self) -> AssetPhase {
        self.phase
    }

    pub fn artifact(&self) -> Option<&ArtifactHandle> {
        self.artifact.as_ref()
    }

    pub fn refinements_read(&self) -> u32 {
        self.refinements_read
    }

    pub fn num_refinements(&self) -> Option<u32> {
        self.num_refinements
    }

    pub fn textures_applied(&self) -> u32 {
        self.textures_applied
    }

    /// Tasks queued or running for this asset
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_renderable(&self) -> bool {
        self.artifact.is_some()
    }

    pub(crate) fn task_queued(&mut self) {
        self.outstanding += 1;
        if self.phase == AssetPhase::Pending {
            self.phase = AssetPhase::Downloading;
        }
    }

    pub(crate) fn task_settled(&mut self) {
        self.outstanding = self.outstanding.saturating_sub(1);
        if self.outstanding == 0 && matches!(self.phase, AssetPhase::BaseMaterialized | AssetPhase::Refining) {
            self.phase = AssetPhase::Complete;
        }
    }

    /// Record the published artifact. Returns false if one was already set.
    pub(crate) fn set_artifact(&mut self, artifact: ArtifactHandle) -> bool {
        if self.artifact.is_some() {
            return false;
        }
        self.artifact = Some(artifact);
        if matches!(self.phase, AssetPhase::Pending | AssetPhase::Downloading) {
            self.phase = AssetPhase::BaseMaterialized;
        }
        true
    }

    /// Artifact found from an earlier run; nothing left to do
    pub(crate) fn restore(&mut self, artifact: ArtifactHandle) {
        self.artifact = Some(artifact);
        self.phase = AssetPhase::Complete;
    }

    pub(crate) fn record_refinements(&mut self, refinements_read: u32, num_refinements: Option<u32>) {
        self.refinements_read = self.refinements_read.max(refinements_read);
        self.num_refinements = num_refinements.or(self.num_refinements);
        if self.phase == AssetPhase::BaseMaterialized {
            self.phase = AssetPhase::Refining;
        }
    }

    pub(crate) fn record_texture(&mut self) {
        self.textures_applied += 1;
    }

    pub(crate) fn record_failure(&mut self, error: String) {
        if matches!(self.phase, AssetPhase::Pending | AssetPhase::Downloading) {
            self.phase = AssetPhase::Failed;
        }
        self.last_error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn state() -> AssetState {
        let descriptor = Arc::new(test_support::optimized_asset(7, "mesh", &[]));
        AssetState::new(descriptor, 0.5, Priority(1.0))
    }

    #[test]
    fn test_artifact_key_per_variant() {
        let mut asset = test_support::optimized_asset(1, "mesh", &[]);
        let optimized = asset.artifact_key();
        asset.variant = ModelVariant::OptimizedUnflattened;
        assert_ne!(optimized, asset.artifact_key());
        assert!(optimized.ends_with(".optimized"));
    }

    #[test]
    fn test_lifecycle_to_complete() {
        let mut state = state();
        assert_eq!(state.phase(), AssetPhase::Pending);

        state.task_queued();
        assert_eq!(state.phase(), AssetPhase::Downloading);

        // Materialize queued before the mesh download settles
        state.task_queued();
        state.task_settled();
        assert!(state.set_artifact(ArtifactHandle::for_tests("a.msa")));
        assert_eq!(state.phase(), AssetPhase::BaseMaterialized);

        state.task_queued();
        state.task_settled();
        state.record_refinements(4, Some(10));
        assert_eq!(state.phase(), AssetPhase::Refining);

        state.task_settled();
        assert_eq!(state.phase(), AssetPhase::Complete);
        assert_eq!(state.outstanding(), 0);
        assert_eq!(state.refinements_read(), 4);
    }

    #[test]
    fn test_artifact_set_once() {
        let mut state = state();
        assert!(state.set_artifact(ArtifactHandle::for_tests("a.msa")));
        assert!(!state.set_artifact(ArtifactHandle::for_tests("b.msa")));
        assert_eq!(state.artifact().unwrap().path().to_str(), Some("a.msa"));
    }

    #[test]
    fn test_failure_before_and_after_base() {
        let mut state = state();
        state.task_queued();
        state.record_failure("fetch failed".into());
        state.task_settled();
        assert_eq!(state.phase(), AssetPhase::Failed);

        let mut state = self::state();
        state.task_queued();
        state.set_artifact(ArtifactHandle::for_tests("a.msa"));
        state.task_queued();
        state.task_settled();
        state.record_failure("texture fetch failed".into());
        state.task_settled();
        assert_eq!(state.phase(), AssetPhase::Complete);
        assert_eq!(state.last_error(), Some("texture fetch failed"));
    }
}
