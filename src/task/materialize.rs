//! Materialization: downloaded payload to published artifact

use std::sync::Arc;

use super::MeshPayload;
use crate::asset::AssetDescriptor;
use crate::core::{Error, Result};
use crate::services::{ArtifactHandle, MaterializeRequest, Services};

/// Turns a mesh payload into the asset's artifact
#[derive(Debug)]
pub struct Materialize {
    payload: Arc<MeshPayload>,
    artifact: Option<ArtifactHandle>,
}

impl Materialize {
    pub fn new(payload: Arc<MeshPayload>) -> Self {
        Self { payload, artifact: None }
    }

    pub fn payload(&self) -> Arc<MeshPayload> {
        Arc::clone(&self.payload)
    }

    /// Published artifact, once finished
    pub fn artifact(&self) -> Option<&ArtifactHandle> {
        self.artifact.as_ref()
    }

    pub(super) fn store(&mut self, artifact: ArtifactHandle) {
        self.artifact = Some(artifact);
    }
}

/// Worker body
pub(super) fn materialize(
    asset: &AssetDescriptor,
    payload: &MeshPayload,
    services: &Services,
) -> Result<ArtifactHandle> {
    let key = asset.artifact_key();
    if let Some(existing) = services.store.lookup(&key) {
        log::debug!("{}: reusing artifact {}", asset.id, existing.path().display());
        return Ok(existing);
    }

    let full_stream = if asset.variant.bakes_full_stream() {
        let variant = asset.variant_manifest()?;
        let hash = variant
            .progressive_stream
            .as_deref()
            .ok_or_else(|| Error::Manifest(format!("{} has no progressive stream", asset.name())))?;
        Some(services.fetcher.fetch(hash, None)?)
    } else {
        None
    };

    let bytes = services.materializer.materialize(&MaterializeRequest {
        asset,
        mesh: &payload.mesh,
        subfiles: &payload.subfiles,
        full_stream: full_stream.as_deref(),
    })?;
    services.store.publish(&key, &bytes)
}
