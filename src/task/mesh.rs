//! Mesh download: the first task of every asset

use std::collections::HashMap;
use std::sync::Arc;

use super::{Materialize, ProgressiveChunk, Task, TaskKind, TextureDownload};
use crate::asset::{AssetDescriptor, MipLevel, ModelVariant, subfile_basename};
use crate::core::{Error, Result, StreamParams};
use crate::services::Services;
use crate::streaming::{Priority, ProgressiveCursor, texture_level};

/// Fetches the mesh and its base-resolution subfiles
#[derive(Clone, Copy, Debug, Default)]
pub struct MeshDownload;

/// Finer mip levels of one texture still to be streamed
#[derive(Clone, Debug, PartialEq)]
pub struct TexturePlan {
    pub atlas_hash: String,
    /// Level delivered with the mesh
    pub base: MipLevel,
    /// Finer levels, coarse to fine
    pub levels: Vec<MipLevel>,
}

/// Result of a mesh download
#[derive(Clone, Debug, Default)]
pub struct MeshFetch {
    pub mesh: Vec<u8>,
    /// Subfile bytes keyed by texture name
    pub subfiles: HashMap<String, Vec<u8>>,
    pub textures: Vec<TexturePlan>,
    /// Progressive stream to refine from, for variants that stream one
    pub progressive_stream: Option<String>,
}

/// Downloaded data a Materialize task works from
#[derive(Debug, Default)]
pub struct MeshPayload {
    pub mesh: Vec<u8>,
    pub subfiles: HashMap<String, Vec<u8>>,
}

/// Worker body
pub(super) fn fetch(asset: &AssetDescriptor, services: &Services) -> Result<MeshFetch> {
    let variant = asset.variant_manifest()?;
    let fetcher = &services.fetcher;
    let mip_textures = matches!(asset.variant, ModelVariant::Progressive | ModelVariant::ProgressiveFull);

    let mesh = fetcher.fetch(&variant.hash, None)?;
    let mut subfiles = HashMap::with_capacity(variant.subfiles.len());
    let mut textures = Vec::new();

    for (i, subfile) in variant.subfiles.iter().enumerate() {
        let name = subfile_basename(subfile);

        if let Some(atlas) = variant.mip_atlas(name).filter(|_| mip_textures) {
            let level = if asset.variant.bakes_full_stream() {
                atlas.byte_ranges.last()
            } else {
                atlas.base_level(services.params.min_base_texture_dimension)
            };
            let level = *level.ok_or_else(|| Error::Manifest(format!("mip atlas for {name} has no levels")))?;

            subfiles.insert(name.to_string(), fetcher.fetch(&atlas.hash, Some(level.range()))?);

            if asset.variant.streams_refinements() {
                let levels = atlas.refinement_levels(&level);
                if !levels.is_empty() {
                    textures.push(TexturePlan {
                        atlas_hash: atlas.hash.clone(),
                        base: level,
                        levels,
                    });
                }
            }
            continue;
        }

        let hash = match variant.subfile_hashes.get(i) {
            Some(hash) => hash.clone(),
            None => fetcher.resolve(subfile)?,
        };
        subfiles.insert(name.to_string(), fetcher.fetch(&hash, None)?);
    }

    let progressive_stream = variant
        .progressive_stream
        .clone()
        .filter(|_| asset.variant.streams_refinements());

    log::debug!(
        "{}: mesh {} bytes, {} subfiles, {} textures to refine",
        asset.id,
        mesh.len(),
        subfiles.len(),
        textures.len()
    );

    Ok(MeshFetch {
        mesh,
        subfiles,
        textures,
        progressive_stream,
    })
}

/// The Materialize task a finished mesh download hands on, carrying the
/// texture chains and the first progressive chunk as its own dependents.
pub(super) fn materialize_task(
    asset: &Arc<AssetDescriptor>,
    solid_angle: f64,
    fetch: MeshFetch,
    params: &StreamParams,
) -> Task {
    let MeshFetch {
        mesh,
        subfiles,
        textures,
        progressive_stream,
    } = fetch;

    let payload = Arc::new(MeshPayload { mesh, subfiles });
    let mut materialize = Task::new(
        Arc::clone(asset),
        solid_angle,
        Priority(solid_angle),
        TaskKind::Materialize(Materialize::new(payload)),
    );

    for plan in &textures {
        if let Some(head) = texture_chain(asset, solid_angle, plan) {
            materialize.push_dependent(head);
        }
    }

    if let Some(stream_hash) = progressive_stream {
        let chunk = ProgressiveChunk::new(stream_hash, ProgressiveCursor::start(params.chunk_size));
        materialize.push_dependent(Task::new(
            Arc::clone(asset),
            solid_angle,
            Priority(solid_angle),
            TaskKind::ProgressiveChunk(chunk),
        ));
    }

    materialize
}

/// Coarsest remaining level, whose sole dependent is the next finer one, and so on
fn texture_chain(asset: &Arc<AssetDescriptor>, solid_angle: f64, plan: &TexturePlan) -> Option<Task> {
    let base_pixels = plan.base.pixels();
    let mut head: Option<Task> = None;

    for level in plan.levels.iter().rev() {
        let priority = texture_level(solid_angle, base_pixels, level.pixels());
        let kind = TaskKind::TextureDownload(TextureDownload::new(plan.atlas_hash.clone(), *level));
        let mut task = Task::new(Arc::clone(asset), solid_angle, priority, kind);
        if let Some(finer) = head.take() {
            task.push_dependent(finer);
        }
        head = Some(task);
    }
    head
}
