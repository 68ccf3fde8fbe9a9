//! Builders and collaborators shared by unit tests

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use crate::asset::{
    AssetDescriptor, AssetId, AssetManifest, ManifestMetadata, MipLevel, MipmapAtlas, ModelVariant,
    VariantManifest,
};
use crate::core::{Error, Result, StreamParams, StreamerConfig, Vec3};
use crate::scheduler::{Completion, TaskPool};
use crate::services::{
    ArtifactStore, Collaborators, MaterializeRequest, Materializer, MemoryContentStore,
    PassthroughMaterializer, Services,
};
use crate::streaming::{PdaeDecoder, RefinementOp, RefinementRecord, encode_pdae};

pub const MESH_HASH: &str = "mesh";
pub const MESH_BYTES: &[u8] = b"<mesh/>";
pub const ATLAS_HASH: &str = "atlas";
pub const STREAM_HASH: &str = "stream";

/// Where test assets sit relative to a vantage at the origin
pub const ASSET_POSITION: Vec3 = Vec3::new(0.0, 0.0, 10_000.0);

fn manifest(id: u32, key: &str, variant: VariantManifest) -> AssetManifest {
    AssetManifest {
        base_path: format!("/test/model{id}.dae"),
        full_path: format!("/test/model{id}.dae/0"),
        version_num: "0".into(),
        metadata: ManifestMetadata {
            types: HashMap::from([(key.to_string(), variant)]),
        },
    }
}

/// Optimized asset whose mesh is `mesh_hash`, with subfiles resolved by path
pub fn optimized_asset(id: u32, mesh_hash: &str, subfiles: &[&str]) -> AssetDescriptor {
    let variant = VariantManifest {
        hash: mesh_hash.to_string(),
        subfiles: subfiles.iter().map(|s| s.to_string()).collect(),
        subfile_hashes: Vec::new(),
        mipmaps: None,
        progressive_stream: None,
    };
    AssetDescriptor::new(
        AssetId(id),
        manifest(id, "optimized", variant),
        ModelVariant::Optimized,
        ASSET_POSITION,
        1.0,
    )
}

/// Mip levels 32..512, coarse to fine, packed back to back
pub fn atlas_levels() -> Vec<MipLevel> {
    let mut offset = 0;
    [32u32, 64, 128, 256, 512]
        .iter()
        .map(|&side| {
            let length = u64::from(side) / 2;
            let level = MipLevel {
                offset,
                length,
                width: side,
                height: side,
            };
            offset += length;
            level
        })
        .collect()
}

/// Progressive asset with one mip-mapped texture and a PDAE stream of
/// `records` records, plus a content store holding everything it needs.
pub fn progressive_asset(id: u32, records: usize, ops_per_record: usize) -> (AssetDescriptor, MemoryContentStore) {
    let levels = atlas_levels();
    let atlas_len = levels.iter().map(|l| l.length).sum::<u64>();
    let variant = VariantManifest {
        hash: MESH_HASH.into(),
        subfiles: vec![format!("/test/model{id}.dae/progressive/0/wood.jpg/0")],
        subfile_hashes: Vec::new(),
        mipmaps: Some(HashMap::from([(
            "./wood.jpg".to_string(),
            MipmapAtlas {
                hash: ATLAS_HASH.into(),
                byte_ranges: levels,
            },
        )])),
        progressive_stream: Some(STREAM_HASH.into()),
    };
    let asset = AssetDescriptor::new(
        AssetId(id),
        manifest(id, "progressive", variant),
        ModelVariant::Progressive,
        ASSET_POSITION,
        1.0,
    );

    let content = MemoryContentStore::new()
        .with_object(MESH_HASH, MESH_BYTES.to_vec())
        .with_object(ATLAS_HASH, (0..atlas_len).map(|i| i as u8).collect::<Vec<u8>>())
        .with_object(STREAM_HASH, pdae_stream(records, ops_per_record));
    (asset, content)
}

/// PDAE stream of `records` records of `ops_per_record` vertex additions each
pub fn pdae_stream(records: usize, ops_per_record: usize) -> Vec<u8> {
    let records: Vec<RefinementRecord> = (0..records)
        .map(|r| RefinementRecord {
            ops: (0..ops_per_record)
                .map(|o| RefinementOp::VertexAddition {
                    position: [r as f32, o as f32, 0.5],
                    normal: [0.0, 0.0, 1.0],
                    uv: [0.25, 0.75],
                })
                .collect(),
        })
        .collect();
    encode_pdae(&records)
}

/// Materializer that always fails
pub struct FailingMaterializer;

impl Materializer for FailingMaterializer {
    fn materialize(&self, request: &MaterializeRequest<'_>) -> Result<Vec<u8>> {
        Err(Error::Materialize(format!("cannot materialize {}", request.asset.id)))
    }
}

/// Materializer that panics
pub struct PanickingMaterializer;

impl Materializer for PanickingMaterializer {
    fn materialize(&self, _request: &MaterializeRequest<'_>) -> Result<Vec<u8>> {
        panic!("materializer blew up");
    }
}

pub fn collaborators(content: Arc<MemoryContentStore>, materializer: Arc<dyn Materializer>) -> Collaborators {
    Collaborators {
        fetcher: content,
        materializer,
        decoder: Arc::new(PdaeDecoder),
    }
}

/// Config for fast-polling test runs with artifacts under `dir`
pub fn test_config(dir: &Path) -> StreamerConfig {
    StreamerConfig {
        poll_interval_ms: 1,
        cache_dir: dir.to_path_buf(),
        ..Default::default()
    }
}

/// Services over an in-memory content store and a temporary artifact store
pub struct TestEnv {
    pub content: Arc<MemoryContentStore>,
    pub services: Services,
    pub dir: TempDir,
}

impl TestEnv {
    pub fn new(content: MemoryContentStore) -> Self {
        Self::with_materializer(content, PassthroughMaterializer)
    }

    pub fn with_materializer(content: MemoryContentStore, materializer: impl Materializer + 'static) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let content = Arc::new(content);
        let store = ArtifactStore::open(dir.path()).expect("failed to open artifact store");
        let services = Services::new(
            collaborators(Arc::clone(&content), Arc::new(materializer)),
            store,
            StreamParams::default(),
        );
        Self { content, services, dir }
    }

    /// Services sharing this env's content and artifact store
    pub fn services_with(&self, materializer: Arc<dyn Materializer>) -> Services {
        Services::new(
            collaborators(Arc::clone(&self.content), materializer),
            self.services.store.clone(),
            self.services.params,
        )
    }
}

/// Poll `pool` until it drains, collecting every completion
pub fn drain(pool: &mut TaskPool) -> Vec<Completion> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut completions = Vec::new();
    while !pool.is_empty() {
        assert!(Instant::now() < deadline, "task pool did not drain");
        completions.extend(pool.poll());
        std::thread::sleep(Duration::from_millis(1));
    }
    completions
}
