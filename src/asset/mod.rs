//! Asset descriptions: CDN manifests, submitted assets and scene files

pub mod manifest;
pub mod descriptor;
pub mod scene;

pub use manifest::{
    AssetManifest, HashSize, HashSizes, ManifestMetadata, MipLevel, MipmapAtlas, ModelVariant,
    VariantManifest, subfile_basename,
};
pub use descriptor::{AssetDescriptor, AssetId, AssetPhase, AssetState};
pub use scene::{DEFAULT_VANTAGE, Scene, SceneModel};
