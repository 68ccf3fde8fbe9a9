//! CDN manifest model
//!
//! Mirrors the JSON the CDN browse API returns for each model. Each model
//! lists several encodings ("types"); every encoding names its mesh hash,
//! its subfiles, optional mip atlases and an optional progressive stream.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::services::ByteRange;

/// Which encoding of a model to stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    /// Optimized single-resolution mesh
    Optimized,
    /// Optimized mesh, scene graph kept unflattened
    OptimizedUnflattened,
    /// Progressive base mesh, refined by streaming the progressive stream
    Progressive,
    /// Progressive mesh with the whole stream baked in at materialization
    ProgressiveFull,
}

impl ModelVariant {
    /// Key of this variant under `metadata.types`
    pub fn manifest_key(self) -> &'static str {
        match self {
            Self::Optimized | Self::OptimizedUnflattened => "optimized",
            Self::Progressive | Self::ProgressiveFull => "progressive",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Optimized => "optimized",
            Self::OptimizedUnflattened => "optimized_unflattened",
            Self::Progressive => "progressive",
            Self::ProgressiveFull => "progressive_full",
        }
    }

    /// Refinements arrive as a chunked stream after the base mesh
    pub fn streams_refinements(self) -> bool {
        self == Self::Progressive
    }

    /// The full progressive stream is applied before the artifact is published
    pub fn bakes_full_stream(self) -> bool {
        self == Self::ProgressiveFull
    }
}

/// One mip level inside a texture atlas
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MipLevel {
    pub offset: u64,
    pub length: u64,
    pub width: u32,
    pub height: u32,
}

impl MipLevel {
    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn range(&self) -> ByteRange {
        ByteRange::new(self.offset, self.length)
    }
}

/// A texture stored as one object holding every mip level, coarse to fine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MipmapAtlas {
    pub hash: String,
    pub byte_ranges: Vec<MipLevel>,
}

impl MipmapAtlas {
    /// First level at least `min_dimension` wide or tall, else the finest level
    pub fn base_level(&self, min_dimension: u32) -> Option<&MipLevel> {
        self.byte_ranges
            .iter()
            .find(|level| level.width >= min_dimension || level.height >= min_dimension)
            .or(self.byte_ranges.last())
    }

    /// Levels with more pixels than `base`, coarse to fine
    pub fn refinement_levels(&self, base: &MipLevel) -> Vec<MipLevel> {
        let mut levels: Vec<MipLevel> = self
            .byte_ranges
            .iter()
            .rev()
            .take_while(|level| level.pixels() > base.pixels())
            .copied()
            .collect();
        levels.reverse();
        levels
    }
}

/// One encoding of a model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariantManifest {
    /// Hash of the main mesh document
    pub hash: String,
    /// Subfile paths; the texture name is the second-to-last path segment
    #[serde(default)]
    pub subfiles: Vec<String>,
    /// Content hashes for `subfiles`, same order, when known upfront
    #[serde(default)]
    pub subfile_hashes: Vec<String>,
    /// Mip atlases keyed by texture name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mipmaps: Option<HashMap<String, MipmapAtlas>>,
    /// Hash of the progressive refinement stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progressive_stream: Option<String>,
}

impl VariantManifest {
    /// Atlas for a texture name; atlas keys may carry a leading path
    pub fn mip_atlas(&self, name: &str) -> Option<&MipmapAtlas> {
        self.mipmaps
            .as_ref()?
            .iter()
            .find(|(key, _)| key.rsplit('/').next() == Some(name))
            .map(|(_, atlas)| atlas)
    }

    /// Approximate bytes the initial download of `variant` costs.
    ///
    /// `None` when the mesh size itself is unknown.
    pub fn estimated_download_size(
        &self,
        variant: ModelVariant,
        sizes: &HashSizes,
        min_base_dimension: u32,
    ) -> Option<u64> {
        let size_of = |hash: &str| sizes.get(hash).map_or(0, |s| s.gzip_size);
        let mut total = sizes.get(&self.hash)?.gzip_size;

        match variant {
            ModelVariant::Optimized | ModelVariant::OptimizedUnflattened => {
                total += self.subfile_hashes.iter().map(|h| size_of(h.as_str())).sum::<u64>();
            }
            ModelVariant::Progressive => {
                total += self
                    .subfiles
                    .iter()
                    .filter_map(|s| self.mip_atlas(subfile_basename(s)))
                    .filter_map(|atlas| atlas.base_level(min_base_dimension))
                    .map(|level| level.length)
                    .sum::<u64>();
            }
            ModelVariant::ProgressiveFull => {
                total += self.progressive_stream.as_deref().map_or(0, size_of);
                total += self
                    .subfiles
                    .iter()
                    .filter_map(|s| self.mip_atlas(subfile_basename(s)))
                    .filter_map(|atlas| atlas.byte_ranges.last())
                    .map(|level| level.length)
                    .sum::<u64>();
            }
        }
        Some(total)
    }
}

/// Per-model metadata block
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    #[serde(default)]
    pub types: HashMap<String, VariantManifest>,
}

/// A model as listed by the CDN
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetManifest {
    pub base_path: String,
    pub full_path: String,
    #[serde(default)]
    pub version_num: String,
    #[serde(default)]
    pub metadata: ManifestMetadata,
}

impl AssetManifest {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The encoding `variant` selects
    pub fn variant(&self, variant: ModelVariant) -> Result<&VariantManifest> {
        self.metadata.types.get(variant.manifest_key()).ok_or_else(|| {
            Error::Manifest(format!("{} has no {} encoding", self.full_path, variant.manifest_key()))
        })
    }
}

/// Compressed size of a content object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashSize {
    pub gzip_size: u64,
}

/// Object sizes keyed by hash
pub type HashSizes = HashMap<String, HashSize>;

/// Texture name of a subfile path (its second-to-last segment)
pub fn subfile_basename(subfile: &str) -> &str {
    subfile.trim_end_matches('/').rsplit('/').nth(1).unwrap_or(subfile)
}
