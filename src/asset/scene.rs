//! Scene files: a list of placed models plus CDN object sizes
//!
//! ```json
//! {
//!   "vantage": [0, 30000, 10000],
//!   "models": [
//!     { "manifest": { ... }, "variant": "progressive", "position": [0, 0, 0], "scale": 1.0 }
//!   ],
//!   "sizes": { "<hash>": { "gzip_size": 1234 } }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::descriptor::{AssetDescriptor, AssetId};
use super::manifest::{AssetManifest, HashSizes, ModelVariant};
use crate::core::{Result, Vec3};

/// Viewpoint used when a scene does not name one
pub const DEFAULT_VANTAGE: Vec3 = Vec3::new(0.0, 30000.0, 10000.0);

/// One placed model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SceneModel {
    pub manifest: AssetManifest,
    pub variant: ModelVariant,
    pub position: [f32; 3],
    #[serde(default = "default_scale")]
    pub scale: f32,
}

fn default_scale() -> f32 {
    1.0
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub models: Vec<SceneModel>,
    #[serde(default)]
    pub sizes: HashSizes,
    #[serde(default)]
    pub vantage: Option<[f32; 3]>,
}

impl Scene {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn vantage(&self) -> Vec3 {
        self.vantage.map_or(DEFAULT_VANTAGE, Vec3::from)
    }

    /// Descriptors for every model, numbered in file order.
    ///
    /// Download sizes are estimated from `sizes`; models whose variant is
    /// missing keep `None` and fail when submitted.
    pub fn descriptors(&self, min_base_dimension: u32) -> Vec<AssetDescriptor> {
        self.models
            .iter()
            .enumerate()
            .map(|(i, model)| {
                let download_size = model
                    .manifest
                    .variant(model.variant)
                    .ok()
                    .and_then(|v| v.estimated_download_size(model.variant, &self.sizes, min_base_dimension));
                AssetDescriptor::new(
                    AssetId(i as u32),
                    model.manifest.clone(),
                    model.variant,
                    Vec3::from(model.position),
                    model.scale,
                )
                .with_download_size(download_size)
            })
            .collect()
    }
}
