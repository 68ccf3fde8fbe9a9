//! Texture mip-level download

use crate::asset::MipLevel;
use crate::core::{Error, Result};
use crate::services::Services;

/// One mip level of a texture atlas
#[derive(Debug)]
pub struct TextureDownload {
    atlas_hash: String,
    level: MipLevel,
    data: Option<Vec<u8>>,
}

impl TextureDownload {
    pub fn new(atlas_hash: String, level: MipLevel) -> Self {
        Self {
            atlas_hash,
            level,
            data: None,
        }
    }

    pub fn atlas_hash(&self) -> &str {
        &self.atlas_hash
    }

    pub fn level(&self) -> &MipLevel {
        &self.level
    }

    /// Fetched bytes, once finished
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn take_data(&mut self) -> Option<Vec<u8>> {
        self.data.take()
    }

    pub(super) fn store(&mut self, data: Vec<u8>) {
        self.data = Some(data);
    }
}

/// Worker body: fetch the level's byte range, which must arrive whole
pub(super) fn fetch_level(atlas_hash: &str, level: &MipLevel, services: &Services) -> Result<Vec<u8>> {
    let bytes = services.fetcher.fetch(atlas_hash, Some(level.range()))?;
    if bytes.len() as u64 != level.length {
        return Err(Error::fetch(
            atlas_hash,
            format!(
                "mip level at {} ({}x{}) returned {} of {} bytes",
                level.offset,
                level.width,
                level.height,
                bytes.len(),
                level.length
            ),
        ));
    }
    Ok(bytes)
}
