//! Collaborators the scheduler calls into from worker threads
//!
//! Task bodies never touch the network, the mesh format or the disk directly;
//! they go through these traits so the engine can run against a CDN, an
//! in-memory store or test doubles.

pub mod store;
pub mod memory;
pub mod http;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::asset::AssetDescriptor;
use crate::core::{Error, Result, StreamParams};
use crate::streaming::pdae::DecodedRefinements;

pub use store::{ArtifactHandle, ArtifactStore};
pub use memory::{FetchRecord, MemoryContentStore};
pub use http::HttpFetcher;

/// Inclusive-start, length-limited byte range of a content object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Offset one past the last byte
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Content-addressed fetch from the CDN
pub trait ContentFetch: Send + Sync {
    /// Fetch an object by hash, optionally limited to a byte range.
    ///
    /// Ranges past the end of the object return the bytes that exist.
    fn fetch(&self, hash: &str, range: Option<ByteRange>) -> Result<Vec<u8>>;

    /// Resolve a content path to its hash.
    fn resolve(&self, path: &str) -> Result<String> {
        Err(Error::fetch(path, "path resolution not supported"))
    }
}

/// Input to a [`Materializer`]
pub struct MaterializeRequest<'a> {
    pub asset: &'a AssetDescriptor,
    /// Main mesh document
    pub mesh: &'a [u8],
    /// Auxiliary files keyed by basename (base-level textures and the like)
    pub subfiles: &'a HashMap<String, Vec<u8>>,
    /// The whole progressive stream, for variants that bake it in
    pub full_stream: Option<&'a [u8]>,
}

/// Turns a downloaded payload into renderable artifact bytes
pub trait Materializer: Send + Sync {
    fn materialize(&self, request: &MaterializeRequest<'_>) -> Result<Vec<u8>>;
}

/// Incremental decoder for progressive refinement streams
pub trait RefinementDecoder: Send + Sync {
    /// Decode the complete records contained in `data`.
    ///
    /// `data` starts with the bytes left over from the previous chunk.
    fn decode(
        &self,
        data: &[u8],
        refinements_read: u32,
        num_refinements: Option<u32>,
    ) -> Result<DecodedRefinements>;
}

/// Materializer that stores the raw payload unchanged.
///
/// Layout: mesh length (u64 LE), mesh bytes, subfile count (u32 LE), then
/// each subfile as name length (u32 LE), name, data length (u64 LE), data,
/// in name order. A baked progressive stream follows as stream length
/// (u64 LE) and stream bytes; the section is absent otherwise.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughMaterializer;

impl Materializer for PassthroughMaterializer {
    fn materialize(&self, request: &MaterializeRequest<'_>) -> Result<Vec<u8>> {
        let stream_len = request.full_stream.map_or(0, |s| s.len() + 8);
        let mut out = Vec::with_capacity(request.mesh.len() + 12 + stream_len);
        out.extend_from_slice(&(request.mesh.len() as u64).to_le_bytes());
        out.extend_from_slice(request.mesh);

        let mut names: Vec<&String> = request.subfiles.keys().collect();
        names.sort();
        out.extend_from_slice(&(names.len() as u32).to_le_bytes());
        for name in names {
            let data = &request.subfiles[name];
            out.extend_from_slice(&(name.len() as u32).to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(&(data.len() as u64).to_le_bytes());
            out.extend_from_slice(data);
        }

        if let Some(stream) = request.full_stream {
            out.extend_from_slice(&(stream.len() as u64).to_le_bytes());
            out.extend_from_slice(stream);
        }
        Ok(out)
    }
}

/// An artifact written by [`PassthroughMaterializer`], read back
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassthroughArtifact {
    pub mesh: Vec<u8>,
    pub subfiles: BTreeMap<String, Vec<u8>>,
    pub full_stream: Option<Vec<u8>>,
}

impl PassthroughArtifact {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = LayoutReader { bytes, pos: 0 };

        let mesh_len = reader.u64()?;
        let mesh = reader.take(mesh_len)?.to_vec();

        let count = reader.u32()?;
        let mut subfiles = BTreeMap::new();
        for _ in 0..count {
            let name_len = reader.u32()?;
            let name = std::str::from_utf8(reader.take(u64::from(name_len))?)
                .map_err(|e| Error::Decode(format!("subfile name: {e}")))?
                .to_string();
            let data_len = reader.u64()?;
            subfiles.insert(name, reader.take(data_len)?.to_vec());
        }

        let full_stream = if reader.is_done() {
            None
        } else {
            let stream_len = reader.u64()?;
            Some(reader.take(stream_len)?.to_vec())
        };
        if !reader.is_done() {
            return Err(Error::Decode(format!(
                "{} trailing bytes in artifact",
                bytes.len() - reader.pos
            )));
        }

        Ok(Self {
            mesh,
            subfiles,
            full_stream,
        })
    }
}

struct LayoutReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> LayoutReader<'a> {
    fn take(&mut self, len: u64) -> Result<&'a [u8]> {
        let end = usize::try_from(len)
            .ok()
            .and_then(|len| self.pos.checked_add(len))
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| Error::Decode(format!("artifact truncated at byte {}", self.pos)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn is_done(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

/// The caller-supplied collaborators
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn ContentFetch>,
    pub materializer: Arc<dyn Materializer>,
    pub decoder: Arc<dyn RefinementDecoder>,
}

/// Everything a task body can reach from a worker thread
pub struct Services {
    pub fetcher: Arc<dyn ContentFetch>,
    pub materializer: Arc<dyn Materializer>,
    pub decoder: Arc<dyn RefinementDecoder>,
    pub store: ArtifactStore,
    pub params: StreamParams,
}

impl Services {
    pub fn new(collaborators: Collaborators, store: ArtifactStore, params: StreamParams) -> Self {
        Self {
            fetcher: collaborators.fetcher,
            materializer: collaborators.materializer,
            decoder: collaborators.decoder,
            store,
            params,
        }
    }
}
