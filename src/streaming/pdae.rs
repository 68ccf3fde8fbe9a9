//! Progressive mesh refinement records and the PDAE stream decoder
//!
//! A PDAE stream is line oriented:
//!
//! ```text
//! PDAE
//! <number of refinements>
//! <operations in refinement 0>
//! v x y z nx ny nz u v
//! t a b c
//! u index vertex
//! <operations in refinement 1>
//! ...
//! ```
//!
//! Streams arrive in byte-range chunks, so the decoder only consumes complete
//! lines that form complete refinements and hands back the bytes after them.

use std::fmt::Write as _;
use std::str::FromStr;

use crate::core::{Error, Result};
use crate::services::RefinementDecoder;

/// First line of every PDAE stream
pub const PDAE_MAGIC: &str = "PDAE";

/// One incremental mesh operation
#[derive(Clone, Debug, PartialEq)]
pub enum RefinementOp {
    /// Append a vertex with its normal and texture coordinate
    VertexAddition {
        position: [f32; 3],
        normal: [f32; 3],
        uv: [f32; 2],
    },
    /// Append a triangle over existing vertices
    TriangleAddition([u32; 3]),
    /// Point an existing index-buffer slot at another vertex
    IndexUpdate { index: u32, vertex: u32 },
}

/// A group of operations that together form one refinement step
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RefinementRecord {
    pub ops: Vec<RefinementOp>,
}

/// Output of one partial decode
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedRefinements {
    /// Total records decoded, including earlier chunks
    pub refinements_read: u32,
    /// Total record count, once the header has been seen
    pub num_refinements: Option<u32>,
    /// Records completed by this chunk
    pub records: Vec<RefinementRecord>,
    /// Unconsumed trailing bytes
    pub remainder: Vec<u8>,
}

/// Decoder for the PDAE text format
#[derive(Clone, Copy, Debug, Default)]
pub struct PdaeDecoder;

impl RefinementDecoder for PdaeDecoder {
    fn decode(
        &self,
        data: &[u8],
        refinements_read: u32,
        num_refinements: Option<u32>,
    ) -> Result<DecodedRefinements> {
        let mut lines = LineReader::new(data);

        let total = match num_refinements {
            Some(total) => total,
            None => match read_header(&mut lines)? {
                Some(total) => total,
                None => {
                    return Ok(DecodedRefinements {
                        refinements_read,
                        num_refinements: None,
                        records: Vec::new(),
                        remainder: data.to_vec(),
                    });
                }
            },
        };

        let mut read = refinements_read;
        let mut records = Vec::new();
        while read < total {
            match read_record(&mut lines)? {
                Some(record) => {
                    records.push(record);
                    read += 1;
                }
                None => break,
            }
        }

        Ok(DecodedRefinements {
            refinements_read: read,
            num_refinements: Some(total),
            records,
            remainder: data[lines.pos..].to_vec(),
        })
    }
}

/// Complete-line reader over a byte buffer
struct LineReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> LineReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Next newline-terminated line, or `None` if only a partial line remains
    fn next_line(&mut self) -> Result<Option<&'a str>> {
        let rest = &self.data[self.pos..];
        let Some(end) = rest.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        let line = std::str::from_utf8(&rest[..end])
            .map_err(|e| Error::Decode(format!("non-UTF-8 line at byte {}: {e}", self.pos)))?;
        self.pos += end + 1;
        Ok(Some(line.trim_end_matches('\r')))
    }
}

fn read_header(lines: &mut LineReader<'_>) -> Result<Option<u32>> {
    let start = lines.pos;
    let (Some(magic), Some(count)) = (lines.next_line()?, lines.next_line()?) else {
        lines.pos = start;
        return Ok(None);
    };
    if magic.trim() != PDAE_MAGIC {
        return Err(Error::Decode(format!("bad stream header {magic:?}")));
    }
    parse_number(count).map(Some)
}

/// Reads one whole record; rewinds and returns `None` if it is incomplete
fn read_record(lines: &mut LineReader<'_>) -> Result<Option<RefinementRecord>> {
    let start = lines.pos;
    let Some(count_line) = lines.next_line()? else {
        return Ok(None);
    };
    let count: usize = parse_number(count_line)?;

    let mut ops = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        match lines.next_line()? {
            Some(line) => ops.push(parse_op(line)?),
            None => {
                lines.pos = start;
                return Ok(None);
            }
        }
    }
    Ok(Some(RefinementRecord { ops }))
}

fn parse_number<T: FromStr>(line: &str) -> Result<T> {
    line.trim()
        .parse()
        .map_err(|_| Error::Decode(format!("expected a count, got {line:?}")))
}

fn parse_fields<T: FromStr, const N: usize>(line: &str) -> Result<[T; N]> {
    let values = line
        .split_whitespace()
        .skip(1)
        .map(|field| field.parse::<T>())
        .collect::<std::result::Result<Vec<T>, _>>()
        .map_err(|_| Error::Decode(format!("malformed operation {line:?}")))?;
    values
        .try_into()
        .map_err(|_| Error::Decode(format!("operation {line:?} needs {N} values")))
}

fn parse_op(line: &str) -> Result<RefinementOp> {
    match line.split_whitespace().next() {
        Some("v") => {
            let [x, y, z, nx, ny, nz, u, v] = parse_fields::<f32, 8>(line)?;
            Ok(RefinementOp::VertexAddition {
                position: [x, y, z],
                normal: [nx, ny, nz],
                uv: [u, v],
            })
        }
        Some("t") => Ok(RefinementOp::TriangleAddition(parse_fields::<u32, 3>(line)?)),
        Some("u") => {
            let [index, vertex] = parse_fields::<u32, 2>(line)?;
            Ok(RefinementOp::IndexUpdate { index, vertex })
        }
        other => Err(Error::Decode(format!("unknown refinement op {other:?}"))),
    }
}

/// Serialize records as a complete PDAE stream
pub fn encode_pdae(records: &[RefinementRecord]) -> Vec<u8> {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(out, "{PDAE_MAGIC}\n{}", records.len());
    for record in records {
        let _ = writeln!(out, "{}", record.ops.len());
        for op in &record.ops {
            let _ = match op {
                RefinementOp::VertexAddition { position: p, normal: n, uv } => writeln!(
                    out,
                    "v {} {} {} {} {} {} {} {}",
                    p[0], p[1], p[2], n[0], n[1], n[2], uv[0], uv[1]
                ),
                RefinementOp::TriangleAddition([a, b, c]) => writeln!(out, "t {a} {b} {c}"),
                RefinementOp::IndexUpdate { index, vertex } => writeln!(out, "u {index} {vertex}"),
            };
        }
    }
    out.into_bytes()
}

/// Consumer-side mesh that refinements are applied to in place
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgressiveMesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl ProgressiveMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Apply refinements in order.
    ///
    /// All records are validated first; on error the mesh is left untouched.
    pub fn apply(&mut self, records: &[RefinementRecord]) -> Result<()> {
        let mut vertices = self.positions.len() as u64;
        let mut indices = self.indices.len() as u64;
        for op in records.iter().flat_map(|r| &r.ops) {
            match *op {
                RefinementOp::VertexAddition { .. } => vertices += 1,
                RefinementOp::TriangleAddition(tri) => {
                    if let Some(&bad) = tri.iter().find(|&&v| u64::from(v) >= vertices) {
                        return Err(Error::Decode(format!("triangle references missing vertex {bad}")));
                    }
                    indices += 3;
                }
                RefinementOp::IndexUpdate { index, vertex } => {
                    if u64::from(index) >= indices || u64::from(vertex) >= vertices {
                        return Err(Error::Decode(format!("index update {index} -> {vertex} out of range")));
                    }
                }
            }
        }

        for op in records.iter().flat_map(|r| &r.ops) {
            match *op {
                RefinementOp::VertexAddition { position, normal, uv } => {
                    self.positions.push(position);
                    self.normals.push(normal);
                    self.uvs.push(uv);
                }
                RefinementOp::TriangleAddition(tri) => self.indices.extend_from_slice(&tri),
                RefinementOp::IndexUpdate { index, vertex } => self.indices[index as usize] = vertex,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_records() -> Vec<RefinementRecord> {
        vec![
            RefinementRecord {
                ops: vec![
                    RefinementOp::VertexAddition {
                        position: [1.0, 0.0, 0.0],
                        normal: [0.0, 0.0, 1.0],
                        uv: [1.0, 0.0],
                    },
                    RefinementOp::TriangleAddition([0, 1, 3]),
                ],
            },
            RefinementRecord {
                ops: vec![RefinementOp::IndexUpdate { index: 2, vertex: 3 }],
            },
            RefinementRecord {
                ops: vec![
                    RefinementOp::VertexAddition {
                        position: [0.0, 2.5, 0.0],
                        normal: [0.0, 1.0, 0.0],
                        uv: [0.5, 0.5],
                    },
                    RefinementOp::TriangleAddition([1, 2, 4]),
                    RefinementOp::IndexUpdate { index: 0, vertex: 4 },
                ],
            },
        ]
    }

    fn base_mesh() -> ProgressiveMesh {
        ProgressiveMesh {
            positions: vec![[0.0; 3]; 3],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            uvs: vec![[0.0; 2]; 3],
            indices: vec![0, 1, 2],
        }
    }

    #[test]
    fn test_decode_whole_stream() {
        let data = encode_pdae(&sample_records());
        let decoded = PdaeDecoder.decode(&data, 0, None).unwrap();

        assert_eq!(decoded.num_refinements, Some(3));
        assert_eq!(decoded.refinements_read, 3);
        assert_eq!(decoded.records, sample_records());
        assert!(decoded.remainder.is_empty());
    }

    #[test]
    fn test_decode_split_at_every_byte() {
        let data = encode_pdae(&sample_records());

        for split in 0..data.len() {
            let first = PdaeDecoder.decode(&data[..split], 0, None).unwrap();

            let mut carried = first.remainder.clone();
            carried.extend_from_slice(&data[split..]);
            let second = PdaeDecoder
                .decode(&carried, first.refinements_read, first.num_refinements)
                .unwrap();

            let mut all = first.records.clone();
            all.extend(second.records);
            assert_eq!(all, sample_records(), "split at {split}");
            assert_eq!(second.refinements_read, 3);
        }
    }

    #[test]
    fn test_partial_header_is_buffered() {
        let decoded = PdaeDecoder.decode(b"PDAE\n1", 0, None).unwrap();
        assert_eq!(decoded.num_refinements, None);
        assert_eq!(decoded.refinements_read, 0);
        assert_eq!(decoded.remainder, b"PDAE\n1");
    }

    #[test]
    fn test_bad_magic_is_decode_error() {
        let result = PdaeDecoder.decode(b"COLLADA\n3\n", 0, None);
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_unknown_op_is_decode_error() {
        let result = PdaeDecoder.decode(b"PDAE\n1\n1\nx 1 2\n", 0, None);
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_stops_at_known_total() {
        let mut data = encode_pdae(&sample_records());
        data.extend_from_slice(b"trailing garbage that is never parsed\n");
        let decoded = PdaeDecoder.decode(&data, 0, None).unwrap();
        assert_eq!(decoded.refinements_read, 3);
    }

    #[test]
    fn test_apply_refinements() {
        let mut mesh = base_mesh();
        mesh.apply(&sample_records()).unwrap();

        assert_eq!(mesh.vertex_count(), 5);
        assert_eq!(mesh.triangle_count(), 3);
        assert_eq!(mesh.indices, vec![4, 1, 3, 0, 1, 3, 1, 2, 4]);
        assert_eq!(mesh.uvs.len(), mesh.positions.len());
    }

    #[test]
    fn test_apply_rejects_out_of_range_without_mutation() {
        let mut mesh = base_mesh();
        let records = vec![RefinementRecord {
            ops: vec![
                RefinementOp::VertexAddition {
                    position: [0.0; 3],
                    normal: [0.0; 3],
                    uv: [0.0; 2],
                },
                RefinementOp::TriangleAddition([0, 1, 9]),
            ],
        }];

        assert!(mesh.apply(&records).is_err());
        assert_eq!(mesh, base_mesh());
    }
}
