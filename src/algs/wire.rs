//! Fixed little-endian wire records for every message the pool exchanges.
//!
//! All multi-byte integers are stored pre-LE with `.to_le()` and decoded with
//! `from_le`, so a buffer produced on any host decodes identically elsewhere.

use crate::graph::vertex::{Edge, LabeledVertex, Vertex};
use crate::scaler_error::ScalerError;
use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;

/// Status marker carried by messages that may report an upstream failure.
pub const STATUS_OK: u32 = 0;
pub const STATUS_FAILED: u32 = 1;

/// Serialize a slice of records.
pub fn encode<T: Pod>(records: &[T]) -> Vec<u8> {
    bytemuck::cast_slice(records).to_vec()
}

/// Decode a buffer of whole records received from `neighbor`.
///
/// Buffers are not assumed to be aligned for `T`.
pub fn decode<T: Pod>(neighbor: usize, bytes: &[u8]) -> Result<Vec<T>, ScalerError> {
    let width = size_of::<T>();
    if bytes.len() % width != 0 {
        return Err(ScalerError::WireFormat {
            neighbor,
            reason: format!(
                "{} bytes is not a multiple of the {width}-byte record",
                bytes.len()
            ),
        });
    }
    Ok(bytes
        .chunks_exact(width)
        .map(bytemuck::pod_read_unaligned)
        .collect())
}

/// Decode a buffer expected to hold exactly one record.
pub fn decode_one<T: Pod>(neighbor: usize, bytes: &[u8]) -> Result<T, ScalerError> {
    if bytes.len() != size_of::<T>() {
        return Err(ScalerError::WireFormat {
            neighbor,
            reason: format!("expected {} bytes, got {}", size_of::<T>(), bytes.len()),
        });
    }
    Ok(bytemuck::pod_read_unaligned(bytes))
}

/// Split a message into a fixed header record and a tail of body records.
pub fn decode_with_header<H: Pod, T: Pod>(
    neighbor: usize,
    bytes: &[u8],
) -> Result<(H, Vec<T>), ScalerError> {
    let hdr_len = size_of::<H>();
    if bytes.len() < hdr_len {
        return Err(ScalerError::WireFormat {
            neighbor,
            reason: format!("message of {} bytes has no {hdr_len}-byte header", bytes.len()),
        });
    }
    let (head, body) = bytes.split_at(hdr_len);
    Ok((bytemuck::pod_read_unaligned(head), decode(neighbor, body)?))
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u64,
}

impl WireCount {
    pub fn new(n: u64) -> Self {
        Self { n_le: n.to_le() }
    }
    pub fn get(&self) -> u64 {
        u64::from_le(self.n_le)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireVertex {
    pub id_le: u64,
}

impl WireVertex {
    pub fn of(id: Vertex) -> Self {
        Self { id_le: id.to_le() }
    }
    pub fn get(&self) -> Vertex {
        u64::from_le(self.id_le)
    }
}

/// A directed edge `(tail, head)`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireEdge {
    pub tail_le: u64,
    pub head_le: u64,
}

impl WireEdge {
    pub fn of((tail, head): Edge) -> Self {
        Self {
            tail_le: tail.to_le(),
            head_le: head.to_le(),
        }
    }
    pub fn get(&self) -> Edge {
        (u64::from_le(self.tail_le), u64::from_le(self.head_le))
    }
}

/// Induction query sent to the owner of `head`: "is `head` in your ownership
/// set?" The owner echoes back every query it confirms; `edge_id` is the
/// position of the edge in the requester's local graph.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireQuery {
    pub edge_id_le: u64,
    pub head_le: u64,
}

impl WireQuery {
    pub fn new(edge_id: usize, head: Vertex) -> Self {
        Self {
            edge_id_le: (edge_id as u64).to_le(),
            head_le: head.to_le(),
        }
    }
    pub fn edge_id(&self) -> usize {
        u64::from_le(self.edge_id_le) as usize
    }
    pub fn head(&self) -> Vertex {
        u64::from_le(self.head_le)
    }
}

/// One process's raw shard extent plus a status marker.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireExtent {
    pub status_le: u32,
    pub present_le: u32,
    pub min_le: u64,
    pub max_le: u64,
}

impl WireExtent {
    pub fn new(status: u32, extent: Option<(Vertex, Vertex)>) -> Self {
        let (present, (min, max)) = match extent {
            Some(e) => (1u32, e),
            None => (0u32, (0, 0)),
        };
        Self {
            status_le: status.to_le(),
            present_le: present.to_le(),
            min_le: min.to_le(),
            max_le: max.to_le(),
        }
    }
    pub fn status(&self) -> u32 {
        u32::from_le(self.status_le)
    }
    pub fn extent(&self) -> Option<(Vertex, Vertex)> {
        (u32::from_le(self.present_le) != 0)
            .then(|| (u64::from_le(self.min_le), u64::from_le(self.max_le)))
    }
}

/// Header of an initial edge shard; followed by `edge_count` [`WireEdge`]s.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireShardHdr {
    pub status_le: u32,
    pub reserved_le: u32,
    pub total_vertices_le: u64,
    pub total_edges_le: u64,
    pub edge_count_le: u64,
}

impl WireShardHdr {
    pub fn new(status: u32, total_vertices: u64, total_edges: u64, edge_count: u64) -> Self {
        Self {
            status_le: status.to_le(),
            reserved_le: 0,
            total_vertices_le: total_vertices.to_le(),
            total_edges_le: total_edges.to_le(),
            edge_count_le: edge_count.to_le(),
        }
    }
    pub fn failed() -> Self {
        Self::new(STATUS_FAILED, 0, 0, 0)
    }
    pub fn status(&self) -> u32 {
        u32::from_le(self.status_le)
    }
    pub fn total_vertices(&self) -> u64 {
        u64::from_le(self.total_vertices_le)
    }
    pub fn total_edges(&self) -> u64 {
        u64::from_le(self.total_edges_le)
    }
    pub fn edge_count(&self) -> u64 {
        u64::from_le(self.edge_count_le)
    }
}

/// A relabelled vertex `(fragment, id)`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireLabel {
    pub fragment_le: u32,
    pub reserved_le: u32,
    pub id_le: u64,
}

impl WireLabel {
    pub fn of(v: LabeledVertex) -> Self {
        Self {
            fragment_le: v.fragment().to_le(),
            reserved_le: 0,
            id_le: v.id().to_le(),
        }
    }
    pub fn get(&self) -> LabeledVertex {
        LabeledVertex::new(u32::from_le(self.fragment_le), u64::from_le(self.id_le))
    }
}

const_assert_eq!(size_of::<WireCount>(), 8);
const_assert_eq!(size_of::<WireVertex>(), 8);
const_assert_eq!(size_of::<WireEdge>(), 16);
const_assert_eq!(size_of::<WireQuery>(), 16);
const_assert_eq!(size_of::<WireExtent>(), 24);
const_assert_eq!(size_of::<WireShardHdr>(), 32);
const_assert_eq!(size_of::<WireLabel>(), 16);
