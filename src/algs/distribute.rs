//! Edge distribution: split the input stream across the pool and derive the
//! shared [`PartitionMap`].
//!
//! The coordinator reads the header and streams one contiguous, near-equal
//! slice of edges to every other rank, keeping the first slice for itself.
//! Every rank then contributes its shard's vertex extent to an all-gather and
//! gap-fills the extents into the same ownership map.
//!
//! Failures never leave peers blocked: a rank whose shard could not be
//! produced still joins the extent exchange with a failure marker, and every
//! rank returns an error once any marker is seen.

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::wire::{
    STATUS_FAILED, STATUS_OK, WireEdge, WireExtent, WireShardHdr, decode_one,
    decode_with_header, encode,
};
use crate::graph::multigraph::MultiDiGraph;
use crate::graph::vertex::{Edge, Vertex};
use crate::io::edge_list::{EdgeListHeader, EdgeListReader};
use crate::partitioning::{PartitionMap, VertexExtent};
use crate::scaler_error::ScalerError;
use std::io::BufRead;

/// Number of edges assigned to `rank`: `total / size`, plus one for the first
/// `total % size` ranks.
pub fn shard_len(total: u64, size: usize, rank: usize) -> u64 {
    let size = size as u64;
    let rank = rank as u64;
    total / size + u64::from(rank < total % size)
}

/// This rank's share of the input after distribution.
#[derive(Clone, Debug)]
pub struct EdgeShard {
    pub edges: Vec<Edge>,
    pub partition_map: PartitionMap,
    /// Total vertex count declared by the input header.
    pub total_vertices: u64,
    /// Total edge count declared by the input header.
    pub total_edges: u64,
}

impl EdgeShard {
    /// Build the local multigraph; edge ids follow shard order.
    pub fn local_graph(&self) -> MultiDiGraph<Vertex> {
        MultiDiGraph::from_edges(self.edges.iter().copied())
    }
}

/// Distribute the edge stream over the pool.
///
/// `input` is only read on the coordinator; other ranks pass `None`.
pub fn distribute_edges<C, R>(input: Option<R>, comm: &C) -> Result<EdgeShard, ScalerError>
where
    C: Communicator + ?Sized,
    R: BufRead,
{
    let local = if comm.is_coordinator() {
        scatter_shards(input, comm)
    } else {
        receive_shard(comm)
    };

    let (status, extent) = match &local {
        Ok((_, edges)) => (STATUS_OK, VertexExtent::of_edges(edges)),
        Err(_) => (STATUS_FAILED, None),
    };
    let payload = encode(&[WireExtent::new(status, extent.map(|e| (e.min, e.max)))]);
    let gathered = comm.all_gather(CommTag::PARTITION_MAP, &payload)?;

    let mut extents = Vec::with_capacity(gathered.len());
    let mut first_failed = None;
    for (rank, bytes) in gathered.iter().enumerate() {
        let rec: WireExtent = decode_one(rank, bytes)?;
        if rec.status() != STATUS_OK && first_failed.is_none() {
            first_failed = Some(rank);
        }
        extents.push(rec.extent().map(|(min, max)| VertexExtent::new(min, max)));
    }

    let (header, edges) = local?;
    if let Some(rank) = first_failed {
        return Err(ScalerError::PeerFailed {
            rank,
            phase: "edge distribution",
        });
    }

    let partition_map = PartitionMap::from_extents(&extents)?;
    log::debug!(
        "rank {}: shard of {} edges, owns {:?}",
        comm.rank(),
        edges.len(),
        partition_map.range(comm.rank())
    );
    Ok(EdgeShard {
        edges,
        partition_map,
        total_vertices: header.vertices,
        total_edges: header.edges,
    })
}

/// Coordinator side. On failure every rank that has not received its shard
/// yet gets a failure marker instead.
fn scatter_shards<C, R>(input: Option<R>, comm: &C) -> Result<(EdgeListHeader, Vec<Edge>), ScalerError>
where
    C: Communicator + ?Sized,
    R: BufRead,
{
    let mut next_peer = 1;
    let result = read_and_send(input, comm, &mut next_peer);
    if let Err(e) = &result {
        log::error!("edge distribution failed: {e}");
        let marker = encode(&[WireShardHdr::failed()]);
        for peer in next_peer..comm.size() {
            if let Err(send_err) = comm.send(peer, CommTag::INITIAL_EDGES, &marker) {
                log::error!("could not notify rank {peer}: {send_err}");
                comm.abort(&send_err.to_string());
                return Err(send_err);
            }
        }
    }
    result
}

fn read_and_send<C, R>(
    input: Option<R>,
    comm: &C,
    next_peer: &mut usize,
) -> Result<(EdgeListHeader, Vec<Edge>), ScalerError>
where
    C: Communicator + ?Sized,
    R: BufRead,
{
    let input = input.ok_or_else(|| {
        ScalerError::InvalidConfig("the coordinator needs an input edge stream".into())
    })?;
    let mut reader = EdgeListReader::new(input);
    let header = reader.read_header()?;
    let size = comm.size();

    let mut own = Vec::new();
    for rank in 0..size {
        let edges = reader.read_edges(shard_len(header.edges, size, rank))?;
        if rank == 0 {
            own = edges;
            continue;
        }
        let records: Vec<WireEdge> = edges.iter().copied().map(WireEdge::of).collect();
        let mut msg = encode(&[WireShardHdr::new(
            STATUS_OK,
            header.vertices,
            header.edges,
            records.len() as u64,
        )]);
        msg.extend_from_slice(&encode(&records));
        comm.send(rank, CommTag::INITIAL_EDGES, &msg)?;
        *next_peer = rank + 1;
    }

    let trailing = reader.count_trailing()?;
    if trailing > 0 {
        log::warn!(
            "input has {trailing} line(s) after the {} declared edges; ignored",
            header.edges
        );
    }
    Ok((header, own))
}

fn receive_shard<C>(comm: &C) -> Result<(EdgeListHeader, Vec<Edge>), ScalerError>
where
    C: Communicator + ?Sized,
{
    let msg = comm.recv(0, CommTag::INITIAL_EDGES)?;
    let (hdr, records): (WireShardHdr, Vec<WireEdge>) = decode_with_header(0, &msg)?;
    if hdr.status() != STATUS_OK {
        return Err(ScalerError::PeerFailed {
            rank: 0,
            phase: "edge distribution",
        });
    }
    if records.len() as u64 != hdr.edge_count() {
        return Err(ScalerError::WireFormat {
            neighbor: 0,
            reason: format!(
                "shard header announces {} edges, body holds {}",
                hdr.edge_count(),
                records.len()
            ),
        });
    }
    let header = EdgeListHeader {
        vertices: hdr.total_vertices(),
        edges: hdr.total_edges(),
    };
    Ok((header, records.iter().map(WireEdge::get).collect()))
}
