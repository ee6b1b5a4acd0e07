//! Relabeling and output of the final fragments.
//!
//! Fragment `i` of rank `r` gets global index `i * size + r` and the
//! alphabetic prefix of that index, so fragments of different rounds and
//! ranks never share a vertex. Output is either gathered to the coordinator
//! into one edge list or written by every rank to its own files.

use crate::algs::communicator::{CommTag, Communicator, abort_on_error};
use crate::algs::wire::{WireCount, decode_with_header, encode};
use crate::graph::multigraph::{EdgeGraph, MultiDiGraph};
use crate::graph::vertex::{LabeledVertex, Vertex};
use crate::io::edge_list::{create_output, fragment_file_name, write_edges};
use crate::scaler_error::ScalerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Where the final fragments are written.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeMode {
    /// Rank 0 writes every fragment into a single file.
    #[default]
    Centralized,
    /// Every rank writes `<output>.<rank>.<index>.edges` for its fragments.
    Parallel,
}

impl FromStr for MergeMode {
    type Err = ScalerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "centralized" => Ok(Self::Centralized),
            "parallel" | "nfs" => Ok(Self::Parallel),
            other => Err(ScalerError::InvalidMergeMode(other.to_string())),
        }
    }
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Centralized => "centralized",
            Self::Parallel => "parallel",
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Edges written (or sent to the coordinator) by this rank, its own only
    /// except on the coordinator in centralized mode.
    pub edges_written: u64,
    /// Files this rank created.
    pub files: Vec<PathBuf>,
}

/// Global index of fragment `round` on `rank`.
pub fn fragment_index(round: usize, rank: usize, size: usize) -> Result<u32, ScalerError> {
    round
        .checked_mul(size)
        .and_then(|x| x.checked_add(rank))
        .and_then(|x| u32::try_from(x).ok())
        .ok_or_else(|| {
            ScalerError::InvalidConfig(format!(
                "fragment index of round {round} on rank {rank} overflows"
            ))
        })
}

/// Rewrite every vertex of `graph` into the namespace of fragment `index`.
pub fn relabel(graph: &MultiDiGraph<Vertex>, index: u32) -> MultiDiGraph<LabeledVertex> {
    graph.map_vertices(|v| LabeledVertex::new(index, v))
}

/// Relabel this rank's fragments, in round order.
pub fn relabel_fragments<C: Communicator + ?Sized>(
    comm: &C,
    fragments: &[MultiDiGraph<Vertex>],
) -> Result<Vec<MultiDiGraph<LabeledVertex>>, ScalerError> {
    fragments
        .iter()
        .enumerate()
        .map(|(round, g)| Ok(relabel(g, fragment_index(round, comm.rank(), comm.size())?)))
        .collect()
}

/// Write the relabeled fragments according to `mode`. Collective.
pub fn merge_fragments<C: Communicator + ?Sized>(
    comm: &C,
    fragments: &[MultiDiGraph<LabeledVertex>],
    output: &Path,
    mode: MergeMode,
) -> Result<MergeReport, ScalerError> {
    let result = match mode {
        MergeMode::Centralized => gather_to_coordinator(comm, fragments, output),
        MergeMode::Parallel => write_parallel(comm, fragments, output),
    };
    let report = abort_on_error(comm, result)?;
    comm.barrier()?;
    Ok(report)
}

fn serialize(fragments: &[MultiDiGraph<LabeledVertex>]) -> Result<(u64, Vec<u8>), ScalerError> {
    let mut text = Vec::new();
    let mut n = 0;
    for f in fragments {
        n += write_edges(&mut text, f.edges().iter().copied())?;
    }
    Ok((n, text))
}

/// Coordinator writes its own fragments, then each peer's in rank order.
fn gather_to_coordinator<C: Communicator + ?Sized>(
    comm: &C,
    fragments: &[MultiDiGraph<LabeledVertex>],
    output: &Path,
) -> Result<MergeReport, ScalerError> {
    if !comm.is_coordinator() {
        let (n, text) = serialize(fragments)?;
        let mut msg = encode(&[WireCount::new(n)]);
        msg.extend_from_slice(&text);
        comm.send(0, CommTag::MERGE, &msg)?;
        return Ok(MergeReport {
            edges_written: n,
            files: Vec::new(),
        });
    }

    let mut out = create_output(output);
    let mut written = 0u64;
    let mut failure: Option<ScalerError> = None;
    if let Ok(w) = out.as_mut() {
        for f in fragments {
            match write_edges(w, f.edges().iter().copied()) {
                Ok(n) => written += n,
                Err(e) => {
                    failure = Some(e.into());
                    break;
                }
            }
        }
    }
    // Receive from every peer even after a local failure so no sender blocks.
    for peer in 1..comm.size() {
        let msg = comm.recv(peer, CommTag::MERGE)?;
        let (count, text): (WireCount, Vec<u8>) = decode_with_header(peer, &msg)?;
        if failure.is_some() {
            continue;
        }
        if let Ok(w) = out.as_mut() {
            match w.write_all(&text) {
                Ok(()) => written += count.get(),
                Err(e) => failure = Some(e.into()),
            }
        }
    }

    let mut w = out?;
    if let Some(e) = failure {
        return Err(e);
    }
    w.flush()?;
    log::debug!("wrote {written} edges to {}", output.display());
    Ok(MergeReport {
        edges_written: written,
        files: vec![output.to_path_buf()],
    })
}

fn write_parallel<C: Communicator + ?Sized>(
    comm: &C,
    fragments: &[MultiDiGraph<LabeledVertex>],
    output: &Path,
) -> Result<MergeReport, ScalerError> {
    let mut report = MergeReport::default();
    for (index, f) in fragments.iter().enumerate() {
        let path = fragment_file_name(output, comm.rank(), index);
        let mut w = create_output(&path)?;
        report.edges_written += write_edges(&mut w, f.edges().iter().copied())?;
        w.flush()?;
        report.files.push(path);
    }
    Ok(report)
}
