//! Bridge edges between independently sampled fragments.
//!
//! Stitching runs after relabeling, so every fragment already lives in its
//! own vertex namespace and bridges never merge two vertices by accident.
//! Local stitching connects the fragments of one rank; distributed stitching
//! connects this rank's fragments to those of its peers and adds the bridges
//! to the first local fragment.

use crate::algs::communicator::{CommTag, Communicator, abort_on_error};
use crate::algs::wire::{WireLabel, decode, encode};
use crate::graph::multigraph::{EdgeGraph, MultiDiGraph};
use crate::graph::vertex::LabeledVertex;
use crate::scaler_error::ScalerError;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which fragment pairs receive bridges.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StitchTopology {
    /// Every ordered pair of fragments (and of ranks).
    #[default]
    AllToAll,
    /// Fragment `i` to `i + 1`; rank `r` to `r + 1`, both wrapping.
    Ring,
}

impl FromStr for StitchTopology {
    type Err = ScalerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all-to-all" => Ok(Self::AllToAll),
            "ring" => Ok(Self::Ring),
            other => Err(ScalerError::InvalidTopology(other.to_string())),
        }
    }
}

impl fmt::Display for StitchTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AllToAll => "all-to-all",
            Self::Ring => "ring",
        })
    }
}

/// Number of bridges per connected pair.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BridgeSpec {
    /// Fraction of the first local fragment's vertex count, rounded down.
    Fraction(f64),
    /// Absolute count.
    Count(usize),
}

impl Default for BridgeSpec {
    fn default() -> Self {
        Self::Fraction(0.1)
    }
}

impl BridgeSpec {
    pub fn bridge_count(&self, first_fragment_vertices: usize) -> usize {
        match *self {
            Self::Fraction(f) => (first_fragment_vertices as f64 * f).floor().max(0.0) as usize,
            Self::Count(n) => n,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    pub bridges: BridgeSpec,
    pub topology: StitchTopology,
}

/// Bridges added on this rank.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StitchReport {
    pub bridge_count: usize,
    pub local_bridges: usize,
    pub distributed_bridges: usize,
}

/// `k` draws with replacement; empty when `population` is.
pub fn choices<T: Copy, R: Rng>(population: &[T], k: usize, rng: &mut R) -> Vec<T> {
    if population.is_empty() {
        return Vec::new();
    }
    (0..k)
        .map(|_| population[rng.gen_range(0..population.len())])
        .collect()
}

pub struct Stitcher<'a, C: Communicator + ?Sized> {
    comm: &'a C,
    cfg: StitchConfig,
    rng: SmallRng,
}

impl<'a, C: Communicator + ?Sized> Stitcher<'a, C> {
    pub fn new(comm: &'a C, cfg: StitchConfig, seed: u64) -> Self {
        Self {
            comm,
            cfg,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Stitch locally, then across the pool. Collective, even on a rank
    /// without fragments.
    pub fn stitch(
        &mut self,
        fragments: &mut [MultiDiGraph<LabeledVertex>],
    ) -> Result<StitchReport, ScalerError> {
        let bridge_count = fragments
            .first()
            .map_or(0, |f| self.cfg.bridges.bridge_count(f.node_count()));
        let local_bridges = self.local_stitching(fragments, bridge_count);
        let distributed = self.distributed_stitching(fragments, bridge_count);
        let distributed_bridges = abort_on_error(self.comm, distributed)?;
        self.comm.barrier()?;
        log::debug!(
            "rank {}: {local_bridges} local and {distributed_bridges} distributed bridges ({})",
            self.comm.rank(),
            self.cfg.topology
        );
        Ok(StitchReport {
            bridge_count,
            local_bridges,
            distributed_bridges,
        })
    }

    /// Bridges between this rank's own fragments; no-op below two fragments.
    pub fn local_stitching(
        &mut self,
        fragments: &mut [MultiDiGraph<LabeledVertex>],
        bridge_count: usize,
    ) -> usize {
        let n = fragments.len();
        if n < 2 {
            return 0;
        }
        let pairs: Vec<(usize, usize)> = match self.cfg.topology {
            StitchTopology::AllToAll => (0..n)
                .flat_map(|i| (0..n).filter(move |&j| j != i).map(move |j| (i, j)))
                .collect(),
            StitchTopology::Ring => (0..n).map(|i| (i, (i + 1) % n)).collect(),
        };
        let mut added = 0;
        for (i, j) in pairs {
            let tails = choices(fragments[i].nodes(), bridge_count, &mut self.rng);
            let heads = choices(fragments[j].nodes(), bridge_count, &mut self.rng);
            for (t, h) in tails.into_iter().zip(heads) {
                fragments[i].add_edge(t, h);
                added += 1;
            }
        }
        added
    }

    /// Bridges from local tails to heads sampled by peers, added to the first
    /// fragment. Always joins the exchange.
    pub fn distributed_stitching(
        &mut self,
        fragments: &mut [MultiDiGraph<LabeledVertex>],
        bridge_count: usize,
    ) -> Result<usize, ScalerError> {
        let size = self.comm.size();
        let me = self.comm.rank();
        if size < 2 {
            return Ok(0);
        }
        let mut pool: Vec<LabeledVertex> = fragments
            .iter()
            .flat_map(|f| f.nodes().iter().copied())
            .collect();
        pool.shuffle(&mut self.rng);

        let received: Vec<(usize, Vec<LabeledVertex>)> = match self.cfg.topology {
            StitchTopology::AllToAll => {
                let outgoing = (0..size)
                    .map(|p| {
                        let heads = if p == me {
                            Vec::new()
                        } else {
                            choices(&pool, bridge_count, &mut self.rng)
                        };
                        encode(&heads.into_iter().map(WireLabel::of).collect::<Vec<_>>())
                    })
                    .collect();
                let incoming = self.comm.all_to_all(CommTag::STITCHING, outgoing)?;
                let mut received = Vec::with_capacity(size - 1);
                for (rank, bytes) in incoming.iter().enumerate() {
                    if rank != me {
                        received.push((rank, decode_labels(rank, bytes)?));
                    }
                }
                received
            }
            StitchTopology::Ring => {
                let dest = (me + size - 1) % size;
                let source = (me + 1) % size;
                let heads = choices(&pool, bridge_count, &mut self.rng);
                let payload = encode(&heads.into_iter().map(WireLabel::of).collect::<Vec<_>>());
                let bytes = self.comm.sendrecv(dest, source, CommTag::STITCHING, &payload)?;
                vec![(source, decode_labels(source, &bytes)?)]
            }
        };

        let Some(first) = fragments.first_mut() else {
            return Ok(0);
        };
        let mut added = 0;
        for (_, heads) in received {
            let tails = choices(&pool, bridge_count, &mut self.rng);
            let n = heads.len().min(tails.len());
            for (t, h) in tails.into_iter().zip(heads).take(n) {
                first.add_edge(t, h);
                added += 1;
            }
        }
        Ok(added)
    }
}

fn decode_labels(neighbor: usize, bytes: &[u8]) -> Result<Vec<LabeledVertex>, ScalerError> {
    Ok(decode::<WireLabel>(neighbor, bytes)?
        .iter()
        .map(WireLabel::get)
        .collect())
}
