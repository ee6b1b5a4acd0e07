//! Distributed sampling rounds.
//!
//! One call to [`Sampler::sample`] produces one fragment on every rank of the
//! pool. A round runs in lockstep phases:
//!
//! 1. **draw**: random local edges (with replacement) until this rank has
//!    added its share of the remaining target as new vertices,
//! 2. **ownership**: each new vertex is routed to its owner in the
//!    [`PartitionMap`],
//! 3. **flooding**: pending ownerships are exchanged all-to-all and the owned
//!    counts are summed; steps 1–3 repeat until the global count reaches
//!    `precision × target`,
//! 4. **induction**: local edges whose tail is already in the fragment are
//!    added when the owner of their head confirms the head is owned.
//!
//! Every loop decision depends only on values that all ranks share after a
//! collective, so all ranks leave the loop in the same iteration.

use crate::algs::communicator::{CommTag, Communicator, abort_on_error};
use crate::algs::wire::{WireCount, WireQuery, WireVertex, decode, decode_one, encode};
use crate::graph::multigraph::{EdgeGraph, MultiDiGraph};
use crate::graph::vertex::{Edge, Vertex};
use crate::partitioning::PartitionMap;
use crate::scaler_error::ScalerError;
use hashbrown::HashSet;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Knobs of the sampling loop.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Fraction of the round target that must be reached, in `(0, 1]`.
    pub precision: f64,
    /// Draw/ownership/flooding iterations per round before giving up.
    pub max_iterations: usize,
    /// Consecutive draw batches without a new vertex before a rank stops drawing.
    pub max_stalled_draws: usize,
    /// Seed of this rank's generator.
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            precision: 0.95,
            max_iterations: 64,
            max_stalled_draws: 64,
            seed: 42,
        }
    }
}

/// Why a round ended below its precision threshold.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShortfallReason {
    /// An iteration drew no new vertex anywhere in the pool.
    Stalled,
    /// `max_iterations` ran out.
    IterationLimit,
}

/// A round that could not reach `precision × target`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecisionShortfall {
    pub target: u64,
    pub required: u64,
    pub reached: u64,
    pub reason: ShortfallReason,
}

/// Outcome of one round, identical on every rank except for the local counters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundReport {
    pub target: u64,
    /// Global owned-vertex count when the loop ended.
    pub reached: u64,
    pub iterations: usize,
    /// Local fragment edges before induction.
    pub sampled_edges: usize,
    /// Edges induced against this rank's own ownership set.
    pub induced_local: usize,
    /// Edges induced on confirmation from another rank.
    pub induced_remote: usize,
    pub shortfall: Option<PrecisionShortfall>,
}

impl RoundReport {
    pub fn is_complete(&self) -> bool {
        self.shortfall.is_none()
    }
}

/// A finished round on one rank.
#[derive(Clone, Debug)]
pub struct Sample {
    pub fragment: MultiDiGraph<Vertex>,
    /// Vertices this rank owned in the round.
    pub ownership: HashSet<Vertex>,
    pub report: RoundReport,
}

/// A fragment under construction: the graph plus which local edges it holds.
#[derive(Clone, Debug)]
pub struct Fragment {
    graph: MultiDiGraph<Vertex>,
    included: Vec<bool>,
}

impl Fragment {
    /// Empty fragment over a local graph of `local_edges` edges.
    pub fn new(local_edges: usize) -> Self {
        Self {
            graph: MultiDiGraph::new(),
            included: vec![false; local_edges],
        }
    }

    /// Add local edge `id`; false if it is already part of the fragment.
    pub fn insert(&mut self, id: usize, (tail, head): Edge) -> bool {
        match self.included.get_mut(id) {
            Some(slot) if !*slot => {
                *slot = true;
                self.graph.add_edge(tail, head);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, id: usize) -> bool {
        self.included.get(id).copied().unwrap_or(false)
    }

    pub fn graph(&self) -> &MultiDiGraph<Vertex> {
        &self.graph
    }

    /// True once every local edge has been included.
    pub fn is_saturated(&self) -> bool {
        self.graph.edge_count() == self.included.len()
    }

    pub fn into_graph(self) -> MultiDiGraph<Vertex> {
        self.graph
    }
}

/// Pool-wide totals after one flooding phase.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolCounts {
    /// Distinct vertices owned in the round so far.
    pub owned: u64,
    /// Vertices newly drawn in this iteration, before deduplication.
    pub drawn: u64,
}

/// Edges added by one induction phase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Induction {
    pub local: usize,
    pub remote: usize,
}

/// Draw random local edges into `fragment` until `wanted` new vertices were
/// added, every edge is in, or `max_stalled` consecutive batches added none.
///
/// `wanted` is capped at the local vertices still missing from the fragment.
/// Batches hold `ceil(remaining / 2)` draws. Returns the new vertices in
/// insertion order.
pub fn local_edge_sampling<R: Rng>(
    graph: &MultiDiGraph<Vertex>,
    fragment: &mut Fragment,
    wanted: usize,
    max_stalled: usize,
    rng: &mut R,
) -> Vec<Vertex> {
    let before = fragment.graph.node_count();
    let wanted = wanted.min(graph.node_count().saturating_sub(before));
    let edges = graph.edges();
    let mut stalled = 0;
    while !edges.is_empty() && !fragment.is_saturated() && stalled < max_stalled {
        let gained = fragment.graph.node_count() - before;
        if gained >= wanted {
            break;
        }
        let batch = (wanted - gained).div_ceil(2);
        for _ in 0..batch {
            let id = rng.gen_range(0..edges.len());
            fragment.insert(id, edges[id]);
        }
        if fragment.graph.node_count() - before == gained {
            stalled += 1;
        } else {
            stalled = 0;
        }
    }
    fragment.graph.nodes()[before..].to_vec()
}

/// Per-rank sampling state that survives across rounds.
pub struct Sampler<'a, C: Communicator + ?Sized> {
    comm: &'a C,
    graph: &'a MultiDiGraph<Vertex>,
    partition_map: &'a PartitionMap,
    weight: f64,
    rng: SmallRng,
    cfg: SamplerConfig,
}

impl<'a, C: Communicator + ?Sized> Sampler<'a, C> {
    /// Collective: every rank must construct its sampler together, since the
    /// local share is derived from an all-gather of local vertex counts.
    pub fn new(
        comm: &'a C,
        graph: &'a MultiDiGraph<Vertex>,
        partition_map: &'a PartitionMap,
        cfg: SamplerConfig,
    ) -> Result<Self, ScalerError> {
        if partition_map.len() != comm.size() {
            return Err(ScalerError::ShapeMismatch {
                expected: comm.size(),
                got: partition_map.len(),
            });
        }
        let local = graph.node_count() as u64;
        let counts = comm.all_gather(CommTag::VERTEX_COUNTS, &encode(&[WireCount::new(local)]))?;
        let mut total = 0u64;
        for (rank, bytes) in counts.iter().enumerate() {
            total += decode_one::<WireCount>(rank, bytes)?.get();
        }
        let weight = share_weight(local, total);
        log::debug!("rank {}: {local} of {total} vertices, share {weight}", comm.rank());
        Ok(Self {
            comm,
            graph,
            partition_map,
            weight,
            rng: SmallRng::seed_from_u64(cfg.seed),
            cfg,
        })
    }

    /// This rank's share of every remaining target.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Run one round aiming at `target` distinct vertices pool-wide.
    ///
    /// Collective. A shortfall is reported in the [`RoundReport`], not as an
    /// error; errors abort the pool.
    pub fn sample(&mut self, target: u64) -> Result<Sample, ScalerError> {
        let result = self.run_round(target);
        abort_on_error(self.comm, result)
    }

    fn run_round(&mut self, target: u64) -> Result<Sample, ScalerError> {
        let required = required_count(self.cfg.precision, target);
        let mut fragment = Fragment::new(self.graph.edge_count());
        let mut ownership = HashSet::new();
        let mut reached = 0u64;
        let mut iterations = 0;
        let mut shortfall_reason = None;

        while reached < required {
            if iterations == self.cfg.max_iterations {
                shortfall_reason = Some(ShortfallReason::IterationLimit);
                break;
            }
            iterations += 1;
            let remaining = target - reached.min(target);
            let wanted = (remaining as f64 * self.weight).ceil() as usize;
            let fresh = self.draw(&mut fragment, wanted);
            let pending = self.compute_ownership(&fresh);
            let counts = self.flood_ownership(pending, &mut ownership)?;
            log::trace!(
                "rank {}: iteration {iterations} drew {} new vertices, {} owned pool-wide",
                self.comm.rank(),
                fresh.len(),
                counts.owned
            );
            let grew = counts.owned > reached;
            reached = counts.owned;
            if !grew && counts.drawn == 0 {
                shortfall_reason = Some(ShortfallReason::Stalled);
                break;
            }
        }

        let sampled_edges = fragment.graph.edge_count();
        let induction = self.induce(&mut fragment, &ownership)?;
        self.comm.barrier()?;

        let shortfall = shortfall_reason
            .filter(|_| reached < required)
            .map(|reason| PrecisionShortfall {
                target,
                required,
                reached,
                reason,
            });
        Ok(Sample {
            fragment: fragment.into_graph(),
            ownership,
            report: RoundReport {
                target,
                reached,
                iterations,
                sampled_edges,
                induced_local: induction.local,
                induced_remote: induction.remote,
                shortfall,
            },
        })
    }

    /// Phase 1: local draws; returns the vertices new to the fragment.
    pub fn draw(&mut self, fragment: &mut Fragment, wanted: usize) -> Vec<Vertex> {
        local_edge_sampling(
            self.graph,
            fragment,
            wanted,
            self.cfg.max_stalled_draws,
            &mut self.rng,
        )
    }

    /// Phase 2: route every new vertex to its owner.
    pub fn compute_ownership(&self, fresh: &[Vertex]) -> Vec<Vec<Vertex>> {
        let mut pending = vec![Vec::new(); self.comm.size()];
        for &v in fresh {
            for owner in self.partition_map.owners_of(v) {
                pending[owner].push(v);
            }
        }
        pending
    }

    /// Phase 3: exchange pending ownerships, merge what this rank owns and
    /// sum the owned and freshly drawn counts over the pool.
    pub fn flood_ownership(
        &self,
        pending: Vec<Vec<Vertex>>,
        ownership: &mut HashSet<Vertex>,
    ) -> Result<PoolCounts, ScalerError> {
        let drawn: usize = pending.iter().map(Vec::len).sum();
        let outgoing = pending
            .iter()
            .map(|vs| encode(&vs.iter().copied().map(WireVertex::of).collect::<Vec<_>>()))
            .collect();
        let received = self.comm.all_to_all(CommTag::OWNERSHIPS, outgoing)?;
        for (rank, bytes) in received.iter().enumerate() {
            ownership.extend(decode::<WireVertex>(rank, bytes)?.iter().map(WireVertex::get));
        }

        let local = encode(&[
            WireCount::new(ownership.len() as u64),
            WireCount::new(drawn as u64),
        ]);
        let gathered = self.comm.all_gather(CommTag::OWNED_COUNTS, &local)?;
        let mut counts = PoolCounts::default();
        for (rank, bytes) in gathered.iter().enumerate() {
            match decode::<WireCount>(rank, bytes)?.as_slice() {
                [owned, drawn] => {
                    counts.owned += owned.get();
                    counts.drawn += drawn.get();
                }
                other => {
                    return Err(ScalerError::WireFormat {
                        neighbor: rank,
                        reason: format!("expected 2 counts, got {}", other.len()),
                    });
                }
            }
        }
        Ok(counts)
    }

    /// Phase 4: add every local edge whose tail was in the fragment when
    /// induction started and whose head is owned, asking the head's owner.
    pub fn induce(
        &mut self,
        fragment: &mut Fragment,
        ownership: &HashSet<Vertex>,
    ) -> Result<Induction, ScalerError> {
        let graph = self.graph;
        let me = self.comm.rank();
        let size = self.comm.size();
        let nodes_before = fragment.graph.node_count();
        let mut queries: Vec<Vec<WireQuery>> = vec![Vec::new(); size];
        let mut induced = Induction::default();

        for (id, &(tail, head)) in graph.edges().iter().enumerate() {
            if fragment.contains(id) {
                continue;
            }
            let tail_sampled = fragment
                .graph
                .node_position(tail)
                .is_some_and(|pos| pos < nodes_before);
            if !tail_sampled {
                continue;
            }
            let owners = self.partition_map.owners_of(head);
            let Some(&owner) = owners.choose(&mut self.rng) else {
                continue;
            };
            if owner == me {
                if ownership.contains(&head) && fragment.insert(id, (tail, head)) {
                    induced.local += 1;
                }
            } else {
                queries[owner].push(WireQuery::new(id, head));
            }
        }

        let outgoing = queries.iter().map(|q| encode(q)).collect();
        let asked = self.comm.all_to_all(CommTag::EDGE_QUERY, outgoing)?;
        let mut answers = Vec::with_capacity(size);
        for (rank, bytes) in asked.iter().enumerate() {
            let confirmed: Vec<WireQuery> = decode::<WireQuery>(rank, bytes)?
                .into_iter()
                .filter(|q| ownership.contains(&q.head()))
                .collect();
            answers.push(encode(&confirmed));
        }

        let replies = self.comm.all_to_all(CommTag::EDGE_RESPONSE, answers)?;
        for (rank, bytes) in replies.iter().enumerate() {
            for q in decode::<WireQuery>(rank, bytes)? {
                let id = q.edge_id();
                let edge = graph
                    .edge(id)
                    .filter(|&(_, head)| head == q.head())
                    .ok_or_else(|| ScalerError::WireFormat {
                        neighbor: rank,
                        reason: format!("confirmation for unknown edge {id}"),
                    })?;
                if fragment.insert(id, edge) {
                    induced.remote += 1;
                }
            }
        }
        Ok(induced)
    }
}

/// Local share of a pool-wide target, rounded up to hundredths.
pub fn share_weight(local: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (local as f64 / total as f64 * 100.0).ceil() / 100.0
}

/// Smallest global count that satisfies `precision × target`.
pub fn required_count(precision: f64, target: u64) -> u64 {
    let exact = precision * target as f64;
    // Absorb representation error such as 0.95 * 100 = 94.99999999999999.
    (exact - 1e-9).ceil().max(0.0) as u64
}
