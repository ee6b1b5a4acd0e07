//! End-to-end scaling run: distribute → sample rounds → connect → relabel →
//! stitch → merge.

use crate::algs::communicator::{CommConfig, Communicator};
use crate::algs::distribute::distribute_edges;
use crate::algs::merge::{MergeMode, MergeReport, merge_fragments, relabel_fragments};
use crate::algs::sample::{RoundReport, SamplerConfig, Sampler};
use crate::algs::stitch::{BridgeSpec, StitchConfig, StitchReport, StitchTopology, Stitcher};
use crate::graph::connect::connect_components;
use crate::scaler_error::ScalerError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::Path;
use std::time::{Duration, Instant};

const RANK_SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;
const STITCH_SEED_SALT: u64 = 0x5851_F42D_4C95_7F2D;

/// Upper bound on sampling rounds per run, remainder round included.
pub const MAX_ROUNDS: usize = 1 << 20;

/// Every parameter of a run. All ranks must use the same configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    /// Target size multiplier, `> 0`.
    pub scale_factor: f64,
    /// Per-round sampling factor; capped at `scale_factor`.
    pub factor_size: f64,
    pub bridges: BridgeSpec,
    /// Fraction of each round target that must be reached, in `(0, 1]`.
    pub precision: f64,
    /// Make every fragment weakly connected before stitching.
    pub connect: bool,
    pub topology: StitchTopology,
    pub merge_mode: MergeMode,
    /// Log phase timings at `info` on the coordinator.
    pub verbose: bool,
    pub seed: u64,
    pub max_iterations: usize,
    pub max_stalled_draws: usize,
    pub max_message_bytes: usize,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        let sampler = SamplerConfig::default();
        Self {
            scale_factor: 1.0,
            factor_size: 0.5,
            bridges: BridgeSpec::default(),
            precision: sampler.precision,
            connect: false,
            topology: StitchTopology::default(),
            merge_mode: MergeMode::default(),
            verbose: false,
            seed: sampler.seed,
            max_iterations: sampler.max_iterations,
            max_stalled_draws: sampler.max_stalled_draws,
            max_message_bytes: CommConfig::default().max_message_bytes,
        }
    }
}

impl ScaleConfig {
    pub fn new(scale_factor: f64) -> Self {
        Self {
            scale_factor,
            ..Self::default()
        }
    }

    /// Reject out-of-range values before any communication happens.
    pub fn validate(&self) -> Result<(), ScalerError> {
        self.validate_for_pool(1)
    }

    /// [`validate`](Self::validate) for a pool of `pool_size` ranks: the
    /// fragments of every rank must also fit the `u32` fragment numbering.
    pub fn validate_for_pool(&self, pool_size: usize) -> Result<(), ScalerError> {
        let bad = |msg: String| Err(ScalerError::InvalidConfig(msg));
        if !(self.scale_factor.is_finite() && self.scale_factor > 0.0) {
            return bad(format!("scale factor must be > 0, got {}", self.scale_factor));
        }
        if !(self.factor_size.is_finite() && self.factor_size > 0.0) {
            return bad(format!("factor size must be > 0, got {}", self.factor_size));
        }
        if !(self.precision > 0.0 && self.precision <= 1.0) {
            return bad(format!("precision must be in (0, 1], got {}", self.precision));
        }
        if let BridgeSpec::Fraction(f) = self.bridges {
            if !(f.is_finite() && f >= 0.0) {
                return bad(format!("bridge fraction must be >= 0, got {f}"));
            }
        }
        if self.max_iterations == 0 || self.max_stalled_draws == 0 {
            return bad("iteration and stall limits must be at least 1".into());
        }
        if self.max_message_bytes == 0 {
            return bad("max message size must be at least 1 byte".into());
        }
        let rounds = (self.scale_factor / self.factor_size.min(self.scale_factor)).floor() + 1.0;
        let cap = (f64::from(u32::MAX) / pool_size.max(1) as f64).min(MAX_ROUNDS as f64);
        if rounds > cap {
            return bad(format!(
                "scale factor {} in rounds of {} needs up to {rounds} rounds, at most {} allowed on {pool_size} rank(s)",
                self.scale_factor,
                self.factor_size,
                cap.floor()
            ));
        }
        Ok(())
    }

    fn rank_seed(&self, rank: usize) -> u64 {
        self.seed ^ (rank as u64).wrapping_mul(RANK_SEED_MIX)
    }

    /// Sampler settings for `rank`, with a rank-specific seed.
    pub fn sampler_config(&self, rank: usize) -> SamplerConfig {
        SamplerConfig {
            precision: self.precision,
            max_iterations: self.max_iterations,
            max_stalled_draws: self.max_stalled_draws,
            seed: self.rank_seed(rank),
        }
    }

    pub fn stitch_config(&self) -> StitchConfig {
        StitchConfig {
            bridges: self.bridges,
            topology: self.topology,
        }
    }

    pub fn stitch_seed(&self, rank: usize) -> u64 {
        self.rank_seed(rank) ^ STITCH_SEED_SALT
    }

    pub fn comm_config(&self) -> CommConfig {
        CommConfig {
            max_message_bytes: self.max_message_bytes,
        }
    }

    pub fn round_factors(&self) -> Vec<f64> {
        round_factors(self.scale_factor, self.factor_size)
    }
}

/// Split `scale_factor` into sampling rounds of `factor_size`, plus a
/// remainder round. The remainder is measured against the round total rounded
/// to two decimals, and dropped when it vanishes.
///
/// Expects a configuration accepted by [`ScaleConfig::validate`], which
/// bounds the round count by [`MAX_ROUNDS`].
pub fn round_factors(scale_factor: f64, factor_size: f64) -> Vec<f64> {
    let size = factor_size.min(scale_factor);
    let full = (scale_factor / size).floor() as usize;
    let mut factors = vec![size; full];
    let covered = (size * full as f64 * 100.0).round() / 100.0;
    let remainder = scale_factor - covered;
    if remainder > 1e-9 {
        factors.push(remainder);
    }
    factors
}

/// Wall-clock time of each phase on this rank.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub loading: Duration,
    pub sampling: Vec<Duration>,
    pub connecting: Option<Duration>,
    pub relabeling: Duration,
    pub stitching: Duration,
    pub merging: Duration,
    pub total: Duration,
}

/// What one rank did during a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScaleReport {
    pub rank: usize,
    pub size: usize,
    pub total_vertices: u64,
    pub total_edges: u64,
    pub rounds: Vec<RoundReport>,
    /// Edges added by connectivity augmentation.
    pub connect_edges: usize,
    pub stitch: StitchReport,
    pub merge: MergeReport,
    pub timings: PhaseTimings,
}

impl ScaleReport {
    /// True when every round reached its precision threshold.
    pub fn is_complete(&self) -> bool {
        self.rounds.iter().all(RoundReport::is_complete)
    }
}

struct PhaseLog {
    rank: usize,
    verbose: bool,
}

impl PhaseLog {
    fn record(&self, phase: &str, elapsed: Duration) -> Duration {
        if self.verbose && self.rank == 0 {
            log::info!("{phase} time: {:.3}s", elapsed.as_secs_f64());
        } else {
            log::debug!("rank {}: {phase} time: {:.3}s", self.rank, elapsed.as_secs_f64());
        }
        elapsed
    }
}

/// Scale the graph read from `input` (coordinator only) into `output`.
///
/// Collective over `comm`: every rank calls it with the same configuration.
pub fn scale<C, R>(
    comm: &C,
    input: Option<R>,
    output: &Path,
    cfg: &ScaleConfig,
) -> Result<ScaleReport, ScalerError>
where
    C: Communicator + ?Sized,
    R: BufRead,
{
    let rank = comm.rank();
    if let Err(e) = cfg.validate_for_pool(comm.size()) {
        if rank == 0 {
            log::error!("invalid configuration: {e}");
        }
        return Err(e);
    }
    let phases = PhaseLog {
        rank,
        verbose: cfg.verbose,
    };
    let mut timings = PhaseTimings::default();
    let started = Instant::now();

    let t = Instant::now();
    let shard = distribute_edges(input, comm)?;
    let graph = shard.local_graph();
    let partition_map = shard.partition_map;
    timings.loading = phases.record("Loading", t.elapsed());

    let factors = cfg.round_factors();
    let mut sampler = Sampler::new(comm, &graph, &partition_map, cfg.sampler_config(rank))?;
    let mut rounds = Vec::with_capacity(factors.len());
    let mut fragments = Vec::with_capacity(factors.len());
    for (i, factor) in factors.iter().enumerate() {
        let t = Instant::now();
        let target = (shard.total_vertices as f64 * factor).floor() as u64;
        let sample = sampler.sample(target)?;
        if let Some(s) = &sample.report.shortfall {
            if rank == 0 {
                log::warn!(
                    "round {}/{}: reached {} of {} required vertices ({:?})",
                    i + 1,
                    factors.len(),
                    s.reached,
                    s.required,
                    s.reason
                );
            }
        }
        rounds.push(sample.report);
        fragments.push(sample.fragment);
        timings
            .sampling
            .push(phases.record(&format!("Sampling {}/{}", i + 1, factors.len()), t.elapsed()));
    }

    let mut connect_edges = 0;
    if cfg.connect {
        let t = Instant::now();
        connect_edges = fragments.iter_mut().map(connect_components).sum();
        timings.connecting = Some(phases.record("Connecting", t.elapsed()));
    }

    let t = Instant::now();
    let mut labeled = relabel_fragments(comm, &fragments)?;
    drop(fragments);
    timings.relabeling = phases.record("Relabeling", t.elapsed());

    let t = Instant::now();
    let stitch = Stitcher::new(comm, cfg.stitch_config(), cfg.stitch_seed(rank)).stitch(&mut labeled)?;
    timings.stitching = phases.record("Stitching", t.elapsed());

    let t = Instant::now();
    let merge = merge_fragments(comm, &labeled, output, cfg.merge_mode)?;
    timings.merging = phases.record("Dumping", t.elapsed());

    timings.total = phases.record("Total", started.elapsed());
    if rank == 0 {
        log::debug!(
            "round targets: [{}]",
            rounds.iter().map(|r| format!("{}/{}", r.reached, r.target)).join(", ")
        );
    }

    Ok(ScaleReport {
        rank,
        size: comm.size(),
        total_vertices: shard.total_vertices,
        total_edges: shard.total_edges,
        rounds,
        connect_edges,
        stitch,
        merge,
        timings,
    })
}
