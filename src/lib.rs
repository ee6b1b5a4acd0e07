#![cfg_attr(docsrs, feature(doc_cfg))]
//! # dgraph-scaler
//!
//! dgraph-scaler grows (or shrinks) a directed graph by a target factor while
//! approximately preserving its structure. A pool of cooperating processes
//! each holds one shard of the input, samples fragments of it in repeated
//! rounds, completes every fragment by inducing edges across shard
//! boundaries, and connects the fragments with bridge edges.
//!
//! ## Features
//! - Coverage-complete vertex ownership map built from per-shard extents
//! - Lockstep sampling rounds with precision-driven termination and
//!   explicit shortfall reporting
//! - All-to-all and ring stitching, locally and across processes
//! - Pluggable communication backends: serial, in-process thread pool, and
//!   MPI (`mpi-support` feature)
//!
//! ## Determinism
//!
//! All randomized decisions use `SmallRng` generators seeded from
//! [`ScaleConfig::seed`](crate::algs::scale::ScaleConfig::seed) mixed with the
//! rank, so a run with the same input, pool size and configuration is
//! reproducible. Unit tests fix seeds explicitly.
//!
//! ## Usage
//!
//! ```no_run
//! use dgraph_scaler::prelude::*;
//! use std::path::Path;
//!
//! let input = open_input(Path::new("graph.edges"))?;
//! let cfg = ScaleConfig::new(2.0);
//! let report = scale(&NoComm, Some(input), Path::new("scaled.edges"), &cfg)?;
//! assert!(report.merge.edges_written > 0);
//! # Ok::<(), dgraph_scaler::scaler_error::ScalerError>(())
//! ```

pub mod algs;
pub mod debug_invariants;
pub mod graph;
pub mod io;
pub mod partitioning;
pub mod scaler_error;

pub use debug_invariants::DebugInvariants;
pub use scaler_error::ScalerError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{CommConfig, CommTag, Communicator, NoComm, ThreadComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::distribute::{EdgeShard, distribute_edges};
    pub use crate::algs::merge::{MergeMode, MergeReport, merge_fragments, relabel_fragments};
    pub use crate::algs::sample::{
        PrecisionShortfall, RoundReport, Sample, Sampler, SamplerConfig, ShortfallReason,
    };
    pub use crate::algs::scale::{ScaleConfig, ScaleReport, scale};
    pub use crate::algs::stitch::{BridgeSpec, StitchConfig, StitchReport, StitchTopology, Stitcher};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::graph::{
        EdgeGraph, LabeledVertex, MultiDiGraph, Vertex, connect_components, fragment_prefix,
    };
    pub use crate::io::{EdgeListReader, open_input, write_edges};
    pub use crate::partitioning::{PartitionMap, VertexExtent, VertexRange};
    pub use crate::scaler_error::ScalerError;
}
