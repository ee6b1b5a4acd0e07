//! ScalerError: unified error type for dgraph-scaler public APIs
//!
//! Every fallible stage of the scaling protocol (distribution, sampling,
//! stitching, merging and the communicator backends) reports through this
//! enum, so a failure on one process can be surfaced to the whole pool.

use thiserror::Error;

/// Low-level failure reported by a communicator backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CommError(pub String);

/// Unified error type for dgraph-scaler operations.
#[derive(Debug, Error)]
pub enum ScalerError {
    /// Stitching topology name was not recognised.
    #[error("Invalid stitching topology `{0}` (expected `all-to-all` or `ring`)")]
    InvalidTopology(String),
    /// Output mode name was not recognised.
    #[error("Invalid merge mode `{0}` (expected `centralized` or `parallel`)")]
    InvalidMergeMode(String),
    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// One of the two header lines of the input is missing or not an integer.
    #[error("Malformed header on line {line}: `{value}` is not a non-negative integer")]
    MalformedHeader { line: usize, value: String },
    /// An edge line does not hold two vertex ids.
    #[error("Malformed edge on line {line}: `{value}`")]
    MalformedEdge { line: usize, value: String },
    /// The input ended before the declared number of edges was read.
    #[error("Input ended after {read} of {expected} declared edges")]
    TruncatedInput { read: u64, expected: u64 },
    /// A relabeled vertex string could not be parsed back.
    #[error("Invalid vertex label `{0}`")]
    InvalidLabel(String),
    /// An outbound message exceeds the per-peer queue bound.
    #[error("Message of {needed} bytes to rank {peer} exceeds the outbound bound of {capacity} bytes")]
    BufferTooSmall {
        peer: usize,
        needed: usize,
        capacity: usize,
    },
    /// A peer rank is outside of the pool.
    #[error("Rank {rank} is out of range for a pool of size {size}")]
    InvalidRank { rank: usize, size: usize },
    /// A collective received a payload list of the wrong shape.
    #[error("Collective expected {expected} payloads, got {got}")]
    ShapeMismatch { expected: usize, got: usize },
    /// Point-to-point communication with a neighbor failed.
    #[error("Communication error with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: CommError,
    },
    /// A received message does not decode to the expected records.
    #[error("Wire format error in message from rank {neighbor}: {reason}")]
    WireFormat { neighbor: usize, reason: String },
    /// Another process reported a fatal failure through the protocol.
    #[error("Rank {rank} reported a failure during {phase}")]
    PeerFailed { rank: usize, phase: &'static str },
    /// The pool was aborted by one of its members.
    #[error("Process pool aborted: {0}")]
    PoolAborted(String),
    /// Reading the input or writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScalerError {
    /// Shorthand for a [`ScalerError::CommError`] with a message.
    pub fn comm(neighbor: usize, msg: impl Into<String>) -> Self {
        ScalerError::CommError {
            neighbor,
            source: CommError(msg.into()),
        }
    }

    /// True for the errors that must stop the run before any round executes.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ScalerError::InvalidTopology(_)
                | ScalerError::InvalidMergeMode(_)
                | ScalerError::InvalidConfig(_)
                | ScalerError::MalformedHeader { .. }
                | ScalerError::BufferTooSmall { .. }
        )
    }
}
