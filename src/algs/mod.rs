//! Distributed scaling protocol: messaging, distribution, sampling,
//! stitching and output.

pub mod communicator;
pub mod distribute;
pub mod merge;
pub mod sample;
pub mod scale;
pub mod stitch;
pub mod wire;

pub use distribute::distribute_edges;
pub use merge::{merge_fragments, relabel_fragments};
pub use sample::Sampler;
pub use scale::scale;
pub use stitch::Stitcher;
