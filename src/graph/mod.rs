//! Local graph abstraction: vertex ids, the directed multigraph used for
//! shards and fragments, and connectivity augmentation.

pub mod connect;
pub mod multigraph;
pub mod vertex;

pub use connect::{connect_components, weak_component_count};
pub use multigraph::{EdgeGraph, MultiDiGraph};
pub use vertex::{Edge, LabeledVertex, Vertex, VertexLike, fragment_prefix};
