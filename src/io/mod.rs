//! Thin edge-list I/O used at the boundary of the scaling pipeline.

pub mod edge_list;

pub use edge_list::{
    EdgeListHeader, EdgeListReader, create_output, fragment_file_name, open_input, write_edges,
};
