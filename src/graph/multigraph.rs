//! Directed multigraph with insertion-ordered node and edge sets.
//!
//! Both the local graph built from an edge shard and every sample fragment
//! are [`MultiDiGraph`]s. Nodes and edges are stored in append-only vectors,
//! so positions are stable: the position of an edge in the local graph is its
//! edge id, and a node's position tells whether it was present before a given
//! point in time.

use crate::debug_invariants::DebugInvariants;
use crate::graph::vertex::VertexLike;
use crate::scaler_error::ScalerError;
use hashbrown::HashMap;

/// The capability set the scaling protocol needs from a graph.
pub trait EdgeGraph {
    type Vertex: VertexLike;

    /// Insert one edge; parallel edges are kept.
    fn add_edge(&mut self, tail: Self::Vertex, head: Self::Vertex);
    /// True if at least one `tail → head` edge exists.
    fn has_edge(&self, tail: Self::Vertex, head: Self::Vertex) -> bool;
    /// True if `v` is an endpoint of some edge.
    fn has_node(&self, v: Self::Vertex) -> bool;
    /// Nodes in insertion order.
    fn nodes(&self) -> &[Self::Vertex];
    /// Edges in insertion order.
    fn edges(&self) -> &[(Self::Vertex, Self::Vertex)];

    fn node_count(&self) -> usize {
        self.nodes().len()
    }

    fn edge_count(&self) -> usize {
        self.edges().len()
    }

    fn add_edges_from<I>(&mut self, edges: I)
    where
        I: IntoIterator<Item = (Self::Vertex, Self::Vertex)>,
        Self: Sized,
    {
        for (tail, head) in edges {
            self.add_edge(tail, head);
        }
    }
}

/// In-memory directed multigraph.
#[derive(Clone, Debug)]
pub struct MultiDiGraph<V: VertexLike> {
    nodes: Vec<V>,
    node_index: HashMap<V, usize>,
    edges: Vec<(V, V)>,
    multiplicity: HashMap<(V, V), usize>,
}

impl<V: VertexLike> Default for MultiDiGraph<V> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            node_index: HashMap::new(),
            edges: Vec::new(),
            multiplicity: HashMap::new(),
        }
    }
}

impl<V: VertexLike> MultiDiGraph<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(nodes: usize, edges: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(nodes),
            node_index: HashMap::with_capacity(nodes),
            edges: Vec::with_capacity(edges),
            multiplicity: HashMap::with_capacity(edges),
        }
    }

    /// Build a graph from an edge list, preserving edge order.
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (V, V)>,
    {
        let iter = edges.into_iter();
        let (lo, _) = iter.size_hint();
        let mut g = Self::with_capacity(lo, lo);
        g.add_edges_from(iter);
        g
    }

    /// Insertion position of `v`, if present.
    pub fn node_position(&self, v: V) -> Option<usize> {
        self.node_index.get(&v).copied()
    }

    /// Number of parallel `tail → head` edges.
    pub fn multiplicity(&self, tail: V, head: V) -> usize {
        self.multiplicity.get(&(tail, head)).copied().unwrap_or(0)
    }

    /// Edge at position `id`.
    pub fn edge(&self, id: usize) -> Option<(V, V)> {
        self.edges.get(id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Map every vertex through `f`, keeping edge order.
    pub fn map_vertices<W, F>(&self, mut f: F) -> MultiDiGraph<W>
    where
        W: VertexLike,
        F: FnMut(V) -> W,
    {
        MultiDiGraph::from_edges(self.edges.iter().map(|&(t, h)| (f(t), f(h))))
    }

    fn ensure_node(&mut self, v: V) {
        if !self.node_index.contains_key(&v) {
            self.node_index.insert(v, self.nodes.len());
            self.nodes.push(v);
        }
    }
}

impl<V: VertexLike> EdgeGraph for MultiDiGraph<V> {
    type Vertex = V;

    fn add_edge(&mut self, tail: V, head: V) {
        self.ensure_node(tail);
        self.ensure_node(head);
        self.edges.push((tail, head));
        *self.multiplicity.entry((tail, head)).or_insert(0) += 1;
    }

    fn has_edge(&self, tail: V, head: V) -> bool {
        self.multiplicity.contains_key(&(tail, head))
    }

    fn has_node(&self, v: V) -> bool {
        self.node_index.contains_key(&v)
    }

    fn nodes(&self) -> &[V] {
        &self.nodes
    }

    fn edges(&self) -> &[(V, V)] {
        &self.edges
    }
}

impl<V: VertexLike> DebugInvariants for MultiDiGraph<V> {
    fn validate_invariants(&self) -> Result<(), ScalerError> {
        let broken = |what: String| ScalerError::InvalidConfig(format!("multigraph: {what}"));
        if self.nodes.len() != self.node_index.len() {
            return Err(broken(format!(
                "{} nodes but {} index entries",
                self.nodes.len(),
                self.node_index.len()
            )));
        }
        for (pos, v) in self.nodes.iter().enumerate() {
            if self.node_index.get(v) != Some(&pos) {
                return Err(broken(format!("node {v:?} indexed at wrong position")));
            }
        }
        for &(t, h) in &self.edges {
            if !self.has_node(t) || !self.has_node(h) {
                return Err(broken(format!("edge ({t:?}, {h:?}) has a missing endpoint")));
            }
        }
        let total: usize = self.multiplicity.values().sum();
        if total != self.edges.len() {
            return Err(broken(format!(
                "multiplicities sum to {total}, expected {}",
                self.edges.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::vertex::Vertex;

    #[test]
    fn parallel_edges_are_kept() {
        let mut g = MultiDiGraph::<Vertex>::new();
        g.add_edge(1, 2);
        g.add_edge(1, 2);
        g.add_edge(2, 1);
        assert_eq!(g.edge_count(), 3);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.multiplicity(1, 2), 2);
        assert!(g.has_edge(2, 1));
        assert!(!g.has_edge(2, 2));
        g.validate_invariants().unwrap();
    }

    #[test]
    fn node_positions_follow_first_appearance() {
        let g = MultiDiGraph::<Vertex>::from_edges([(5, 3), (3, 9), (9, 5)]);
        assert_eq!(g.nodes(), &[5, 3, 9]);
        assert_eq!(g.node_position(9), Some(2));
        assert_eq!(g.node_position(4), None);
        assert_eq!(g.edge(1), Some((3, 9)));
    }

    #[test]
    fn map_vertices_keeps_shape() {
        let g = MultiDiGraph::<Vertex>::from_edges([(0, 1), (0, 1), (1, 2)]);
        let shifted = g.map_vertices(|v| v + 10);
        assert_eq!(shifted.edges(), &[(10, 11), (10, 11), (11, 12)]);
        assert_eq!(shifted.node_count(), 3);
    }
}
