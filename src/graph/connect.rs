//! Connectivity augmentation for sample fragments.
//!
//! A fragment produced by edge sampling is usually split into several weakly
//! connected components. [`connect_components`] adds the minimum number of
//! edges (one per extra component) that makes the fragment weakly connected.

use crate::graph::multigraph::{EdgeGraph, MultiDiGraph};
use crate::graph::vertex::VertexLike;
use std::cmp::Ordering;

/// Disjoint-set forest over node positions, union by rank.
struct DisjointSets {
    roots: Vec<usize>,
    ranks: Vec<u8>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            roots: (0..n).collect(),
            ranks: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        let mut root = x;
        while root != self.roots[root] {
            root = self.roots[root];
        }
        // path compression
        while x != root {
            let next = self.roots[x];
            self.roots[x] = root;
            x = next;
        }
        root
    }

    fn union(&mut self, x: usize, y: usize) {
        let x = self.find(x);
        let y = self.find(y);
        if x == y {
            return;
        }
        match self.ranks[x].cmp(&self.ranks[y]) {
            Ordering::Less => self.roots[x] = y,
            Ordering::Greater => self.roots[y] = x,
            Ordering::Equal => {
                self.roots[y] = x;
                self.ranks[x] = self.ranks[x].saturating_add(1);
            }
        }
    }
}

/// First node (in insertion order) of every weakly connected component.
pub fn component_representatives<V: VertexLike>(graph: &MultiDiGraph<V>) -> Vec<V> {
    let nodes = graph.nodes();
    let mut sets = DisjointSets::new(nodes.len());
    for &(t, h) in graph.edges() {
        if let (Some(a), Some(b)) = (graph.node_position(t), graph.node_position(h)) {
            sets.union(a, b);
        }
    }
    let mut seen = vec![false; nodes.len()];
    let mut reps = Vec::new();
    for (pos, &v) in nodes.iter().enumerate() {
        let root = sets.find(pos);
        if !seen[root] {
            seen[root] = true;
            reps.push(v);
        }
    }
    reps
}

/// Number of weakly connected components.
pub fn weak_component_count<V: VertexLike>(graph: &MultiDiGraph<V>) -> usize {
    component_representatives(graph).len()
}

/// Chain consecutive component representatives with one edge each.
///
/// Returns the number of edges added.
pub fn connect_components<V: VertexLike>(graph: &mut MultiDiGraph<V>) -> usize {
    let reps = component_representatives(graph);
    for pair in reps.windows(2) {
        graph.add_edge(pair[0], pair[1]);
    }
    reps.len().saturating_sub(1)
}
