//! Vertex-range ownership map shared by every process of the pool.
//!
//! Each process reports the `(min, max)` vertex id found in its edge shard.
//! [`PartitionMap::from_extents`] turns those raw, possibly gapped or
//! overlapping extents into contiguous half-open ranges that cover the whole
//! id space `[0, ∞)`: every vertex id, including ids never seen in the input,
//! has exactly one owner. Every process runs the same construction on the same
//! extents, so all replicas agree without further communication.

use crate::debug_invariants::DebugInvariants;
use crate::graph::vertex::{Edge, Vertex};
use crate::scaler_error::ScalerError;
use serde::{Deserialize, Serialize};

/// Raw `(min, max)` vertex id observed in one shard, both inclusive.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexExtent {
    pub min: Vertex,
    pub max: Vertex,
}

impl VertexExtent {
    pub fn new(min: Vertex, max: Vertex) -> Self {
        Self { min, max }
    }

    /// Extent of every endpoint in `edges`; `None` for an empty shard.
    pub fn of_edges(edges: &[Edge]) -> Option<Self> {
        edges.iter().fold(None, |acc, &(t, h)| {
            let (lo, hi) = (t.min(h), t.max(h));
            Some(match acc {
                None => Self::new(lo, hi),
                Some(e) => Self::new(e.min.min(lo), e.max.max(hi)),
            })
        })
    }
}

/// Half-open vertex range `[start, end)`; `end == None` is unbounded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexRange {
    start: Vertex,
    end: Option<Vertex>,
}

impl VertexRange {
    pub fn new(start: Vertex, end: Option<Vertex>) -> Self {
        Self { start, end }
    }

    /// Empty range anchored at `start`.
    pub fn empty(start: Vertex) -> Self {
        Self {
            start,
            end: Some(start),
        }
    }

    pub fn start(&self) -> Vertex {
        self.start
    }

    pub fn end(&self) -> Option<Vertex> {
        self.end
    }

    /// Inclusive upper bound; `None` when unbounded or empty.
    pub fn last(&self) -> Option<Vertex> {
        match self.end {
            Some(end) if end > self.start => Some(end - 1),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end.is_some_and(|end| end <= self.start)
    }

    pub fn is_unbounded(&self) -> bool {
        self.end.is_none()
    }

    pub fn contains(&self, v: Vertex) -> bool {
        v >= self.start && self.end.is_none_or(|end| v < end)
    }
}

/// Ownership table: `ranges[rank]` is the vertex range owned by `rank`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionMap {
    ranges: Vec<VertexRange>,
}

impl PartitionMap {
    /// Gap-fill one raw extent per process into a covering, single-owner map.
    ///
    /// Each entry starts where the previous one ended (the first at `0`), so
    /// gaps are absorbed by the next process and overlaps are clipped. An
    /// entry whose extent falls entirely below its corrected start becomes
    /// empty but keeps its slot. The last entry is unbounded.
    pub fn from_extents(extents: &[Option<VertexExtent>]) -> Result<Self, ScalerError> {
        if extents.is_empty() {
            return Err(ScalerError::InvalidConfig(
                "partition map needs at least one process extent".into(),
            ));
        }
        let n = extents.len();
        let mut ranges = Vec::with_capacity(n);
        // `None` once an unbounded range has consumed the id space.
        let mut next: Option<Vertex> = Some(0);
        for (rank, extent) in extents.iter().enumerate() {
            let range = match next {
                None => VertexRange::empty(Vertex::MAX),
                Some(start) if rank + 1 == n => VertexRange::new(start, None),
                Some(start) => match extent {
                    Some(e) if e.max >= start => VertexRange::new(start, e.max.checked_add(1)),
                    _ => VertexRange::empty(start),
                },
            };
            if let (Some(start), Some(e)) = (next, extent) {
                if e.min > start {
                    log::debug!("partition map: rank {rank} absorbs gap [{start}, {})", e.min);
                } else if e.min < start {
                    log::debug!("partition map: rank {rank} clipped to start at {start} (extent min {})", e.min);
                }
            }
            if range.is_empty() && extent.is_some() {
                log::warn!("partition map: rank {rank} holds edges but owns no vertex ids");
            }
            if !range.is_empty() {
                next = range.end();
            }
            ranges.push(range);
        }
        let map = Self { ranges };
        map.debug_assert_invariants();
        Ok(map)
    }

    /// Number of processes the map was built for.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[VertexRange] {
        &self.ranges
    }

    pub fn range(&self, rank: usize) -> Option<&VertexRange> {
        self.ranges.get(rank)
    }

    /// The single owner of `v`, if any.
    pub fn owner_of(&self, v: Vertex) -> Option<usize> {
        // Ranges are sorted by start; empty entries share the start of the
        // next non-empty one, so the owner is the last non-empty range that
        // starts at or below `v`.
        let upto = self.ranges.partition_point(|r| r.start <= v);
        let rank = self.ranges[..upto].iter().rposition(|r| !r.is_empty())?;
        self.ranges[rank].contains(v).then_some(rank)
    }

    /// Every process whose range contains `v`, in rank order.
    ///
    /// Non-empty on a well-formed map; a map built by
    /// [`from_extents`](Self::from_extents) always yields exactly one owner.
    pub fn owners_of(&self, v: Vertex) -> Vec<usize> {
        self.owner_of(v).into_iter().collect()
    }

    pub fn is_owner(&self, rank: usize, v: Vertex) -> bool {
        self.ranges.get(rank).is_some_and(|r| r.contains(v))
    }
}

impl DebugInvariants for PartitionMap {
    fn validate_invariants(&self) -> Result<(), ScalerError> {
        let broken = |what: String| ScalerError::InvalidConfig(format!("partition map: {what}"));
        let mut covered: Option<Vertex> = Some(0);
        for (rank, r) in self.ranges.iter().enumerate() {
            if r.is_empty() {
                continue;
            }
            match covered {
                Some(expected) if r.start == expected => covered = r.end,
                Some(expected) => {
                    return Err(broken(format!(
                        "rank {rank} starts at {} but coverage ends at {expected}",
                        r.start
                    )));
                }
                None => return Err(broken(format!("rank {rank} lies past an unbounded range"))),
            }
        }
        if covered.is_some() {
            return Err(broken("last range is bounded".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
