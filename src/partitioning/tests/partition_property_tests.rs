use proptest::prelude::*;

use crate::debug_invariants::DebugInvariants;
use crate::graph::vertex::Vertex;
use crate::partitioning::{PartitionMap, VertexExtent};

fn arb_extent() -> impl Strategy<Value = Option<VertexExtent>> {
    prop::option::weighted(
        0.85,
        (0u64..2_000, 0u64..400).prop_map(|(min, span)| VertexExtent::new(min, min + span)),
    )
}

proptest! {
    #[test]
    fn every_vertex_has_exactly_one_owner(
        extents in prop::collection::vec(arb_extent(), 1..9),
        beyond in 0u64..1_000_000,
    ) {
        let pm = PartitionMap::from_extents(&extents).unwrap();
        prop_assert_eq!(pm.len(), extents.len());
        prop_assert!(pm.validate_invariants().is_ok());

        let max_seen = extents.iter().flatten().map(|e| e.max).max().unwrap_or(0);
        let probes = (0..=max_seen).chain([max_seen + 1 + beyond, Vertex::MAX]);
        for v in probes {
            let owners = pm.owners_of(v);
            prop_assert_eq!(owners.len(), 1, "vertex {} owners {:?}", v, owners);
            let claimed = (0..pm.len()).filter(|&r| pm.is_owner(r, v)).count();
            prop_assert_eq!(claimed, 1);
        }
    }

    #[test]
    fn construction_is_deterministic(extents in prop::collection::vec(arb_extent(), 1..9)) {
        let a = PartitionMap::from_extents(&extents).unwrap();
        let b = PartitionMap::from_extents(&extents).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn non_empty_extents_keep_their_upper_bound(
        extents in prop::collection::vec(arb_extent(), 2..9),
    ) {
        let pm = PartitionMap::from_extents(&extents).unwrap();
        let last = extents.len() - 1;
        for (rank, extent) in extents.iter().enumerate().take(last) {
            let range = pm.range(rank).unwrap();
            if let (Some(e), Some(top)) = (extent, range.last()) {
                prop_assert_eq!(top, e.max);
            }
        }
    }
}
