use super::*;
#[path = "partition_property_tests.rs"]
mod partition_property_tests;

fn ext(min: Vertex, max: Vertex) -> Option<VertexExtent> {
    Some(VertexExtent::new(min, max))
}

#[test]
fn extent_of_edges_covers_both_endpoints() {
    assert_eq!(VertexExtent::of_edges(&[]), None);
    assert_eq!(
        VertexExtent::of_edges(&[(5, 2), (3, 9)]),
        Some(VertexExtent::new(2, 9))
    );
}

#[test]
fn single_process_owns_everything() {
    let pm = PartitionMap::from_extents(&[ext(10, 20)]).unwrap();
    assert_eq!(pm.owners_of(0), vec![0]);
    assert_eq!(pm.owners_of(Vertex::MAX), vec![0]);
    assert!(pm.range(0).unwrap().is_unbounded());
}

#[test]
fn gaps_are_absorbed_by_the_next_process() {
    let pm = PartitionMap::from_extents(&[ext(3, 10), ext(20, 30), ext(40, 50)]).unwrap();
    assert_eq!(pm.range(0), Some(&VertexRange::new(0, Some(11))));
    assert_eq!(pm.range(1), Some(&VertexRange::new(11, Some(31))));
    assert_eq!(pm.range(2), Some(&VertexRange::new(31, None)));
    assert_eq!(pm.owner_of(0), Some(0));
    assert_eq!(pm.owner_of(15), Some(1));
    assert_eq!(pm.owner_of(35), Some(2));
    assert_eq!(pm.owner_of(1_000_000), Some(2));
    pm.validate_invariants().unwrap();
}

#[test]
fn overlaps_are_clipped_to_a_single_owner() {
    let pm = PartitionMap::from_extents(&[ext(0, 12), ext(5, 20), ext(18, 25)]).unwrap();
    assert_eq!(pm.owners_of(7), vec![0]);
    assert_eq!(pm.owners_of(13), vec![1]);
    assert_eq!(pm.owners_of(19), vec![1]);
    assert_eq!(pm.owners_of(21), vec![2]);
    assert!(pm.is_owner(1, 20));
    assert!(!pm.is_owner(2, 20));
}

#[test]
fn empty_shards_keep_their_slot_without_matching() {
    let pm = PartitionMap::from_extents(&[ext(0, 9), None, ext(2, 5), ext(10, 12)]).unwrap();
    assert_eq!(pm.len(), 4);
    assert!(pm.range(1).unwrap().is_empty());
    // rank 2's extent lies below its corrected start
    assert!(pm.range(2).unwrap().is_empty());
    assert!(!pm.is_owner(1, 10));
    assert!(!pm.is_owner(2, 3));
    assert_eq!(pm.owners_of(10), vec![3]);
    assert_eq!(pm.owners_of(5), vec![0]);
    assert!(!pm.is_owner(7, 5));
    pm.validate_invariants().unwrap();
}

#[test]
fn trailing_empty_shard_still_covers_the_tail() {
    let pm = PartitionMap::from_extents(&[ext(0, 4), None]).unwrap();
    assert_eq!(pm.owners_of(5), vec![1]);
    assert_eq!(pm.owners_of(4), vec![0]);
}

#[test]
fn max_vertex_id_exhausts_the_id_space() {
    let pm = PartitionMap::from_extents(&[ext(0, Vertex::MAX), ext(7, 9)]).unwrap();
    assert!(pm.range(0).unwrap().is_unbounded());
    assert!(pm.range(1).unwrap().is_empty());
    assert_eq!(pm.owners_of(Vertex::MAX), vec![0]);
    assert_eq!(pm.owners_of(8), vec![0]);
    pm.validate_invariants().unwrap();
}

#[test]
fn no_extents_is_a_configuration_error() {
    assert!(matches!(
        PartitionMap::from_extents(&[]),
        Err(ScalerError::InvalidConfig(_))
    ));
}

#[test]
fn range_last_is_inclusive() {
    assert_eq!(VertexRange::new(3, Some(8)).last(), Some(7));
    assert_eq!(VertexRange::empty(3).last(), None);
    assert_eq!(VertexRange::new(3, None).last(), None);
}
