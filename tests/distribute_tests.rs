mod util;

use dgraph_scaler::algs::communicator::{CommConfig, Communicator};
use dgraph_scaler::algs::distribute::{EdgeShard, distribute_edges};
use dgraph_scaler::debug_invariants::DebugInvariants;
use dgraph_scaler::scaler_error::ScalerError;
use util::{edge_input, input_for, random_edges, run_pool, run_pool_with_config};

fn distribute(size: usize, text: &str) -> Vec<Result<EdgeShard, ScalerError>> {
    run_pool(size, |comm| distribute_edges(input_for(&comm, text), &comm))
}

#[test]
fn shards_cover_the_stream_exactly_once_in_order() {
    let edges = random_edges(30, 40, 11);
    let text = edge_input(30, &edges);
    let shards: Vec<EdgeShard> = distribute(3, &text)
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let sizes: Vec<usize> = shards.iter().map(|s| s.edges.len()).collect();
    assert_eq!(sizes, vec![24, 23, 23]);
    let rejoined: Vec<(u64, u64)> = shards.iter().flat_map(|s| s.edges.clone()).collect();
    assert_eq!(rejoined, edges);

    for s in &shards {
        assert_eq!(s.total_vertices, 30);
        assert_eq!(s.total_edges, 70);
        assert_eq!(s.partition_map, shards[0].partition_map);
        s.partition_map.validate_invariants().unwrap();
    }
    let pm = &shards[0].partition_map;
    for v in 0..100 {
        assert_eq!(pm.owners_of(v).len(), 1, "vertex {v}");
    }
}

#[test]
fn more_ranks_than_edges_leaves_empty_shards() {
    let text = edge_input(3, &[(0, 1), (1, 2)]);
    let shards: Vec<EdgeShard> = distribute(4, &text)
        .into_iter()
        .map(Result::unwrap)
        .collect();
    let sizes: Vec<usize> = shards.iter().map(|s| s.edges.len()).collect();
    assert_eq!(sizes, vec![1, 1, 0, 0]);
    let pm = &shards[3].partition_map;
    assert!(pm.range(2).unwrap().is_empty());
    assert_eq!(pm.owners_of(2), vec![1]);
    assert_eq!(pm.owners_of(10), vec![3]);
    assert!(shards[2].local_graph().is_empty());
}

#[test]
fn malformed_header_fails_every_rank() {
    let results = distribute(3, "12\ntwenty\n0 1\n");
    assert!(matches!(
        results[0],
        Err(ScalerError::MalformedHeader { line: 2, .. })
    ));
    for r in &results[1..] {
        assert!(matches!(
            r,
            Err(ScalerError::PeerFailed { rank: 0, .. })
        ));
    }
}

#[test]
fn truncated_input_fails_every_rank() {
    let results = distribute(3, "4\n6\n0 1\n1 2\n2 3\n");
    assert!(matches!(
        results[0],
        Err(ScalerError::TruncatedInput {
            read: 3,
            expected: 6
        })
    ));
    assert!(results[1..].iter().all(|r| r.is_err()));
}

#[test]
fn oversize_shard_is_a_configuration_error() {
    let text = edge_input(6, &random_edges(6, 0, 0));
    let cfg = CommConfig {
        max_message_bytes: 40,
    };
    let results = run_pool_with_config(3, cfg, |comm| {
        distribute_edges(input_for(&comm, &text), &comm)
    });
    let err = results[0].as_ref().unwrap_err();
    assert!(matches!(err, ScalerError::BufferTooSmall { peer: 1, .. }));
    assert!(err.is_configuration());
    for r in &results[1..] {
        assert!(matches!(
            r,
            Err(ScalerError::PeerFailed { rank: 0, .. })
        ));
    }
}

#[test]
fn path_heads_stay_with_their_shard() {
    let edges: Vec<(u64, u64)> = (0..12).map(|i| (i, i + 1)).collect();
    let text = edge_input(13, &edges);
    let shards = run_pool(3, |comm| {
        let shard = distribute_edges(input_for(&comm, &text), &comm).unwrap();
        let owned_locally = shard
            .edges
            .iter()
            .filter(|&&(_, h)| shard.partition_map.is_owner(comm.rank(), h))
            .count();
        (shard, owned_locally)
    });
    // path edges: the overlap vertex goes to the lower rank, so heads stay local
    for (shard, owned) in &shards {
        assert_eq!(*owned, shard.edges.len());
    }
}
