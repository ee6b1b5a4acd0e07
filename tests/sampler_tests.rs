mod util;

use dgraph_scaler::algs::communicator::Communicator;
use dgraph_scaler::algs::distribute::distribute_edges;
use dgraph_scaler::algs::sample::{
    Fragment, Sample, Sampler, SamplerConfig, ShortfallReason, required_count,
};
use dgraph_scaler::graph::{EdgeGraph, MultiDiGraph, Vertex};
use dgraph_scaler::partitioning::{PartitionMap, VertexExtent};
use hashbrown::HashSet;
use util::{edge_input, input_for, random_edges, run_pool};

fn cfg(seed: u64, rank: usize) -> SamplerConfig {
    SamplerConfig {
        precision: 0.9,
        seed: seed ^ rank as u64,
        ..SamplerConfig::default()
    }
}

/// Distribute `text`, run one round of `target` on every rank.
fn round(size: usize, text: &str, target: u64, seed: u64) -> Vec<(Sample, MultiDiGraph<Vertex>, PartitionMap)> {
    run_pool(size, |comm| {
        let shard = distribute_edges(input_for(&comm, text), &comm).unwrap();
        let graph = shard.local_graph();
        let mut sampler =
            Sampler::new(&comm, &graph, &shard.partition_map, cfg(seed, comm.rank())).unwrap();
        let sample = sampler.sample(target).unwrap();
        (sample, graph, shard.partition_map)
    })
}

#[test]
fn distributed_round_reaches_precision_with_sound_ownership() {
    let text = edge_input(80, &random_edges(80, 160, 3));
    let results = round(3, &text, 40, 17);

    let report = &results[0].0.report;
    assert!(report.is_complete(), "{report:?}");
    assert!(report.reached >= required_count(0.9, 40));
    let mut all_owned = HashSet::new();
    for (rank, (sample, graph, pm)) in results.iter().enumerate() {
        // every rank leaves the loop together
        assert_eq!(sample.report.reached, report.reached);
        assert_eq!(sample.report.iterations, report.iterations);
        for &v in &sample.ownership {
            assert!(pm.is_owner(rank, v), "rank {rank} claims {v}");
            assert!(all_owned.insert(v), "{v} owned twice");
        }
        // fragments only hold local edges, each at most as often as locally present
        for &(t, h) in sample.fragment.edges() {
            assert!(sample.fragment.multiplicity(t, h) <= graph.multiplicity(t, h));
        }
        assert_eq!(
            sample.fragment.edge_count(),
            sample.report.sampled_edges + sample.report.induced_local + sample.report.induced_remote
        );
    }
    assert_eq!(all_owned.len() as u64, report.reached);
    for (sample, _, _) in &results {
        for v in sample.fragment.nodes() {
            assert!(all_owned.contains(v), "{v} in a fragment but owned by nobody");
        }
    }
}

#[test]
fn induction_asks_the_owner_of_the_head() {
    let results = run_pool(2, |comm| {
        let graph = if comm.rank() == 0 {
            MultiDiGraph::from_edges([(0, 1), (1, 5), (0, 6)])
        } else {
            MultiDiGraph::from_edges([(5, 6), (6, 7)])
        };
        let pm = PartitionMap::from_extents(&[
            Some(VertexExtent::new(0, 4)),
            Some(VertexExtent::new(5, 9)),
        ])
        .unwrap();
        let mut sampler = Sampler::new(&comm, &graph, &pm, SamplerConfig::default()).unwrap();

        let mut fragment = Fragment::new(graph.edge_count());
        fragment.insert(0, graph.edge(0).unwrap());
        let fresh = fragment.graph().nodes().to_vec();
        let pending = sampler.compute_ownership(&fresh);
        let mut ownership = HashSet::new();
        let counts = sampler.flood_ownership(pending, &mut ownership).unwrap();
        let induced = sampler.induce(&mut fragment, &ownership).unwrap();
        (counts.owned, ownership, induced, fragment.into_graph())
    });

    let (global, owned0, induced0, frag0) = &results[0];
    let (_, owned1, induced1, frag1) = &results[1];
    assert_eq!(*global, 4);
    assert_eq!(owned0, &HashSet::from_iter([0, 1]));
    assert_eq!(owned1, &HashSet::from_iter([5, 6]));
    // rank 1 owns 5 and 6, so both cross-shard edges are confirmed
    assert_eq!((induced0.local, induced0.remote), (0, 2));
    assert!(frag0.has_edge(1, 5) && frag0.has_edge(0, 6));
    // 7 was never sampled, so (6, 7) stays out
    assert_eq!((induced1.local, induced1.remote), (0, 0));
    assert!(!frag1.has_edge(6, 7));
}

#[test]
fn unreachable_target_is_reported_identically_everywhere() {
    let text = edge_input(12, &random_edges(12, 6, 5));
    let results = round(3, &text, 500, 1);
    for (sample, _, _) in &results {
        let s = sample.report.shortfall.expect("target is larger than the graph");
        assert_eq!(s.reason, ShortfallReason::Stalled);
        assert_eq!(s.reached, 12);
        assert_eq!(s.required, required_count(0.9, 500));
    }
}

#[test]
fn iteration_limit_is_a_shortfall() {
    let text = edge_input(200, &random_edges(200, 0, 0));
    let results = run_pool(2, |comm| {
        let shard = distribute_edges(input_for(&comm, &text), &comm).unwrap();
        let graph = shard.local_graph();
        let cfg = SamplerConfig {
            precision: 1.0,
            max_iterations: 1,
            max_stalled_draws: 1,
            seed: comm.rank() as u64,
        };
        let mut sampler = Sampler::new(&comm, &graph, &shard.partition_map, cfg).unwrap();
        sampler.sample(200).unwrap().report
    });
    assert_eq!(results[0].reached, results[1].reached);
    for report in &results {
        assert_eq!(report.iterations, 1);
        if let Some(s) = report.shortfall {
            assert_eq!(s.reason, ShortfallReason::IterationLimit);
        }
    }
}

#[test]
fn same_seed_same_fragments() {
    let text = edge_input(50, &random_edges(50, 80, 9));
    let a = round(2, &text, 30, 99);
    let b = round(2, &text, 30, 99);
    for ((sa, _, _), (sb, _, _)) in a.iter().zip(&b) {
        assert_eq!(sa.fragment.edges(), sb.fragment.edges());
        assert_eq!(sa.report, sb.report);
    }
}

#[test]
fn fragments_never_shrink_across_phases() {
    let text = edge_input(40, &random_edges(40, 60, 21));
    let sizes = run_pool(2, |comm| {
        let shard = distribute_edges(input_for(&comm, &text), &comm).unwrap();
        let graph = shard.local_graph();
        let mut sampler =
            Sampler::new(&comm, &graph, &shard.partition_map, cfg(4, comm.rank())).unwrap();
        let mut fragment = Fragment::new(graph.edge_count());
        let mut ownership = HashSet::new();
        let mut sizes = Vec::new();
        let fresh = sampler.draw(&mut fragment, 10);
        sizes.push((fragment.graph().node_count(), fragment.graph().edge_count()));
        let pending = sampler.compute_ownership(&fresh);
        sampler.flood_ownership(pending, &mut ownership).unwrap();
        sizes.push((fragment.graph().node_count(), fragment.graph().edge_count()));
        sampler.induce(&mut fragment, &ownership).unwrap();
        sizes.push((fragment.graph().node_count(), fragment.graph().edge_count()));
        sizes
    });
    for s in sizes {
        assert!(s.windows(2).all(|w| w[0].0 <= w[1].0 && w[0].1 <= w[1].1), "{s:?}");
    }
}
