mod util;

use dgraph_scaler::algs::communicator::Communicator;
use dgraph_scaler::algs::merge::{MergeMode, merge_fragments, relabel_fragments};
use dgraph_scaler::graph::{LabeledVertex, MultiDiGraph, Vertex, fragment_prefix};
use dgraph_scaler::io::fragment_file_name;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use util::run_pool;

fn parse_output(text: &str) -> Vec<(LabeledVertex, LabeledVertex)> {
    text.lines()
        .map(|line| {
            let (t, h) = line.split_once(' ').unwrap();
            (t.parse().unwrap(), h.parse().unwrap())
        })
        .collect()
}

fn rank_fragments(rank: usize) -> Vec<MultiDiGraph<Vertex>> {
    let base = rank as u64 * 10;
    vec![
        MultiDiGraph::from_edges([(base, base + 1), (base + 1, base + 2)]),
        MultiDiGraph::from_edges([(base, base + 2)]),
    ]
}

#[test]
fn centralized_merge_gathers_every_rank_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("merged.edges");
    let reports = run_pool(3, |comm| {
        let labeled = relabel_fragments(&comm, &rank_fragments(comm.rank())).unwrap();
        merge_fragments(&comm, &labeled, &out, MergeMode::Centralized).unwrap()
    });
    assert_eq!(reports[0].edges_written, 9);
    assert_eq!(reports[0].files, vec![out.clone()]);
    assert!(reports[1].files.is_empty());

    let edges = parse_output(&std::fs::read_to_string(&out).unwrap());
    assert_eq!(edges.len(), 9);
    // coordinator first, then ranks 1 and 2
    let order: Vec<u32> = edges.iter().map(|(t, _)| t.fragment()).collect();
    assert_eq!(order, vec![0, 0, 3, 1, 1, 4, 2, 2, 5]);
}

#[test]
fn fragments_have_disjoint_vertex_sets() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("merged.edges");
    run_pool(2, |comm| {
        // every rank samples the same raw ids
        let same = vec![MultiDiGraph::from_edges([(0, 1)]); 3];
        let labeled = relabel_fragments(&comm, &same).unwrap();
        merge_fragments(&comm, &labeled, &out, MergeMode::Centralized).unwrap();
    });
    let mut by_fragment: BTreeMap<u32, BTreeSet<String>> = BTreeMap::new();
    for (t, h) in parse_output(&std::fs::read_to_string(&out).unwrap()) {
        assert_eq!(t.fragment(), h.fragment());
        let set = by_fragment.entry(t.fragment()).or_default();
        set.insert(t.to_string());
        set.insert(h.to_string());
    }
    assert_eq!(by_fragment.len(), 6);
    let all: Vec<&String> = by_fragment.values().flatten().collect();
    let unique: BTreeSet<&String> = all.iter().copied().collect();
    assert_eq!(all.len(), unique.len());
}

#[test]
fn parallel_merge_writes_one_file_per_fragment() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("scaled");
    let reports = run_pool(2, |comm| {
        let labeled = relabel_fragments(&comm, &rank_fragments(comm.rank())).unwrap();
        merge_fragments(&comm, &labeled, &out, MergeMode::Parallel).unwrap()
    });
    for (rank, report) in reports.iter().enumerate() {
        assert_eq!(report.edges_written, 3);
        for index in 0..2 {
            let path = fragment_file_name(&out, rank, index);
            assert!(report.files.contains(&path));
            let edges = parse_output(&std::fs::read_to_string(&path).unwrap());
            let want = (index * 2 + rank) as u32;
            assert!(edges.iter().all(|(t, h)| t.fragment() == want && h.fragment() == want));
        }
    }
    assert!(!out.exists());
}

#[test]
fn coordinator_write_failure_fails_the_pool() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("no-such-dir").join("merged.edges");
    let results = run_pool(3, |comm| {
        let labeled = relabel_fragments(&comm, &rank_fragments(comm.rank())).unwrap();
        merge_fragments(&comm, &labeled, &out, MergeMode::Centralized)
    });
    assert!(results.iter().all(|r| r.is_err()));
    assert!(matches!(
        results[0],
        Err(dgraph_scaler::ScalerError::Io(_))
    ));
}

proptest! {
    #[test]
    fn prefixes_are_unique_and_invertible(a in 0usize..100_000, b in 0usize..100_000) {
        let (pa, pb) = (fragment_prefix(a), fragment_prefix(b));
        prop_assert_eq!(pa == pb, a == b);
        prop_assert!(pa.bytes().all(|c| c.is_ascii_lowercase()));
        let v: LabeledVertex = format!("{pa}42").parse().unwrap();
        prop_assert_eq!(v.fragment() as usize, a);
        prop_assert_eq!(v.id(), 42);
    }
}
