#![allow(dead_code)]
use dgraph_scaler::algs::communicator::{CommConfig, Communicator, ThreadComm};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::io::Cursor;

/// Run `f` on every rank of a fresh `size`-rank thread pool and return the
/// results in rank order. A panicking rank aborts the pool so its peers fail
/// instead of blocking, then the panic is re-raised.
pub fn run_pool<T, F>(size: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(ThreadComm) -> T + Sync,
{
    run_pool_with_config(size, CommConfig::default(), f)
}

pub fn run_pool_with_config<T, F>(size: usize, config: CommConfig, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(ThreadComm) -> T + Sync,
{
    let comms = ThreadComm::pool_with_config(size, config);
    std::thread::scope(|s| {
        let f = &f;
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                s.spawn(move || {
                    let guard = comm.clone();
                    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(comm))) {
                        Ok(v) => v,
                        Err(p) => {
                            guard.abort("test rank panicked");
                            std::panic::resume_unwind(p)
                        }
                    }
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|p| std::panic::resume_unwind(p)))
            .collect()
    })
}

/// Edge-list text with the two header lines.
pub fn edge_input(vertices: u64, edges: &[(u64, u64)]) -> String {
    let mut s = format!("{vertices}\n{}\n", edges.len());
    for (t, h) in edges {
        s.push_str(&format!("{t} {h}\n"));
    }
    s
}

/// The coordinator's input stream; `None` on every other rank.
pub fn input_for<C: Communicator>(comm: &C, text: &str) -> Option<Cursor<Vec<u8>>> {
    comm.is_coordinator()
        .then(|| Cursor::new(text.as_bytes().to_vec()))
}

/// Random directed edges over `0..vertices`, every vertex touched at least once.
pub fn random_edges(vertices: u64, extra: usize, seed: u64) -> Vec<(u64, u64)> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut edges: Vec<(u64, u64)> = (0..vertices).map(|v| (v, (v + 1) % vertices)).collect();
    for _ in 0..extra {
        edges.push((rng.gen_range(0..vertices), rng.gen_range(0..vertices)));
    }
    edges
}

/// Assert vec is a permutation of another vec (order-agnostic).
pub fn assert_permutation<T: Ord + Clone + std::fmt::Debug>(got: &[T], want: &[T]) {
    let mut a = got.to_vec();
    a.sort_unstable();
    let mut b = want.to_vec();
    b.sort_unstable();
    assert_eq!(a, b, "not a permutation\n got={:?}\nwant={:?}", got, want);
}
