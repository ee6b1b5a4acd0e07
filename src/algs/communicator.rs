//! Thin façade over intra-process (thread pool) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte buffers* addressed by `(peer, tag)`. Every
//! backend delivers messages between a given pair of ranks with the same tag
//! reliably and in send order. Collectives (`all_to_all`, `barrier`) block
//! until every member of the pool has entered them.
//!
//! The pool handle is always passed explicitly; nothing in the crate reads
//! rank or size from global state.

use crate::scaler_error::ScalerError;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Message tag; each protocol phase owns one so phases never see each other's traffic.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const INITIAL_EDGES: CommTag = CommTag(0x0100);
    pub const PARTITION_MAP: CommTag = CommTag(0x0200);
    pub const VERTEX_COUNTS: CommTag = CommTag(0x0300);
    pub const OWNERSHIPS: CommTag = CommTag(0x0400);
    pub const OWNED_COUNTS: CommTag = CommTag(0x0500);
    pub const EDGE_QUERY: CommTag = CommTag(0x0600);
    pub const EDGE_RESPONSE: CommTag = CommTag(0x0700);
    pub const STITCHING: CommTag = CommTag(0x0800);
    pub const MERGE: CommTag = CommTag(0x0900);

    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Derived tag for a sub-step of a phase.
    pub const fn offset(self, k: u16) -> Self {
        Self(self.0.wrapping_add(k))
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Limits applied to outbound traffic.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommConfig {
    /// Largest single message accepted by `isend`. Larger payloads fail with
    /// [`ScalerError::BufferTooSmall`] instead of being truncated.
    pub max_message_bytes: usize,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 256 << 20,
        }
    }
}

/// Message-passing interface of one member of a fixed-size process pool.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;

    /// 0-based id of this process.
    fn rank(&self) -> usize;
    /// Number of processes in the pool.
    fn size(&self) -> usize;

    /// Send `buf` to `peer`. `ThreadComm` queues the message and returns at
    /// once; `MpiComm` uses a standard-mode send, which may block until the
    /// matching receive is posted.
    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Result<Self::SendHandle, ScalerError>;
    /// Blocking receive of the next message from `peer` with `tag`.
    fn recv(&self, peer: usize, tag: CommTag) -> Result<Bytes, ScalerError>;
    /// Non-blocking check for a pending message from `peer` with `tag`.
    fn probe(&self, peer: usize, tag: CommTag) -> Result<bool, ScalerError>;
    /// Block until every process has entered the barrier.
    fn barrier(&self) -> Result<(), ScalerError>;
    /// Fail the whole pool; peers blocked in this pool observe an error.
    fn abort(&self, reason: &str);

    /// True on the coordinating process (rank 0).
    fn is_coordinator(&self) -> bool {
        self.rank() == 0
    }

    /// Send and wait for local completion.
    fn send(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Result<(), ScalerError> {
        let handle = self.isend(peer, tag, buf)?;
        let _ = handle.wait();
        Ok(())
    }

    /// Send to `dest` and receive from `source` without a send cycle deadlock.
    ///
    /// Rank 0 receives first and every other rank sends first, which breaks
    /// the cycle of a ring shift even when sends only complete on receipt.
    fn sendrecv(
        &self,
        dest: usize,
        source: usize,
        tag: CommTag,
        buf: &[u8],
    ) -> Result<Bytes, ScalerError> {
        if self.rank() == 0 {
            let got = self.recv(source, tag)?;
            self.send(dest, tag, buf)?;
            Ok(got)
        } else {
            self.send(dest, tag, buf)?;
            self.recv(source, tag)
        }
    }

    /// Personalized all-to-all: `outgoing[p]` goes to rank `p`; the result
    /// holds, at index `p`, what rank `p` sent to this process.
    ///
    /// Any local failure aborts the pool so no peer waits forever.
    fn all_to_all(&self, tag: CommTag, outgoing: Vec<Vec<u8>>) -> Result<Vec<Bytes>, ScalerError> {
        let result = exchange_all_to_all(self, tag, outgoing);
        if let Err(e) = &result {
            if !matches!(e, ScalerError::PoolAborted(_)) {
                self.abort(&e.to_string());
            }
        }
        result
    }

    /// Every process contributes `buf`; everyone receives all contributions in rank order.
    fn all_gather(&self, tag: CommTag, buf: &[u8]) -> Result<Vec<Bytes>, ScalerError> {
        self.all_to_all(tag, vec![buf.to_vec(); self.size()])
    }
}

/// Post every send, then drain replies in arrival order: whatever is already
/// pending is taken first, and only when nothing is ready does the loop block
/// on the lowest pending peer.
///
/// Needs an `isend` that returns without a matching receive. Backends whose
/// sends may block override [`Communicator::all_to_all`].
fn exchange_all_to_all<C: Communicator + ?Sized>(
    comm: &C,
    tag: CommTag,
    outgoing: Vec<Vec<u8>>,
) -> Result<Vec<Bytes>, ScalerError> {
    let size = comm.size();
    let me = comm.rank();
    if outgoing.len() != size {
        return Err(ScalerError::ShapeMismatch {
            expected: size,
            got: outgoing.len(),
        });
    }

    let mut incoming: Vec<Option<Bytes>> = vec![None; size];
    let mut pending_sends = Vec::with_capacity(size.saturating_sub(1));
    for (peer, payload) in outgoing.into_iter().enumerate() {
        if peer == me {
            incoming[me] = Some(Bytes::from(payload));
        } else {
            pending_sends.push(comm.isend(peer, tag, &payload)?);
        }
    }

    let mut pending: Vec<usize> = (0..size).filter(|&p| p != me).collect();
    while !pending.is_empty() {
        let before = pending.len();
        let mut still = Vec::with_capacity(before);
        for peer in pending {
            if comm.probe(peer, tag)? {
                incoming[peer] = Some(comm.recv(peer, tag)?);
            } else {
                still.push(peer);
            }
        }
        if still.len() == before {
            let first = still.remove(0);
            incoming[first] = Some(comm.recv(first, tag)?);
        }
        pending = still;
    }

    for send in pending_sends {
        let _ = send.wait();
    }

    incoming
        .into_iter()
        .enumerate()
        .map(|(peer, msg)| msg.ok_or_else(|| ScalerError::comm(peer, "missing all-to-all contribution")))
        .collect()
}

/// Serial pool of size 1 (no peers).
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn isend(&self, peer: usize, _tag: CommTag, _buf: &[u8]) -> Result<(), ScalerError> {
        Err(ScalerError::comm(peer, "NoComm has no peers"))
    }

    fn recv(&self, peer: usize, _tag: CommTag) -> Result<Bytes, ScalerError> {
        Err(ScalerError::comm(peer, "NoComm has no peers"))
    }

    fn probe(&self, _peer: usize, _tag: CommTag) -> Result<bool, ScalerError> {
        Ok(false)
    }

    fn barrier(&self) -> Result<(), ScalerError> {
        Ok(())
    }

    fn abort(&self, reason: &str) {
        log::error!("serial run aborted: {reason}");
    }
}

// --- ThreadComm: in-process pool, one thread per rank ---
type Key = (usize, usize, u16); // (src, dst, tag)

struct BarrierState {
    waiting: usize,
    generation: u64,
}

struct PoolState {
    size: usize,
    config: CommConfig,
    mailbox: DashMap<Key, VecDeque<Bytes>>,
    gate: Mutex<()>,
    arrivals: Condvar,
    barrier: Mutex<BarrierState>,
    released: Condvar,
    aborted: RwLock<Option<String>>,
}

impl PoolState {
    fn check_aborted(&self) -> Result<(), ScalerError> {
        match self.aborted.read().as_ref() {
            Some(reason) => Err(ScalerError::PoolAborted(reason.clone())),
            None => Ok(()),
        }
    }

    fn pop(&self, key: &Key) -> Option<Bytes> {
        self.mailbox.get_mut(key).and_then(|mut q| q.pop_front())
    }
}

/// In-memory pool member; ranks of one pool share a mailbox and a barrier.
///
/// Sends never block. A message larger than
/// [`CommConfig::max_message_bytes`] is rejected.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    pool: Arc<PoolState>,
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.pool.size)
            .finish()
    }
}

impl ThreadComm {
    /// Build a pool of `size` members with default limits.
    pub fn pool(size: usize) -> Vec<ThreadComm> {
        Self::pool_with_config(size, CommConfig::default())
    }

    /// Build a pool of `size` members; hand one to each thread.
    pub fn pool_with_config(size: usize, config: CommConfig) -> Vec<ThreadComm> {
        let pool = Arc::new(PoolState {
            size,
            config,
            mailbox: DashMap::new(),
            gate: Mutex::new(()),
            arrivals: Condvar::new(),
            barrier: Mutex::new(BarrierState {
                waiting: 0,
                generation: 0,
            }),
            released: Condvar::new(),
            aborted: RwLock::new(None),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                pool: Arc::clone(&pool),
            })
            .collect()
    }

    fn check_peer(&self, peer: usize) -> Result<(), ScalerError> {
        if peer < self.pool.size {
            Ok(())
        } else {
            Err(ScalerError::InvalidRank {
                rank: peer,
                size: self.pool.size,
            })
        }
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.pool.size
    }

    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Result<(), ScalerError> {
        self.check_peer(peer)?;
        self.pool.check_aborted()?;
        let capacity = self.pool.config.max_message_bytes;
        if buf.len() > capacity {
            return Err(ScalerError::BufferTooSmall {
                peer,
                needed: buf.len(),
                capacity,
            });
        }
        let key = (self.rank, peer, tag.as_u16());
        self.pool
            .mailbox
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
        let _gate = self.pool.gate.lock();
        self.pool.arrivals.notify_all();
        Ok(())
    }

    fn recv(&self, peer: usize, tag: CommTag) -> Result<Bytes, ScalerError> {
        self.check_peer(peer)?;
        let key = (peer, self.rank, tag.as_u16());
        let mut gate = self.pool.gate.lock();
        loop {
            if let Some(msg) = self.pool.pop(&key) {
                return Ok(msg);
            }
            self.pool.check_aborted()?;
            self.pool.arrivals.wait(&mut gate);
        }
    }

    fn probe(&self, peer: usize, tag: CommTag) -> Result<bool, ScalerError> {
        self.check_peer(peer)?;
        self.pool.check_aborted()?;
        let key = (peer, self.rank, tag.as_u16());
        Ok(self.pool.mailbox.get(&key).is_some_and(|q| !q.is_empty()))
    }

    fn barrier(&self) -> Result<(), ScalerError> {
        let mut state = self.pool.barrier.lock();
        self.pool.check_aborted()?;
        let generation = state.generation;
        state.waiting += 1;
        if state.waiting == self.pool.size {
            state.waiting = 0;
            state.generation = state.generation.wrapping_add(1);
            self.pool.released.notify_all();
            return Ok(());
        }
        while state.generation == generation {
            self.pool.released.wait(&mut state);
            if state.generation == generation {
                self.pool.check_aborted()?;
            }
        }
        Ok(())
    }

    fn abort(&self, reason: &str) {
        {
            let mut aborted = self.pool.aborted.write();
            if aborted.is_none() {
                log::error!("rank {} aborts the pool: {reason}", self.rank);
                *aborted = Some(format!("rank {}: {reason}", self.rank));
            }
        }
        {
            let _gate = self.pool.gate.lock();
            self.pool.arrivals.notify_all();
        }
        let _barrier = self.pool.barrier.lock();
        self.pool.released.notify_all();
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{CommConfig, CommTag, Communicator};
    use crate::scaler_error::ScalerError;
    use bytes::Bytes;
    use mpi::datatype::{Partition, PartitionMut};
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as MpiCommunicator, CommunicatorCollectives, Destination, Source};
    use mpi::Count;

    /// MPI world communicator. Point-to-point sends use standard mode and
    /// may block, so `all_to_all` maps onto `MPI_Alltoallv` instead of the
    /// send-then-drain exchange.
    pub struct MpiComm {
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
        config: CommConfig,
        // Declared last so MPI is finalized after the communicator is dropped.
        _universe: Universe,
    }

    impl MpiComm {
        pub fn new(config: CommConfig) -> Result<Self, ScalerError> {
            let universe = mpi::initialize()
                .ok_or_else(|| ScalerError::comm(0, "MPI initialization failed"))?;
            let world = universe.world();
            let rank = usize::try_from(world.rank())
                .map_err(|_| ScalerError::comm(0, "negative MPI rank"))?;
            let size = usize::try_from(world.size())
                .map_err(|_| ScalerError::comm(0, "negative MPI size"))?;
            Ok(Self {
                world,
                rank,
                size,
                config,
                _universe: universe,
            })
        }

        fn check_peer(&self, peer: usize) -> Result<i32, ScalerError> {
            if peer < self.size {
                i32::try_from(peer).map_err(|_| ScalerError::InvalidRank {
                    rank: peer,
                    size: self.size,
                })
            } else {
                Err(ScalerError::InvalidRank {
                    rank: peer,
                    size: self.size,
                })
            }
        }

        fn counts(&self, lens: impl Iterator<Item = usize>) -> Result<Vec<Count>, ScalerError> {
            lens.map(|n| {
                Count::try_from(n).map_err(|_| ScalerError::BufferTooSmall {
                    peer: self.rank,
                    needed: n,
                    capacity: Count::MAX as usize,
                })
            })
            .collect()
        }
    }

    fn displacements(counts: &[Count]) -> Vec<Count> {
        counts
            .iter()
            .scan(0, |acc, &c| {
                let at = *acc;
                *acc += c;
                Some(at)
            })
            .collect()
    }

    impl Communicator for MpiComm {
        type SendHandle = ();

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Result<(), ScalerError> {
            let dest = self.check_peer(peer)?;
            let capacity = self.config.max_message_bytes;
            if buf.len() > capacity {
                return Err(ScalerError::BufferTooSmall {
                    peer,
                    needed: buf.len(),
                    capacity,
                });
            }
            self.world
                .process_at_rank(dest)
                .send_with_tag(buf, i32::from(tag.as_u16()));
            Ok(())
        }

        fn recv(&self, peer: usize, tag: CommTag) -> Result<Bytes, ScalerError> {
            let source = self.check_peer(peer)?;
            let (data, _status) = self
                .world
                .process_at_rank(source)
                .receive_vec_with_tag::<u8>(i32::from(tag.as_u16()));
            Ok(Bytes::from(data))
        }

        fn probe(&self, peer: usize, tag: CommTag) -> Result<bool, ScalerError> {
            let source = self.check_peer(peer)?;
            Ok(self
                .world
                .process_at_rank(source)
                .immediate_probe_with_tag(i32::from(tag.as_u16()))
                .is_some())
        }

        fn barrier(&self) -> Result<(), ScalerError> {
            self.world.barrier();
            Ok(())
        }

        fn abort(&self, reason: &str) {
            log::error!("rank {} aborts MPI_COMM_WORLD: {reason}", self.rank);
            self.world.abort(1)
        }

        fn all_to_all(
            &self,
            _tag: CommTag,
            outgoing: Vec<Vec<u8>>,
        ) -> Result<Vec<Bytes>, ScalerError> {
            if outgoing.len() != self.size {
                return Err(ScalerError::ShapeMismatch {
                    expected: self.size,
                    got: outgoing.len(),
                });
            }
            let send_counts = self.counts(outgoing.iter().map(Vec::len))?;
            let mut recv_counts = vec![0 as Count; self.size];
            self.world
                .all_to_all_into(&send_counts[..], &mut recv_counts[..]);

            let send_displs = displacements(&send_counts);
            let recv_displs = displacements(&recv_counts);
            let total: usize = recv_counts.iter().map(|&c| c as usize).sum();
            let send_buf: Vec<u8> = outgoing.concat();
            let mut recv_buf = vec![0u8; total];
            {
                let send = Partition::new(&send_buf[..], &send_counts[..], &send_displs[..]);
                let mut recv =
                    PartitionMut::new(&mut recv_buf[..], &recv_counts[..], &recv_displs[..]);
                self.world.all_to_all_varcount_into(&send, &mut recv);
            }

            let recv_buf = Bytes::from(recv_buf);
            Ok(recv_displs
                .iter()
                .zip(&recv_counts)
                .map(|(&at, &n)| recv_buf.slice(at as usize..(at + n) as usize))
                .collect())
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

/// Report `result`'s error to the whole pool before returning it.
///
/// Use around phases where a local failure would otherwise leave peers
/// blocked in a receive or barrier.
pub fn abort_on_error<C, T>(comm: &C, result: Result<T, ScalerError>) -> Result<T, ScalerError>
where
    C: Communicator + ?Sized,
{
    if let Err(e) = &result {
        if !matches!(e, ScalerError::PoolAborted(_)) {
            comm.abort(&e.to_string());
        }
    }
    result
}
