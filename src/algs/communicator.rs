//! Thin façade over the process group: rank, size and barrier.
//!
//! Collective I/O needs nothing more from the message-passing runtime. Groups
//! come in three flavours: a serial group of one ([`NoComm`]), a group of
//! threads in one process ([`ThreadComm`]) and MPI ([`MpiComm`], feature
//! `mpi-support`).

use std::sync::{Arc, Barrier};

/// A fixed-size group of cooperating processes.
pub trait Communicator {
    /// This process's rank in `0..size()`.
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    /// Block until every member of the group has called `barrier`.
    fn barrier(&self);

    /// The designated single writer.
    #[inline]
    fn is_root(&self) -> bool {
        self.rank() == 0
    }

    /// Whether members live in separate processes, so a file opened by one
    /// member is not shared with the others.
    fn spans_processes(&self) -> bool {
        false
    }

    /// Raw MPI communicator for MPI-IO file access, if the group has one.
    #[cfg(feature = "hdf5-mpio")]
    fn raw_mpi(&self) -> Option<mpi::ffi::MPI_Comm> {
        None
    }
}

/// Serial group of one process; `barrier` is a no-op.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn barrier(&self) {}
}

// --- ThreadComm: one group member per thread ---

/// Group member whose peers are threads of the same process.
#[derive(Clone, Debug)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    barrier: Arc<Barrier>,
}

impl ThreadComm {
    /// Handles for every rank of a new `size`-member group.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let barrier = Arc::new(Barrier::new(size));
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                size,
                barrier: Arc::clone(&barrier),
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }
    fn barrier(&self) {
        self.barrier.wait();
    }
}

/// Run `f` once per rank of a `size`-member [`ThreadComm`] group, each on
/// its own scoped thread, and collect the results in rank order.
pub fn run_group<T, F>(size: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(ThreadComm) -> T + Sync,
{
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = ThreadComm::group(size)
            .into_iter()
            .map(|comm| s.spawn(move || f(comm)))
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(v) => v,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

/// Cartesian coordinate of `rank` in a `dims` process grid, last axis
/// fastest (the `MPI_Cart_create` ordering).
pub fn cartesian_coords(rank: usize, dims: [usize; 3]) -> [usize; 3] {
    [
        rank / (dims[1] * dims[2]),
        (rank / dims[2]) % dims[1],
        rank % dims[2],
    ]
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::Communicator;
    use crate::checkpoint_error::CheckpointError;
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as MpiCommunicator, CommunicatorCollectives};

    /// `MPI_COMM_WORLD` group; finalizes MPI when dropped.
    pub struct MpiComm {
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
        _universe: Universe,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, CheckpointError> {
            let universe = mpi::initialize()
                .ok_or_else(|| CheckpointError::Comm("MPI is already initialized".into()))?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                world,
                rank,
                size,
                _universe: universe,
            })
        }

        pub fn world(&self) -> &SimpleCommunicator {
            &self.world
        }
    }

    impl Communicator for MpiComm {
        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }
        fn barrier(&self) {
            self.world.barrier();
        }
        fn spans_processes(&self) -> bool {
            self.size > 1
        }
        #[cfg(feature = "hdf5-mpio")]
        fn raw_mpi(&self) -> Option<mpi::ffi::MPI_Comm> {
            use mpi::raw::AsRaw;
            Some(self.world.as_raw())
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn no_comm_is_single_root() {
        let comm = NoComm;
        assert_eq!((comm.rank(), comm.size()), (0, 1));
        assert!(comm.is_root());
        comm.barrier();
    }

    #[test]
    fn barrier_orders_phases() {
        let arrived = AtomicUsize::new(0);
        let seen = run_group(4, |comm| {
            arrived.fetch_add(1, Ordering::SeqCst);
            comm.barrier();
            arrived.load(Ordering::SeqCst)
        });
        assert_eq!(seen, vec![4; 4]);
    }

    #[test]
    fn results_come_back_in_rank_order() {
        let ranks = run_group(3, |comm| (comm.rank(), comm.size()));
        assert_eq!(ranks, vec![(0, 3), (1, 3), (2, 3)]);
    }

    #[test]
    fn cartesian_coords_last_axis_fastest() {
        let dims = [2, 3, 2];
        assert_eq!(cartesian_coords(0, dims), [0, 0, 0]);
        assert_eq!(cartesian_coords(1, dims), [0, 0, 1]);
        assert_eq!(cartesian_coords(2, dims), [0, 1, 0]);
        assert_eq!(cartesian_coords(11, dims), [1, 2, 1]);
    }
}
