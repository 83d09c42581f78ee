#![cfg_attr(docsrs, feature(doc_cfg))]
//! # block-checkpoint
//!
//! block-checkpoint writes and reads checkpoints of a distributed,
//! block-structured simulation grid. Every process of a group contributes the
//! blocks it holds to one shared container, where they form a single global
//! 4-D array `(Z, Y, X, Channel)`, and every process can later read its part
//! back.
//!
//! ## Features
//! - Layout transform between scattered resident blocks and one contiguous,
//!   channel-interleaved local buffer, parallel over disjoint regions with rayon
//! - Hyperslab arithmetic from Cartesian process coordinates
//! - Two-phase collective protocol: rank 0 writes the mesh, then every rank
//!   joins one collective transfer of the field
//! - HDF5 shared container (feature `hdf5`, on by default) or a
//!   dependency-free native container, each with an XDMF descriptor sidecar
//!   for viewers
//! - Pluggable process groups: serial, in-process threads, MPI
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! block-checkpoint = "0.1"
//! # Optional features:
//! # features = ["mpi-support", "hdf5-mpio"]
//! ```
//!
//! ```no_run
//! use block_checkpoint::prelude::*;
//! # fn main() -> Result<(), CheckpointError> {
//! let spec = GridSpec::unit_cube([8, 8, 8], [2, 2, 2], [0, 0, 0], [2, 2, 2])?;
//! let grid = CartesianBlockGrid::try_new(spec, |_| CellBlock::<f64>::new([8, 8, 8]))?;
//! let report = Checkpointer::new().dump::<f32, _, _, _>(
//!     &grid,
//!     &ScalarStreamer,
//!     &NoComm,
//!     0.0,
//!     "state_0000",
//!     std::path::Path::new("."),
//! )?;
//! println!("wrote {}", report.container.display());
//! # Ok(())
//! # }
//! ```
//!
//! Diagnostics go through the `log` facade; install any logger to see them.

pub mod algs;
pub mod checkpoint_error;
pub mod config;
pub mod data;
pub mod debug_invariants;
pub mod io;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{
        Communicator, NoComm, ThreadComm, cartesian_coords, run_group,
    };
    pub use crate::algs::hyperslab::{Hyperslab, global_shape};
    pub use crate::algs::layout::{LocalLayout, gather_blocks, scatter_blocks};
    pub use crate::checkpoint_error::CheckpointError;
    pub use crate::config::CheckpointConfig;
    pub use crate::data::block::CellBlock;
    pub use crate::data::element::{Element, ElementKind};
    pub use crate::data::grid::{BlockGrid, BlockMut, BlockRef, CartesianBlockGrid, GridSpec};
    pub use crate::data::mesh_map::MeshMap;
    pub use crate::data::streamer::{
        AttributeKind, ChannelStreamer, ComponentStreamer, ScalarStreamer, TensorStreamer,
        VectorStreamer,
    };
    pub use crate::io::checkpoint::{
        CheckpointStage, Checkpointer, DumpReport, RestoreReport, dump_grid, restore_grid,
    };
    #[cfg(feature = "hdf5")]
    pub use crate::io::h5::Hdf5Backend;
    pub use crate::io::native::NativeBackend;
    pub use crate::io::{CollectiveContainer, ContainerBackend, DefaultBackend, SerialContainer};
}
