//! Shared-container I/O for checkpoint and restore.
//!
//! The storage runtime is reached through three traits:
//! [`ContainerBackend`] creates and opens containers, [`SerialContainer`] is
//! the single-writer handle used for the metadata phase and
//! [`CollectiveContainer`] is the handle every rank holds during the bulk
//! phase.
//!
//! [`h5::Hdf5Backend`] (feature `hdf5`, on by default) stores checkpoints as
//! HDF5 files. [`native::NativeBackend`] is a dependency-free alternative with
//! its own raw layout.

pub mod bulk;
pub mod checkpoint;
#[cfg(feature = "hdf5")]
pub mod h5;
pub mod mesh_writer;
pub mod native;
pub mod xdmf;

use crate::algs::communicator::{Communicator, NoComm};
use crate::algs::hyperslab::{DATASET_RANK, Hyperslab};
use crate::checkpoint_error::CheckpointError;
use crate::data::element::{Element, ElementKind};
use std::path::Path;

/// Backend used by [`checkpoint::Checkpointer::new`].
#[cfg(feature = "hdf5")]
pub type DefaultBackend = h5::Hdf5Backend;
/// Backend used by [`checkpoint::Checkpointer::new`].
#[cfg(not(feature = "hdf5"))]
pub type DefaultBackend = native::NativeBackend;

/// Name of the global field dataset.
pub const DATA_DATASET: &str = "data";
/// Names of the mesh-coordinate datasets, x, y, z.
pub const MESH_DATASETS: [&str; 3] = ["/vx", "/vy", "/vz"];

/// Access mode of a collectively opened container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// A collective step a rank can join without holding a container handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectiveOp {
    CreateDataset,
    Transfer,
}

/// Description of one dataset stored in a container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetInfo {
    pub name: String,
    pub kind: ElementKind,
    pub shape: Vec<u64>,
    /// Backend-defined location of the first element (a byte offset for the
    /// native container, unused by HDF5).
    pub location: u64,
}

impl DatasetInfo {
    pub fn len(&self) -> u64 {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> u64 {
        self.len() * self.kind.width() as u64
    }
}

/// Byte order advertised for raw binary references.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn as_str(self) -> &'static str {
        match self {
            Endian::Little => "Little",
            Endian::Big => "Big",
        }
    }
}

/// How the sidecar points at a dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataLocator {
    /// `file:/path` inside a hierarchical container.
    Hdf { file: String, path: String },
    /// Raw values at byte `seek` of `file`.
    Binary { file: String, seek: u64, endian: Endian },
}

/// Entry point of a storage runtime.
pub trait ContainerBackend {
    type Writer: SerialContainer;
    type Handle: CollectiveContainer;

    /// Default container file extension, without the dot.
    const EXTENSION: &'static str;

    /// Create (truncating) a container. Single writer only.
    fn create(&self, path: &Path) -> Result<Self::Writer, CheckpointError>;

    /// Open an existing container on every rank of `comm`.
    fn open_collective<C: Communicator>(
        &self,
        path: &Path,
        mode: AccessMode,
        comm: &C,
    ) -> Result<Self::Handle, CheckpointError>;

    /// Open an existing container read-only outside any group, e.g. for
    /// inspection tools.
    fn open(&self, path: &Path) -> Result<Self::Handle, CheckpointError> {
        self.open_collective(path, AccessMode::ReadOnly, &NoComm)
    }

    /// Join `op` without a handle, after a local failure, so that the rest of
    /// the group is not left waiting.
    fn abstain<C: Communicator>(&self, comm: &C, op: CollectiveOp);

    /// Remove a container left behind by a failed single-writer phase.
    fn discard(&self, path: &Path) -> Result<(), CheckpointError>;
}

/// Handle held by the single writer during the metadata phase.
pub trait SerialContainer {
    /// Store a 1-D `f64` dataset.
    fn write_vector(&mut self, name: &str, values: &[f64]) -> Result<DatasetInfo, CheckpointError>;

    fn close(self) -> Result<(), CheckpointError>;
}

/// Handle held by every rank during the bulk phase.
///
/// Methods taking a communicator are collective: every rank calls them the
/// same number of times in the same order, and they return only after the
/// group has synchronized, even when they fail locally.
pub trait CollectiveContainer {
    /// Create a dataset of `shape`. Collective.
    fn create_dataset<C: Communicator>(
        &mut self,
        name: &str,
        kind: ElementKind,
        shape: &[u64],
        comm: &C,
    ) -> Result<DatasetInfo, CheckpointError>;

    /// Look up an existing dataset. Local.
    fn dataset(&self, name: &str) -> Result<DatasetInfo, CheckpointError>;

    /// Write `data`, packed row-major over `slab.count`, into `slab`.
    /// Collective.
    fn write_hyperslab<R: Element, C: Communicator>(
        &mut self,
        dataset: &DatasetInfo,
        slab: &Hyperslab,
        data: &[R],
        comm: &C,
    ) -> Result<(), CheckpointError>;

    /// Read `slab` into `data`, packed row-major over `slab.count`.
    /// Collective.
    fn read_hyperslab<R: Element, C: Communicator>(
        &mut self,
        dataset: &DatasetInfo,
        slab: &Hyperslab,
        data: &mut [R],
        comm: &C,
    ) -> Result<(), CheckpointError>;

    /// Read a whole 1-D `f64` dataset such as `/vx`. Local.
    fn read_vector(&mut self, name: &str) -> Result<Vec<f64>, CheckpointError>;

    /// Sidecar reference for `dataset`.
    fn locate(&self, dataset: &DatasetInfo) -> DataLocator;

    fn close(self) -> Result<(), CheckpointError>;
}

/// Check that `len` values of `R` can move through `slab` of `dataset` and
/// return the dataset's rank-4 shape.
pub(crate) fn check_transfer<R: Element>(
    dataset: &DatasetInfo,
    slab: &Hyperslab,
    len: usize,
) -> Result<[u64; DATASET_RANK], CheckpointError> {
    if dataset.kind != R::KIND {
        return Err(CheckpointError::PrecisionMismatch {
            name: dataset.name.clone(),
            expected: R::KIND.width(),
            found: dataset.kind.width(),
        });
    }
    let shape: [u64; DATASET_RANK] = dataset.shape.as_slice().try_into().map_err(|_| {
        CheckpointError::Format(format!(
            "dataset `{}` has rank {}, hyperslabs need rank {DATASET_RANK}",
            dataset.name,
            dataset.shape.len()
        ))
    })?;
    slab.check_within(&shape)?;
    if len as u64 != slab.len() {
        return Err(CheckpointError::BufferSizeMismatch {
            expected: slab.len() as usize,
            found: len,
        });
    }
    Ok(shape)
}

/// Last path component, the form sidecar references use.
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
