//! CheckpointError: unified error type for block-checkpoint public APIs
//!
//! Every dump/restore failure is logged where it happens and then surfaced to
//! the caller through this enum.

use thiserror::Error;

/// Unified error type for checkpoint and restore operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    /// Creating or opening the shared container failed.
    #[error("failed to open container `{path}`: {reason}")]
    ContainerOpen { path: String, reason: String },
    /// A collective hyperslab transfer reported failure on this rank.
    #[error("collective {op} of dataset `{dataset}` failed: {reason}")]
    CollectiveTransfer {
        op: &'static str,
        dataset: String,
        reason: String,
    },
    /// A resident block does not fit the local block lattice, so its cells
    /// would land outside the local buffer.
    #[error("block {block:?} lies outside the resident block lattice {lattice:?}")]
    InternalBoundsViolation {
        block: [usize; 3],
        lattice: [usize; 3],
    },
    /// The local buffer length disagrees with the local extent.
    #[error("local buffer holds {found} values, layout requires {expected}")]
    BufferSizeMismatch { expected: usize, found: usize },
    /// The grid reported the same block index twice.
    #[error("block {0:?} is resident more than once")]
    DuplicateBlock([usize; 3]),
    /// A hyperslab reaches past the dataset it selects from.
    #[error("hyperslab offset {offset:?} count {count:?} exceeds dataset shape {shape:?}")]
    HyperslabOutOfBounds {
        offset: [u64; 4],
        count: [u64; 4],
        shape: Vec<u64>,
    },
    /// The container has no dataset under this name.
    #[error("dataset `{0}` not found in container")]
    MissingDataset(String),
    /// A dataset with this name already exists.
    #[error("dataset `{0}` already exists in container")]
    DatasetExists(String),
    /// The stored dataset shape differs from the shape the grid expects.
    #[error("dataset `{name}` has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<u64>,
        found: Vec<u64>,
    },
    /// The stored element width differs from the requested precision.
    #[error("dataset `{name}` stores {found}-byte elements, expected {expected}-byte elements")]
    PrecisionMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    /// Malformed or unsupported container contents.
    #[error("container format error: {0}")]
    Format(String),
    /// Invalid mesh description.
    #[error("mesh error: {0}")]
    Mesh(String),
    /// Inconsistent grid or process layout.
    #[error("invalid grid layout: {0}")]
    InvalidLayout(String),
    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),
    /// Failure reported by the HDF5 library.
    #[error("HDF5 error: {0}")]
    Hdf5(String),
    /// Underlying file-system failure.
    #[error("I/O error: {0}")]
    Io(String),
    /// Message-passing runtime failure.
    #[error("communicator error: {0}")]
    Comm(String),
}

impl From<std::io::Error> for CheckpointError {
    fn from(e: std::io::Error) -> Self {
        CheckpointError::Io(e.to_string())
    }
}

#[cfg(feature = "hdf5")]
impl From<hdf5::Error> for CheckpointError {
    fn from(e: hdf5::Error) -> Self {
        CheckpointError::Hdf5(e.to_string())
    }
}

impl CheckpointError {
    /// Wraps an I/O failure while creating or opening `path`.
    pub(crate) fn open(path: &std::path::Path, e: impl std::fmt::Display) -> Self {
        CheckpointError::ContainerOpen {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }

    /// Wraps a failure inside a collective transfer.
    pub(crate) fn transfer(op: &'static str, dataset: &str, e: impl std::fmt::Display) -> Self {
        CheckpointError::CollectiveTransfer {
            op,
            dataset: dataset.to_string(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert_to_strings() {
        let e: CheckpointError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(e, CheckpointError::Io("gone".into()));
    }

    #[test]
    fn display_names_the_offending_block() {
        let e = CheckpointError::InternalBoundsViolation {
            block: [2, 0, 0],
            lattice: [2, 1, 1],
        };
        assert_eq!(
            e.to_string(),
            "block [2, 0, 0] lies outside the resident block lattice [2, 1, 1]"
        );
    }
}
