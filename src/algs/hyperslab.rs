//! Rectangular selections of the global (Z, Y, X, Channel) dataset.
//!
//! Offsets and counts are in elements of the global index space, never bytes.
//! The dataset is row-major over (Z, Y, X, C), so channels are innermost.

use crate::checkpoint_error::CheckpointError;

/// Number of dataset axes: Z, Y, X, Channel.
pub const DATASET_RANK: usize = 4;

/// Global dataset shape `(Z, Y, X, C)` for a grid of `blocks_per_dim`
/// (x, y, z) blocks of `block_size` (x, y, z) cells.
pub fn global_shape(
    blocks_per_dim: [usize; 3],
    block_size: [usize; 3],
    channels: usize,
) -> [u64; DATASET_RANK] {
    [
        (blocks_per_dim[2] * block_size[2]) as u64,
        (blocks_per_dim[1] * block_size[1]) as u64,
        (blocks_per_dim[0] * block_size[0]) as u64,
        channels as u64,
    ]
}

/// One contiguous stretch shared by the dataset and the packed local buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlabRun {
    /// First element in the global dataset.
    pub dataset_start: u64,
    /// First element in the packed local buffer.
    pub buffer_start: u64,
    pub len: u64,
}

/// Offset/count selection over the four dataset axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Hyperslab {
    pub offset: [u64; DATASET_RANK],
    pub count: [u64; DATASET_RANK],
}

impl Hyperslab {
    /// Selection owned by the process at `process_coords` (x, y, z) whose
    /// local sub-domain spans `local_extent` (x, y, z) cells.
    pub fn for_process(
        process_coords: [usize; 3],
        local_extent: [usize; 3],
        channels: usize,
    ) -> Self {
        let [lx, ly, lz] = local_extent.map(|n| n as u64);
        let [px, py, pz] = process_coords.map(|p| p as u64);
        Self {
            offset: [pz * lz, py * ly, px * lx, 0],
            count: [lz, ly, lx, channels as u64],
        }
    }

    /// Zero-extent selection, used by ranks that join a collective transfer
    /// without contributing data.
    pub fn empty() -> Self {
        Self {
            offset: [0; DATASET_RANK],
            count: [0; DATASET_RANK],
        }
    }

    /// Number of selected elements.
    #[inline]
    pub fn len(&self) -> u64 {
        self.count.iter().product()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the selection lies inside a dataset of `shape`. Empty
    /// selections fit any shape.
    pub fn fits_within(&self, shape: &[u64]) -> bool {
        if self.is_empty() {
            return true;
        }
        shape.len() == DATASET_RANK
            && (0..DATASET_RANK).all(|a| {
                self.offset[a]
                    .checked_add(self.count[a])
                    .is_some_and(|end| end <= shape[a])
            })
    }

    pub fn check_within(&self, shape: &[u64]) -> Result<(), CheckpointError> {
        if self.fits_within(shape) {
            Ok(())
        } else {
            Err(CheckpointError::HyperslabOutOfBounds {
                offset: self.offset,
                count: self.count,
                shape: shape.to_vec(),
            })
        }
    }

    pub fn contains(&self, index: [u64; DATASET_RANK]) -> bool {
        (0..DATASET_RANK)
            .all(|a| index[a] >= self.offset[a] && index[a] < self.offset[a] + self.count[a])
    }

    pub fn overlaps(&self, other: &Hyperslab) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && (0..DATASET_RANK).all(|a| {
                self.offset[a] < other.offset[a] + other.count[a]
                    && other.offset[a] < self.offset[a] + self.count[a]
            })
    }

    /// Split the selection into maximal contiguous runs, in buffer order.
    ///
    /// Trailing axes that are selected in full merge into the run of the axis
    /// before them, so a slab covering whole X rows is written row-plane by
    /// row-plane rather than row by row. `shape` must contain the selection.
    pub fn runs(&self, shape: &[u64; DATASET_RANK]) -> Vec<SlabRun> {
        if self.is_empty() {
            return Vec::new();
        }
        let full = |a: usize| self.offset[a] == 0 && self.count[a] == shape[a];
        let mut inner = DATASET_RANK - 1;
        while inner > 0 && full(inner) {
            inner -= 1;
        }
        let run_len: u64 = self.count[inner..].iter().product();
        // Element stride of each axis in the dataset.
        let mut stride = [1u64; DATASET_RANK];
        for a in (0..DATASET_RANK - 1).rev() {
            stride[a] = stride[a + 1] * shape[a + 1];
        }
        let base: u64 = (0..DATASET_RANK).map(|a| self.offset[a] * stride[a]).sum();

        let outer = &self.count[..inner];
        let n_runs: u64 = outer.iter().product();
        let mut runs = Vec::with_capacity(n_runs as usize);
        let mut pos = vec![0u64; inner];
        for r in 0..n_runs {
            let start = base + pos.iter().zip(&stride).map(|(p, s)| p * s).sum::<u64>();
            runs.push(SlabRun {
                dataset_start: start,
                buffer_start: r * run_len,
                len: run_len,
            });
            // odometer over the outer axes, last fastest
            for a in (0..inner).rev() {
                pos[a] += 1;
                if pos[a] < outer[a] {
                    break;
                }
                pos[a] = 0;
            }
        }
        runs
    }
}
