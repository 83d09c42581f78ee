//! Collective bulk phase: global shape, per-process hyperslab and the single
//! collective transfer of the `data` dataset.

use crate::algs::communicator::Communicator;
use crate::algs::hyperslab::{DATASET_RANK, Hyperslab, global_shape};
use crate::algs::layout::LocalLayout;
use crate::checkpoint_error::CheckpointError;
use crate::data::element::Element;
use crate::data::grid::BlockGrid;
use crate::debug_invariants::DebugInvariants;
use crate::io::{CollectiveContainer, DATA_DATASET, DatasetInfo};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Where this process's local buffer lands in the global dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BulkPlan {
    pub layout: LocalLayout,
    /// Global dataset shape (Z, Y, X, C).
    pub shape: [u64; DATASET_RANK],
    pub slab: Hyperslab,
}

impl BulkPlan {
    /// Plan the transfer for `grid` with `channels` values per cell.
    ///
    /// Fails when the process's hyperslab would reach past the global
    /// dataset, which happens when the process coordinate or resident block
    /// counts disagree with the global block counts.
    pub fn for_grid<G: BlockGrid>(grid: &G, channels: usize) -> Result<Self, CheckpointError> {
        let layout = LocalLayout::from_grid(grid, channels);
        layout.debug_assert_invariants();
        let shape = global_shape(grid.blocks_per_dim(), grid.block_size(), channels);
        let slab = layout.hyperslab(grid.process_coords());
        slab.check_within(&shape)?;
        warn_if_non_uniform(grid);
        Ok(Self {
            layout,
            shape,
            slab,
        })
    }

    /// Bytes of the local buffer for element type `R`.
    pub fn local_bytes<R: Element>(&self) -> u64 {
        self.slab.len() * R::KIND.width() as u64
    }

    /// Bytes of the whole global dataset for element type `R`.
    pub fn global_bytes<R: Element>(&self) -> u64 {
        self.shape.iter().product::<u64>() * R::KIND.width() as u64
    }

    /// Log the allocation sizes, as a dump does on rank 0.
    pub fn report_allocation<R: Element>(&self) {
        log::info!(
            "Allocating {:.3} GB of checkpoint data (Total {:.3} GB)",
            self.local_bytes::<R>() as f64 / GIB,
            self.global_bytes::<R>() as f64 / GIB
        );
    }
}

/// Offsets are `coords * local_extent`, which only tiles the global dataset
/// when every process holds the same number of blocks per axis.
fn warn_if_non_uniform<G: BlockGrid>(grid: &G) {
    let global = grid.blocks_per_dim();
    let resident = grid.resident_blocks_per_dim();
    for a in 0..3 {
        if resident[a] != 0 && global[a] % resident[a] != 0 {
            log::warn!(
                "axis {a}: {} global blocks do not split evenly into {} resident blocks; \
                 hyperslabs of other processes may overlap or leave gaps",
                global[a],
                resident[a]
            );
        }
    }
}

/// Create the `data` dataset of `shape` in precision `R`. Collective.
pub fn create_data<H, R, C>(
    handle: &mut H,
    shape: &[u64; DATASET_RANK],
    comm: &C,
) -> Result<DatasetInfo, CheckpointError>
where
    H: CollectiveContainer,
    R: Element,
    C: Communicator,
{
    handle
        .create_dataset(DATA_DATASET, R::KIND, shape, comm)
        .inspect_err(|e| log::error!("rank {}: creating `{DATA_DATASET}` failed: {e}", comm.rank()))
}

/// Look up the `data` dataset and check it matches `shape` and precision `R`.
/// Local.
pub fn locate_data<H, R>(handle: &H, shape: &[u64; DATASET_RANK]) -> Result<DatasetInfo, CheckpointError>
where
    H: CollectiveContainer,
    R: Element,
{
    let info = handle.dataset(DATA_DATASET)?;
    if info.shape != shape.as_slice() {
        return Err(CheckpointError::ShapeMismatch {
            name: info.name,
            expected: shape.to_vec(),
            found: info.shape,
        });
    }
    if info.kind != R::KIND {
        return Err(CheckpointError::PrecisionMismatch {
            name: info.name,
            expected: R::KIND.width(),
            found: info.kind.width(),
        });
    }
    Ok(info)
}

/// Write `data` into `slab` of `dataset`. Collective; pass an empty slab and
/// buffer to take part without contributing.
pub fn write_slab<H, R, C>(
    handle: &mut H,
    dataset: &DatasetInfo,
    slab: &Hyperslab,
    data: &[R],
    comm: &C,
) -> Result<(), CheckpointError>
where
    H: CollectiveContainer,
    R: Element,
    C: Communicator,
{
    log::debug!(
        "rank {}: writing {} values at {:?}",
        comm.rank(),
        slab.len(),
        slab.offset
    );
    handle
        .write_hyperslab(dataset, slab, data, comm)
        .inspect_err(|e| log::error!("rank {}: {e}", comm.rank()))
}

/// Read `slab` of `dataset` into `data`. Collective.
pub fn read_slab<H, R, C>(
    handle: &mut H,
    dataset: &DatasetInfo,
    slab: &Hyperslab,
    data: &mut [R],
    comm: &C,
) -> Result<(), CheckpointError>
where
    H: CollectiveContainer,
    R: Element,
    C: Communicator,
{
    log::debug!(
        "rank {}: reading {} values at {:?}",
        comm.rank(),
        slab.len(),
        slab.offset
    );
    handle
        .read_hyperslab(dataset, slab, data, comm)
        .inspect_err(|e| log::error!("rank {}: {e}", comm.rank()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::block::CellBlock;
    use crate::data::grid::{CartesianBlockGrid, GridSpec};

    fn grid(coords: [usize; 3], resident: [usize; 3]) -> CartesianBlockGrid<CellBlock<f64>> {
        let spec = GridSpec::uniform_decomposition([8, 8, 8], [2, 1, 1], coords, resident).unwrap();
        CartesianBlockGrid::try_new(spec, |_| CellBlock::new([8, 8, 8])).unwrap()
    }

    #[test]
    fn plan_for_second_process_along_x() {
        let plan = BulkPlan::for_grid(&grid([1, 0, 0], [1, 1, 1]), 1).unwrap();
        assert_eq!(plan.shape, [8, 8, 16, 1]);
        assert_eq!(plan.slab.offset, [0, 0, 8, 0]);
        assert_eq!(plan.slab.count, [8, 8, 8, 1]);
        assert_eq!(plan.local_bytes::<f32>(), 512 * 4);
        assert_eq!(plan.global_bytes::<f64>(), 1024 * 8);
    }

    #[test]
    fn degenerate_process_has_empty_slab() {
        let spec = GridSpec::unit_cube([8, 8, 8], [2, 1, 1], [1, 0, 0], [0, 0, 0]).unwrap();
        let g = CartesianBlockGrid::try_new(spec, |_| CellBlock::<f64>::new([8, 8, 8])).unwrap();
        let plan = BulkPlan::for_grid(&g, 3).unwrap();
        assert!(plan.slab.is_empty());
        assert_eq!(plan.shape, [8, 8, 16, 3]);
    }
}
