//! Grid container seam and a Cartesian reference implementation.
//!
//! The checkpoint code only needs what [`BlockGrid`] exposes: the block shape,
//! where this process sits in the Cartesian process grid, which blocks it
//! holds, and the mesh spacing per axis.

use crate::checkpoint_error::CheckpointError;
use crate::data::mesh_map::MeshMap;
use crate::debug_invariants::DebugInvariants;

/// Shared borrow of one resident block for a single transform pass.
#[derive(Debug)]
pub struct BlockRef<'a, B> {
    /// Block index within this process's resident lattice.
    pub index: [usize; 3],
    pub block: &'a B,
}

/// Exclusive borrow of one resident block for a single transform pass.
#[derive(Debug)]
pub struct BlockMut<'a, B> {
    pub index: [usize; 3],
    pub block: &'a mut B,
}

/// A process-local view of a block-structured grid.
pub trait BlockGrid {
    type Block: Send + Sync;

    /// Cells per block along x, y, z.
    fn block_size(&self) -> [usize; 3];
    /// This process's coordinate in the Cartesian process grid.
    fn process_coords(&self) -> [usize; 3];
    /// Resident blocks along each axis on this process.
    fn resident_blocks_per_dim(&self) -> [usize; 3];
    /// Blocks along each axis of the whole grid.
    fn blocks_per_dim(&self) -> [usize; 3];
    fn resident_blocks(&self) -> Vec<BlockRef<'_, Self::Block>>;
    fn resident_blocks_mut(&mut self) -> Vec<BlockMut<'_, Self::Block>>;
    /// Mesh spacing along `axis` (0 = x, 1 = y, 2 = z) for the whole grid.
    fn mesh_map(&self, axis: usize) -> &MeshMap;
}

/// Layout parameters for [`CartesianBlockGrid`].
#[derive(Clone, Debug, PartialEq)]
pub struct GridSpec {
    pub block_size: [usize; 3],
    pub blocks_per_dim: [usize; 3],
    pub process_coords: [usize; 3],
    pub resident_blocks_per_dim: [usize; 3],
    /// Global mesh per axis; `mesh[a].ncells()` must equal
    /// `blocks_per_dim[a] * block_size[a]`.
    pub mesh: [MeshMap; 3],
}

impl GridSpec {
    /// Uniform unit-cube mesh for a grid of `blocks_per_dim` blocks.
    pub fn unit_cube(
        block_size: [usize; 3],
        blocks_per_dim: [usize; 3],
        process_coords: [usize; 3],
        resident_blocks_per_dim: [usize; 3],
    ) -> Result<Self, CheckpointError> {
        let axis = |a: usize| MeshMap::uniform(0.0, 1.0, blocks_per_dim[a] * block_size[a]);
        Ok(Self {
            block_size,
            blocks_per_dim,
            process_coords,
            resident_blocks_per_dim,
            mesh: [axis(0)?, axis(1)?, axis(2)?],
        })
    }

    /// Spec for the process at `process_coords` in a `process_dims` grid where
    /// every process holds `resident_blocks_per_dim` blocks.
    pub fn uniform_decomposition(
        block_size: [usize; 3],
        process_dims: [usize; 3],
        process_coords: [usize; 3],
        resident_blocks_per_dim: [usize; 3],
    ) -> Result<Self, CheckpointError> {
        let blocks = [0, 1, 2].map(|a| process_dims[a] * resident_blocks_per_dim[a]);
        Self::unit_cube(block_size, blocks, process_coords, resident_blocks_per_dim)
    }
}

/// Blocks held in a dense resident lattice, x-fastest.
#[derive(Clone, Debug)]
pub struct CartesianBlockGrid<B> {
    spec: GridSpec,
    blocks: Vec<B>,
}

impl<B> CartesianBlockGrid<B> {
    /// Build the local grid, creating each resident block with
    /// `make_block(block_index)`.
    pub fn try_new(
        spec: GridSpec,
        mut make_block: impl FnMut([usize; 3]) -> B,
    ) -> Result<Self, CheckpointError> {
        let [rx, ry, rz] = spec.resident_blocks_per_dim;
        let mut blocks = Vec::with_capacity(rx * ry * rz);
        for bz in 0..rz {
            for by in 0..ry {
                for bx in 0..rx {
                    blocks.push(make_block([bx, by, bz]));
                }
            }
        }
        let grid = Self { spec, blocks };
        grid.validate_invariants()?;
        Ok(grid)
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    fn slot(&self, index: [usize; 3]) -> Option<usize> {
        let [rx, ry, rz] = self.spec.resident_blocks_per_dim;
        (index[0] < rx && index[1] < ry && index[2] < rz)
            .then(|| index[0] + rx * (index[1] + ry * index[2]))
    }

    pub fn block(&self, index: [usize; 3]) -> Option<&B> {
        self.slot(index).map(|i| &self.blocks[i])
    }

    pub fn block_mut(&mut self, index: [usize; 3]) -> Option<&mut B> {
        self.slot(index).map(move |i| &mut self.blocks[i])
    }

    /// Apply `f(block_index, block)` to every resident block.
    pub fn for_each_block_mut(&mut self, mut f: impl FnMut([usize; 3], &mut B)) {
        for BlockMut { index, block } in self.lattice_mut() {
            f(index, block);
        }
        self.debug_assert_invariants();
    }

    fn lattice_index(&self, i: usize) -> [usize; 3] {
        let [rx, ry, _] = self.spec.resident_blocks_per_dim;
        [i % rx, (i / rx) % ry, i / (rx * ry)]
    }

    fn lattice_mut(&mut self) -> Vec<BlockMut<'_, B>> {
        let [rx, ry, _] = self.spec.resident_blocks_per_dim;
        self.blocks
            .iter_mut()
            .enumerate()
            .map(|(i, block)| BlockMut {
                index: [i % rx, (i / rx) % ry, i / (rx * ry)],
                block,
            })
            .collect()
    }
}

impl<B: Send + Sync> BlockGrid for CartesianBlockGrid<B> {
    type Block = B;

    fn block_size(&self) -> [usize; 3] {
        self.spec.block_size
    }

    fn process_coords(&self) -> [usize; 3] {
        self.spec.process_coords
    }

    fn resident_blocks_per_dim(&self) -> [usize; 3] {
        self.spec.resident_blocks_per_dim
    }

    fn blocks_per_dim(&self) -> [usize; 3] {
        self.spec.blocks_per_dim
    }

    fn resident_blocks(&self) -> Vec<BlockRef<'_, B>> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, block)| BlockRef {
                index: self.lattice_index(i),
                block,
            })
            .collect()
    }

    fn resident_blocks_mut(&mut self) -> Vec<BlockMut<'_, B>> {
        self.lattice_mut()
    }

    fn mesh_map(&self, axis: usize) -> &MeshMap {
        &self.spec.mesh[axis]
    }
}

impl<B> DebugInvariants for CartesianBlockGrid<B> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "CartesianBlockGrid");
    }

    fn validate_invariants(&self) -> Result<(), CheckpointError> {
        let s = &self.spec;
        for a in 0..3 {
            if s.block_size[a] == 0 {
                return Err(CheckpointError::InvalidLayout(format!(
                    "block size {:?} has a zero axis",
                    s.block_size
                )));
            }
            let local_end = (s.process_coords[a] + 1) * s.resident_blocks_per_dim[a];
            if s.resident_blocks_per_dim[a] > 0 && local_end > s.blocks_per_dim[a] {
                return Err(CheckpointError::InvalidLayout(format!(
                    "process {:?} with {:?} resident blocks reaches past the {:?} block lattice",
                    s.process_coords, s.resident_blocks_per_dim, s.blocks_per_dim
                )));
            }
            let cells = s.blocks_per_dim[a] * s.block_size[a];
            if s.mesh[a].ncells() != cells {
                return Err(CheckpointError::Mesh(format!(
                    "axis {a} mesh has {} cells, grid has {cells}",
                    s.mesh[a].ncells()
                )));
            }
        }
        let expected: usize = s.resident_blocks_per_dim.iter().product();
        if self.blocks.len() != expected {
            return Err(CheckpointError::InvalidLayout(format!(
                "{} blocks stored for a {:?} resident lattice",
                self.blocks.len(),
                s.resident_blocks_per_dim
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::block::CellBlock;

    fn grid(coords: [usize; 3]) -> CartesianBlockGrid<CellBlock<f64>> {
        let spec = GridSpec::uniform_decomposition([4, 4, 2], [2, 1, 1], coords, [2, 1, 3]).unwrap();
        CartesianBlockGrid::try_new(spec, |_| CellBlock::new([4, 4, 2])).unwrap()
    }

    #[test]
    fn resident_blocks_enumerate_lattice_x_fastest() {
        let g = grid([1, 0, 0]);
        let idx: Vec<_> = g.resident_blocks().iter().map(|b| b.index).collect();
        assert_eq!(idx[0], [0, 0, 0]);
        assert_eq!(idx[1], [1, 0, 0]);
        assert_eq!(idx[2], [0, 0, 1]);
        assert_eq!(idx.len(), 6);
        assert_eq!(g.blocks_per_dim(), [4, 1, 3]);
        assert_eq!(g.mesh_map(0).ncells(), 16);
    }

    #[test]
    fn block_lookup_is_bounded() {
        let mut g = grid([0, 0, 0]);
        assert!(g.block([1, 0, 2]).is_some());
        assert!(g.block([2, 0, 0]).is_none());
        g.for_each_block_mut(|[bx, _, bz], b| b.fill_with(|_| (bx + 10 * bz) as f64));
        assert_eq!(*g.block([1, 0, 2]).unwrap().get([0, 0, 0]), 21.0);
        *g.block_mut([0, 0, 1]).unwrap().get_mut([3, 3, 1]) = 7.0;
        assert_eq!(*g.block([0, 0, 1]).unwrap().get([3, 3, 1]), 7.0);
    }

    #[test]
    fn rejects_mesh_with_wrong_cell_count() {
        let mut spec =
            GridSpec::uniform_decomposition([4, 4, 4], [1, 1, 1], [0, 0, 0], [1, 1, 1]).unwrap();
        spec.mesh[1] = MeshMap::uniform(0.0, 1.0, 5).unwrap();
        let err = CartesianBlockGrid::try_new(spec, |_| ()).unwrap_err();
        assert!(matches!(err, CheckpointError::Mesh(_)));
    }

    #[test]
    fn rejects_process_outside_lattice() {
        let spec = GridSpec::unit_cube([2, 2, 2], [2, 1, 1], [2, 0, 0], [1, 1, 1]).unwrap();
        let err = CartesianBlockGrid::try_new(spec, |_| ()).unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidLayout(_)));
    }

    #[test]
    fn zero_resident_blocks_is_valid() {
        let spec = GridSpec::unit_cube([2, 2, 2], [1, 1, 1], [1, 0, 0], [0, 0, 0]).unwrap();
        let g = CartesianBlockGrid::try_new(spec, |_| ()).unwrap();
        assert!(g.resident_blocks().is_empty());
    }
}
