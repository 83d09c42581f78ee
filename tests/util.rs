#![allow(dead_code)]
use block_checkpoint::io::{CollectiveContainer, DATA_DATASET, DefaultBackend};
use block_checkpoint::prelude::*;
use std::path::{Path, PathBuf};

pub type ScalarGrid = CartesianBlockGrid<CellBlock<f64>>;
pub type VectorGrid = CartesianBlockGrid<CellBlock<[f64; 3]>>;

/// Global x-fastest linear index of cell `g` in a grid of `cells` cells.
pub fn linear(cells: [usize; 3], g: [usize; 3]) -> usize {
    g[0] + cells[0] * (g[1] + cells[1] * g[2])
}

/// Spec of `rank` in a `process_dims` decomposition where every process
/// holds `resident` blocks of `block_size` cells.
pub fn spec_for(
    block_size: [usize; 3],
    process_dims: [usize; 3],
    rank: usize,
    resident: [usize; 3],
) -> GridSpec {
    let coords = cartesian_coords(rank, process_dims);
    GridSpec::uniform_decomposition(block_size, process_dims, coords, resident).unwrap()
}

/// Global cell coordinate of `cell` in resident block `block` of `spec`.
pub fn global_cell(spec: &GridSpec, block: [usize; 3], cell: [usize; 3]) -> [usize; 3] {
    [0, 1, 2].map(|a| {
        (spec.process_coords[a] * spec.resident_blocks_per_dim[a] + block[a]) * spec.block_size[a]
            + cell[a]
    })
}

pub fn global_cells(spec: &GridSpec) -> [usize; 3] {
    [0, 1, 2].map(|a| spec.blocks_per_dim[a] * spec.block_size[a])
}

/// Scalar grid whose cell value is the cell's global linear index.
pub fn indexed_scalar_grid(spec: GridSpec) -> ScalarGrid {
    let s = spec.clone();
    CartesianBlockGrid::try_new(spec, |b| {
        CellBlock::from_fn(s.block_size, |c| linear(global_cells(&s), global_cell(&s, b, c)) as f64)
    })
    .unwrap()
}

/// Vector grid with components `3 * index + c` (exact in `f32` for small grids).
pub fn indexed_vector_grid(spec: GridSpec) -> VectorGrid {
    let s = spec.clone();
    CartesianBlockGrid::try_new(spec, |b| {
        CellBlock::from_fn(s.block_size, |c| {
            let i = linear(global_cells(&s), global_cell(&s, b, c)) as f64;
            [3.0 * i, 3.0 * i + 1.0, 3.0 * i + 2.0]
        })
    })
    .unwrap()
}

/// A grid with the same layout and every cell at `C::default()`.
pub fn blank<C: Clone + Default + Send + Sync>(spec: GridSpec) -> CartesianBlockGrid<CellBlock<C>> {
    let size = spec.block_size;
    CartesianBlockGrid::try_new(spec, |_| CellBlock::new(size)).unwrap()
}

/// Path of checkpoint `stem` in `dir` under the default configuration.
pub fn container(dir: &Path, stem: &str) -> PathBuf {
    CheckpointConfig::default().container_path(dir, stem)
}

/// Whole `data` dataset of a container written by the default backend, with
/// its shape.
pub fn read_data<R: Element>(path: &Path) -> (Vec<u64>, Vec<R>) {
    let mut c = DefaultBackend::default().open(path).unwrap();
    let ds = c.dataset(DATA_DATASET).unwrap();
    let count: [u64; 4] = ds.shape.clone().try_into().unwrap();
    let slab = Hyperslab {
        offset: [0; 4],
        count,
    };
    let mut out = vec![R::zero(); slab.len() as usize];
    c.read_hyperslab(&ds, &slab, &mut out, &NoComm).unwrap();
    (ds.shape, out)
}
