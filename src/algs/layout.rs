//! Layout transform between resident blocks and the flat local buffer.
//!
//! The local buffer has shape (localZ, localY, localX, C): the value of
//! channel `c` of local cell `(gx, gy, gz)` lives at
//! `C * (gx + NX * (gy + NY * gz)) + c`, where `g = block_index * block_size
//! + cell`.
//!
//! Scatter (dump) splits the buffer into x-rows, one per local `(gy, gz)`;
//! every row is written by exactly one worker from the blocks whose x-pencil
//! covers it. Gather (restore) hands each block to exactly one worker.
//! Neither direction needs locks.

use crate::algs::hyperslab::Hyperslab;
use crate::checkpoint_error::CheckpointError;
use crate::data::element::Element;
use crate::data::grid::{BlockGrid, BlockMut, BlockRef};
use crate::data::streamer::ChannelStreamer;
use crate::debug_invariants::DebugInvariants;
use itertools::iproduct;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Shape of one process's local sub-domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalLayout {
    block_size: [usize; 3],
    resident: [usize; 3],
    channels: usize,
}

impl LocalLayout {
    pub fn new(block_size: [usize; 3], resident: [usize; 3], channels: usize) -> Self {
        Self {
            block_size,
            resident,
            channels,
        }
    }

    pub fn from_grid<G: BlockGrid>(grid: &G, channels: usize) -> Self {
        Self::new(grid.block_size(), grid.resident_blocks_per_dim(), channels)
    }

    #[inline]
    pub fn block_size(&self) -> [usize; 3] {
        self.block_size
    }

    #[inline]
    pub fn resident(&self) -> [usize; 3] {
        self.resident
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Local extent in cells along x, y, z.
    #[inline]
    pub fn extent(&self) -> [usize; 3] {
        [0, 1, 2].map(|a| self.resident[a] * self.block_size[a])
    }

    /// Number of values in the local buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.extent().iter().product::<usize>() * self.channels
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values in one x-row of the local buffer.
    #[inline]
    pub fn row_len(&self) -> usize {
        self.extent()[0] * self.channels
    }

    /// Pencil (block row along x) covering local cell row `(gy, gz)`.
    #[inline]
    fn pencil_of(&self, gy: usize, gz: usize) -> usize {
        gy / self.block_size[1] + self.resident[1] * (gz / self.block_size[2])
    }

    /// Buffer offset of the first channel of `cell` in block `block`.
    #[inline]
    pub fn flat_index(&self, block: [usize; 3], cell: [usize; 3]) -> usize {
        let [nx, ny, _] = self.extent();
        let g = [0, 1, 2].map(|a| block[a] * self.block_size[a] + cell[a]);
        self.channels * (g[0] + nx * (g[1] + ny * g[2]))
    }

    /// Whether every cell of block `index` maps inside the local buffer.
    pub fn check_block(&self, index: [usize; 3]) -> Result<(), CheckpointError> {
        if (0..3).all(|a| index[a] < self.resident[a]) {
            Ok(())
        } else {
            Err(CheckpointError::InternalBoundsViolation {
                block: index,
                lattice: self.resident,
            })
        }
    }

    /// Selection of this layout within the global dataset.
    pub fn hyperslab(&self, process_coords: [usize; 3]) -> Hyperslab {
        Hyperslab::for_process(process_coords, self.extent(), self.channels)
    }

    /// Zero-filled local buffer.
    pub fn allocate<R: Element>(&self) -> Vec<R> {
        vec![R::zero(); self.len()]
    }

    fn check_buffer(&self, found: usize) -> Result<(), CheckpointError> {
        if found == self.len() {
            Ok(())
        } else {
            Err(CheckpointError::BufferSizeMismatch {
                expected: self.len(),
                found,
            })
        }
    }

    /// Validate block indices and return them bucketed by x-pencil
    /// `by + ry * bz`.
    fn sort_into_pencils(&self, indices: &[[usize; 3]]) -> Result<Vec<Vec<usize>>, CheckpointError> {
        let [rx, ry, rz] = self.resident;
        let mut seen = vec![false; rx * ry * rz];
        let mut pencils = vec![Vec::new(); ry * rz];
        for (i, &index) in indices.iter().enumerate() {
            self.check_block(index)?;
            let slot = index[0] + rx * (index[1] + ry * index[2]);
            if std::mem::replace(&mut seen[slot], true) {
                return Err(CheckpointError::DuplicateBlock(index));
            }
            pencils[index[1] + ry * index[2]].push(i);
        }
        let missing = seen.len() - indices.len();
        if missing > 0 {
            log::warn!(
                "{missing} of {} resident lattice slots hold no block; their cells stay zero",
                seen.len()
            );
        }
        Ok(pencils)
    }
}

impl DebugInvariants for LocalLayout {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "LocalLayout");
    }

    fn validate_invariants(&self) -> Result<(), CheckpointError> {
        if self.channels == 0 {
            return Err(CheckpointError::InvalidLayout("zero channels per cell".into()));
        }
        if self.block_size.contains(&0) {
            return Err(CheckpointError::InvalidLayout(format!(
                "block size {:?} has a zero axis",
                self.block_size
            )));
        }
        Ok(())
    }
}

/// Fill `buffer` from the resident blocks (dump direction).
///
/// `buffer` must hold exactly `layout.len()` values. Cells of lattice slots
/// without a block are zeroed.
pub fn scatter_blocks<R, B, S>(
    layout: &LocalLayout,
    blocks: &[BlockRef<'_, B>],
    streamer: &S,
    buffer: &mut [R],
    parallel: bool,
) -> Result<(), CheckpointError>
where
    R: Element,
    B: Sync,
    S: ChannelStreamer<B>,
{
    layout.validate_invariants()?;
    check_channels::<B, S>(layout)?;
    layout.check_buffer(buffer.len())?;
    let indices: Vec<_> = blocks.iter().map(|b| b.index).collect();
    let pencils = layout.sort_into_pencils(&indices)?;
    if layout.is_empty() {
        return Ok(());
    }

    let ny = layout.extent()[1];
    let fill = |(row, chunk): (usize, &mut [R])| {
        chunk.fill(R::zero());
        let (gy, gz) = (row % ny, row / ny);
        fill_row(layout, blocks, &pencils[layout.pencil_of(gy, gz)], streamer, [gy, gz], chunk);
    };

    #[cfg(feature = "rayon")]
    if parallel {
        buffer
            .par_chunks_mut(layout.row_len())
            .enumerate()
            .for_each(fill);
        return Ok(());
    }
    #[cfg(not(feature = "rayon"))]
    let _ = parallel;

    buffer.chunks_mut(layout.row_len()).enumerate().for_each(fill);
    Ok(())
}

/// Write local cell row `(gy, gz)` from the blocks of its pencil.
fn fill_row<R, B, S>(
    layout: &LocalLayout,
    blocks: &[BlockRef<'_, B>],
    members: &[usize],
    streamer: &S,
    [gy, gz]: [usize; 2],
    row: &mut [R],
) where
    R: Element,
    S: ChannelStreamer<B>,
{
    let [sx, sy, sz] = layout.block_size;
    let c = layout.channels;
    let (iy, iz) = (gy % sy, gz % sz);
    for &i in members {
        let b = &blocks[i];
        for ix in 0..sx {
            let idx = c * (b.index[0] * sx + ix);
            streamer.extract(b.block, [ix, iy, iz], &mut row[idx..idx + c]);
        }
    }
}

/// Push `buffer` back into the resident blocks (restore direction).
pub fn gather_blocks<R, B, S>(
    layout: &LocalLayout,
    blocks: &mut [BlockMut<'_, B>],
    streamer: &S,
    buffer: &[R],
    parallel: bool,
) -> Result<(), CheckpointError>
where
    R: Element,
    B: Send,
    S: ChannelStreamer<B>,
{
    layout.validate_invariants()?;
    check_channels::<B, S>(layout)?;
    layout.check_buffer(buffer.len())?;
    let indices: Vec<_> = blocks.iter().map(|b| b.index).collect();
    layout.sort_into_pencils(&indices)?;

    let [sx, sy, sz] = layout.block_size;
    let c = layout.channels;
    let drain = |b: &mut BlockMut<'_, B>| {
        for (iz, iy, ix) in iproduct!(0..sz, 0..sy, 0..sx) {
            let idx = layout.flat_index(b.index, [ix, iy, iz]);
            streamer.inject(b.block, &buffer[idx..idx + c], [ix, iy, iz]);
        }
    };

    #[cfg(feature = "rayon")]
    if parallel {
        blocks.par_iter_mut().for_each(drain);
        return Ok(());
    }
    #[cfg(not(feature = "rayon"))]
    let _ = parallel;

    blocks.iter_mut().for_each(drain);
    Ok(())
}

fn check_channels<B, S: ChannelStreamer<B>>(layout: &LocalLayout) -> Result<(), CheckpointError> {
    if S::CHANNELS == layout.channels {
        Ok(())
    } else {
        Err(CheckpointError::InvalidLayout(format!(
            "streamer yields {} channels, layout expects {}",
            S::CHANNELS,
            layout.channels
        )))
    }
}
