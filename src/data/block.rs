//! Dense fixed-size block of cells.

/// A `size[0] × size[1] × size[2]` array of cells stored x-fastest.
#[derive(Clone, Debug, PartialEq)]
pub struct CellBlock<C> {
    size: [usize; 3],
    cells: Vec<C>,
}

impl<C: Clone + Default> CellBlock<C> {
    /// A block with every cell set to `C::default()`.
    pub fn new(size: [usize; 3]) -> Self {
        Self {
            size,
            cells: vec![C::default(); size[0] * size[1] * size[2]],
        }
    }
}

impl<C> CellBlock<C> {
    /// A block whose cells are produced by `f(cell)`.
    pub fn from_fn(size: [usize; 3], mut f: impl FnMut([usize; 3]) -> C) -> Self {
        let mut cells = Vec::with_capacity(size[0] * size[1] * size[2]);
        for iz in 0..size[2] {
            for iy in 0..size[1] {
                for ix in 0..size[0] {
                    cells.push(f([ix, iy, iz]));
                }
            }
        }
        Self { size, cells }
    }

    #[inline]
    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    fn linear(&self, cell: [usize; 3]) -> usize {
        debug_assert!(
            cell[0] < self.size[0] && cell[1] < self.size[1] && cell[2] < self.size[2],
            "cell {cell:?} outside block {:?}",
            self.size
        );
        cell[0] + self.size[0] * (cell[1] + self.size[1] * cell[2])
    }

    /// Cell at `[ix, iy, iz]`. Panics when the cell lies outside the block.
    #[inline]
    pub fn get(&self, cell: [usize; 3]) -> &C {
        &self.cells[self.linear(cell)]
    }

    #[inline]
    pub fn get_mut(&mut self, cell: [usize; 3]) -> &mut C {
        let i = self.linear(cell);
        &mut self.cells[i]
    }

    /// Overwrite every cell with `f(cell)`.
    pub fn fill_with(&mut self, mut f: impl FnMut([usize; 3]) -> C) {
        let [sx, sy, _] = self.size;
        for (i, c) in self.cells.iter_mut().enumerate() {
            *c = f([i % sx, (i / sx) % sy, i / (sx * sy)]);
        }
    }

    /// Cells in storage order.
    pub fn cells(&self) -> &[C] {
        &self.cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x_is_fastest() {
        let b = CellBlock::from_fn([2, 3, 4], |[x, y, z]| (x, y, z));
        assert_eq!(b.cells()[0], (0, 0, 0));
        assert_eq!(b.cells()[1], (1, 0, 0));
        assert_eq!(b.cells()[2], (0, 1, 0));
        assert_eq!(b.cells()[6], (0, 0, 1));
        assert_eq!(*b.get([1, 2, 3]), (1, 2, 3));
    }

    #[test]
    fn fill_with_visits_every_cell() {
        let mut b = CellBlock::<f64>::new([3, 2, 2]);
        b.fill_with(|[x, y, z]| (x + 10 * y + 100 * z) as f64);
        assert_eq!(*b.get([2, 1, 1]), 112.0);
        *b.get_mut([0, 0, 0]) = -1.0;
        assert_eq!(b.cells()[0], -1.0);
        assert_eq!(b.len(), 12);
    }
}
