use block_checkpoint::algs::communicator::cartesian_coords;
use block_checkpoint::algs::hyperslab::{Hyperslab, global_shape};
use block_checkpoint::algs::layout::LocalLayout;
use proptest::prelude::*;

/// Hyperslabs of every rank of a `dims` process grid.
fn slabs(dims: [usize; 3], resident: [usize; 3], block: [usize; 3], channels: usize) -> Vec<Hyperslab> {
    let layout = LocalLayout::new(block, resident, channels);
    (0..dims.iter().product())
        .map(|rank| layout.hyperslab(cartesian_coords(rank, dims)))
        .collect()
}

fn assert_tiles(dims: [usize; 3], resident: [usize; 3], block: [usize; 3], channels: usize) {
    let blocks = [0, 1, 2].map(|a| dims[a] * resident[a]);
    let shape = global_shape(blocks, block, channels);
    let all = slabs(dims, resident, block, channels);
    let covered: u64 = all.iter().map(Hyperslab::len).sum();
    assert_eq!(covered, shape.iter().product::<u64>());
    for (i, a) in all.iter().enumerate() {
        assert!(a.fits_within(&shape), "{a:?} outside {shape:?}");
        for b in &all[i + 1..] {
            assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
        }
    }
}

#[test]
fn cubes_of_processes_tile_the_dataset() {
    for n in 1..=4 {
        assert_tiles([n, n, n], [1, 1, 1], [4, 4, 4], 1);
    }
}

#[test]
fn runs_cover_slab_in_order() {
    let shape = [6, 4, 16, 3];
    let slab = Hyperslab::for_process([1, 1, 0], [8, 2, 6], 3);
    let runs = slab.runs(&shape);
    assert_eq!(runs.iter().map(|r| r.len).sum::<u64>(), slab.len());
    assert!(runs.windows(2).all(|w| w[0].dataset_start < w[1].dataset_start));
    assert!(runs.windows(2).all(|w| w[0].buffer_start + w[0].len == w[1].buffer_start));
}

proptest! {
    #[test]
    fn any_uniform_decomposition_tiles(
        dims in prop::array::uniform3(1usize..=3),
        resident in prop::array::uniform3(1usize..=2),
        block in prop::array::uniform3(1usize..=3),
        channels in 1usize..=3,
    ) {
        assert_tiles(dims, resident, block, channels);
    }

    #[test]
    fn offsets_are_coords_times_extent(
        coords in prop::array::uniform3(0usize..8),
        extent in prop::array::uniform3(1usize..32),
        channels in 1usize..10,
    ) {
        let h = Hyperslab::for_process(coords, extent, channels);
        prop_assert_eq!(h.offset, [
            (coords[2] * extent[2]) as u64,
            (coords[1] * extent[1]) as u64,
            (coords[0] * extent[0]) as u64,
            0,
        ]);
        prop_assert_eq!(h.count[3], channels as u64);
    }
}
