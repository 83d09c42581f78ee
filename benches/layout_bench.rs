use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use block_checkpoint::prelude::*;

fn grid(resident: usize) -> CartesianBlockGrid<CellBlock<[f64; 3]>> {
    let spec =
        GridSpec::unit_cube([16, 16, 16], [resident; 3], [0, 0, 0], [resident; 3]).expect("spec");
    CartesianBlockGrid::try_new(spec, |[bx, by, bz]| {
        CellBlock::from_fn([16, 16, 16], |[x, y, z]| {
            let v = (bx + by + bz + x + y + z) as f64;
            [v, v + 0.5, v + 1.0]
        })
    })
    .expect("grid")
}

fn bench_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout_transform");
    let streamer = VectorStreamer::default();

    for &resident in &[2usize, 4] {
        let mut g = grid(resident);
        let layout = LocalLayout::from_grid(&g, 3);
        let mut buffer = layout.allocate::<f32>();

        for parallel in [false, true] {
            let tag = if parallel { "parallel" } else { "serial" };
            group.bench_with_input(
                BenchmarkId::new(format!("scatter_{tag}"), resident),
                &resident,
                |b, _| {
                    let blocks = g.resident_blocks();
                    b.iter(|| {
                        scatter_blocks(&layout, &blocks, &streamer, &mut buffer, parallel)
                            .expect("scatter");
                        black_box(&buffer);
                    })
                },
            );
        }

        group.bench_with_input(BenchmarkId::new("gather", resident), &resident, |b, _| {
            b.iter(|| {
                let mut blocks = g.resident_blocks_mut();
                gather_blocks(&layout, &mut blocks, &streamer, &buffer, true).expect("gather");
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_layout);
criterion_main!(benches);
