use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use geolod::{
    AggregationPass, Config, MemoryBackend, RegionGeometryAccumulator, SegmentLayout,
    SpatialBucketIndex, SpatialIndexContext,
};

const BASE32: &[u8] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Points spread over a block of neighbouring cells, several per cell.
fn lines(cells: usize) -> Vec<String> {
    let mut out = Vec::with_capacity(cells * 4);
    for i in 0..cells {
        let second = BASE32[(i / 32) % 32] as char;
        let third = BASE32[i % 32] as char;
        for j in 0..4 {
            let tail = BASE32[(i * 7 + j) % 32] as char;
            out.push(format!("FRAu{}{}{}-p{}x{}", second, third, tail, i, j));
        }
    }
    out
}

fn benchmark_coverage_accumulation(c: &mut Criterion) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut group = c.benchmark_group("coverage_accumulation");

    for cells in [32, 256, 1024] {
        let mut backend = MemoryBackend::new();
        let mut index = SpatialBucketIndex::new(SegmentLayout::default());
        index.ingest(lines(cells), &mut backend).unwrap();
        let (counts, _) = AggregationPass::new(&index).run(&mut backend).unwrap();
        let accumulator = RegionGeometryAccumulator::new(&Config::default()).unwrap();

        for (label, prune) in [("pruned", true), ("unconditional", false)] {
            let accumulator = accumulator.with_pruning(prune);
            group.bench_with_input(BenchmarkId::new(label, cells), &cells, |b, _| {
                b.iter(|| {
                    let mut context = SpatialIndexContext::default();
                    accumulator
                        .accumulate(black_box(&index), black_box(&counts), &mut context)
                        .unwrap()
                })
            });
        }

        group.bench_with_input(BenchmarkId::new("parallel_4", cells), &cells, |b, _| {
            b.iter(|| {
                let mut context = SpatialIndexContext::default();
                accumulator
                    .accumulate_parallel(black_box(&index), black_box(&counts), &mut context, 4)
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_coverage_accumulation);
criterion_main!(benches);
