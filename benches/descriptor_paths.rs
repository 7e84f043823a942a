use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gtmat::{DistMatrix, LocalGroup, PartitionMap, UpdateOptions};

fn bench_descriptor_paths(c: &mut Criterion) {
    let partition = PartitionMap::uniform(256, 256, 2, 2).unwrap();
    let group = LocalGroup::<f64>::for_partition(&partition);
    let mut group_bench = c.benchmark_group("accumulate 12x12");

    for (name, ceiling) in [("cached", 16), ("ephemeral", 1)] {
        for src_ld in [12, 128, 200] {
            let src: Vec<f64> = (0..12 * src_ld).map(|i| (i as f64).sin()).collect();
            let opts = UpdateOptions::default().with_cached_shape_max(ceiling);
            let mut mat = DistMatrix::new(group.transport(0), partition.clone(), opts).unwrap();
            group_bench.bench_with_input(BenchmarkId::new(name, src_ld), &src_ld, |b, &ld| {
                b.iter(|| {
                    mat.accumulate_block(black_box(10), 12, black_box(20), 12, &src, ld).unwrap();
                })
            });
        }
    }
    group_bench.finish();

    c.bench_function("batch 64 straddling blocks", |b| {
        let src = vec![1.0; 64 * 64];
        let mut mat = DistMatrix::new(group.transport(1), partition.clone(), UpdateOptions::default()).unwrap();
        b.iter(|| {
            mat.start_batch_update();
            for k in 0..64 {
                mat.add_accumulate_block_request(100 + k, 40, 100, 40, &src, 64).unwrap();
            }
            mat.execute_batch_update().unwrap();
            mat.stop_batch_update();
        })
    });
}

criterion_group!(benches, bench_descriptor_paths);
criterion_main!(benches);
