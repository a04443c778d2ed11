//! Type-test and scan benchmarks
//!
//! Run with: `cargo bench --package stampgc`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use stampgc::{standard, GcMetadata, ReferenceVisitor, StampId};

fn metadata() -> GcMetadata {
    standard::standard_metadata().unwrap()
}

fn all_stamps(metadata: &GcMetadata) -> Vec<StampId> {
    metadata.registry().iter().map(|class| class.stamp).collect()
}

fn bench_type_tests(c: &mut Criterion) {
    let metadata = metadata();
    let stamps = all_stamps(&metadata);
    let mut group = c.benchmark_group("type_test");
    group.throughput(Throughput::Elements(stamps.len() as u64));

    for target in ["Integer", "Number", "Object", "Sequence", "Function"] {
        let predicate = metadata.predicate(target).unwrap();
        group.bench_function(format!("predicate_{}", target.to_lowercase()), |b| {
            b.iter(|| {
                stamps
                    .iter()
                    .filter(|&&stamp| predicate.matches(black_box(stamp)))
                    .count()
            })
        });
    }

    group.bench_function("is_a_by_name", |b| {
        b.iter(|| {
            stamps
                .iter()
                .filter(|&&stamp| metadata.is_a(black_box(stamp), "Sequence"))
                .count()
        })
    });

    group.finish();
}

fn bench_build(c: &mut Criterion) {
    c.bench_function("standard_metadata_build", |b| b.iter(|| black_box(metadata())));
}

struct Count(usize);

impl ReferenceVisitor for Count {
    fn visit_owning(&mut self, _slot: *mut usize) {
        self.0 += 1;
    }

    fn visit_tagged(&mut self, _slot: *mut usize) {
        self.0 += 1;
    }
}

fn bench_scan(c: &mut Criterion) {
    let metadata = metadata();
    let vector = metadata.lookup("Vector").unwrap();

    // header, length 64, then 64 tagged pointers
    let mut object = vec![0usize; 3 + 64];
    object[1] = vector.get() as usize;
    object[2] = 64;
    for (i, word) in object[3..].iter_mut().enumerate() {
        *word = 0x10_0000 + i * 16 + 1;
    }
    let address = object.as_mut_ptr() as usize;

    let mut group = c.benchmark_group("scan");
    group.throughput(Throughput::Elements(64));
    group.bench_function("vector_64", |b| {
        b.iter(|| {
            let mut count = Count(0);
            unsafe { metadata.scan(black_box(address), &mut count) }.unwrap();
            count.0
        })
    });
    group.finish();
}

criterion_group!(benches, bench_type_tests, bench_build, bench_scan);
criterion_main!(benches);
