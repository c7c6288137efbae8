use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use lifeline_core::{IdGenerator, MonotonicGenerator, RequestId};

fn bench_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");
    group.throughput(Throughput::Elements(1));

    let generator = IdGenerator::new();
    group.bench_function("random", |b| b.iter(|| black_box(generator.next_id())));

    let mut monotonic = MonotonicGenerator::new();
    group.bench_function("monotonic", |b| b.iter(|| black_box(monotonic.next_id())));

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let id = RequestId::generate();
    let text = id.to_string();

    c.bench_function("to_string", |b| b.iter(|| black_box(id).to_string()));
    c.bench_function("parse", |b| {
        b.iter(|| RequestId::parse(black_box(&text)))
    });
    c.bench_function("decode", |b| {
        b.iter(|| RequestId::decode(black_box(id.as_u128())))
    });
}

criterion_group!(benches, bench_generation, bench_codec);
criterion_main!(benches);
