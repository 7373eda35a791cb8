use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use chameleon::fingerprint::{fingerprint_reader, fingerprint_request};

fn bench_fingerprint_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    for size in [100, 1_000, 10_000, 1_000_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let body = vec![b'x'; size];

            b.iter(|| fingerprint_request(black_box("POST"), black_box("/api/test"), black_box(&body)));
        });
    }

    group.finish();
}

fn bench_fingerprint_reader(c: &mut Criterion) {
    let body = vec![b'x'; 64 * 1024];

    c.bench_function("fingerprint_reader_64k", |b| {
        b.iter(|| fingerprint_reader("PUT", "/upload", Some(black_box(body.as_slice()))).unwrap());
    });
}

criterion_group!(benches, bench_fingerprint_sizes, bench_fingerprint_reader);
criterion_main!(benches);
