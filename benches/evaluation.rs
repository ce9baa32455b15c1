use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use reforge::{ClientConfig, Context, ContextSet, DataSource};

fn criterion_benchmark(c: &mut Criterion) {
    let client = ClientConfig::local_only()
        .data_source(DataSource::LocalFile("tests/data/snapshot.json".into()))
        .to_client()
        .unwrap();

    {
        let mut group = c.benchmark_group("sample.int");
        group.throughput(Throughput::Elements(1));
        let context = ContextSet::new();
        group.bench_function("get", |b| {
            b.iter(|| client.get(black_box("sample.int"), black_box(&context)))
        });
        group.bench_function("get_match", |b| {
            b.iter(|| client.get_match(black_box("sample.int"), black_box(&context)))
        });
        group.finish();
    }

    {
        let mut group = c.benchmark_group("new-dashboard");
        group.throughput(Throughput::Elements(1));
        let context = ContextSet::from(
            Context::new("user")
                .with("key", "subject1")
                .with("email", "subject1@example.com")
                .with("plan", "pro"),
        );
        group.bench_function("get", |b| {
            b.iter(|| client.get(black_box("new-dashboard"), black_box(&context)))
        });
        group.finish();
    }

    {
        let mut group = c.benchmark_group("get_all");
        group.throughput(Throughput::Elements(1));
        let context = ContextSet::from(Context::new("device").with("version", "2.1.0"));
        group.bench_function("get_all", |b| {
            b.iter(|| client.get_all(black_box(&context)))
        });
        group.finish();
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
