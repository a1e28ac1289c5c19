/// Transform pipeline overhead benchmarks
///
/// Measures decode, inject and encode separately and the whole coordinator
/// path, on bodies with a growing number of return instructions.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use perfmon::coordinator::transform_class;
use perfmon::decoder::decode;
use perfmon::diagnostics::NullSink;
use perfmon::encoder::encode;
use perfmon::filter::ClassFilter;
use perfmon::inject::inject;
use perfmon::probe::ProbeTemplate;

#[path = "../tests/common/mod.rs"]
mod common;

/// `(I)I` body with `returns` early returns and a same frame per branch target
fn branchy_class(returns: usize) -> Vec<u8> {
    let mut b = common::ClassBuilder::new("bench/Branchy");
    b.version(52);
    let stack_map = b.utf8("StackMapTable");
    let mut code = Vec::new();
    let mut frames = (returns as u16).to_be_bytes().to_vec();
    for k in 0..returns {
        code.extend_from_slice(&[0x1a, 0x9a, 0x00, 0x05, 0x04, 0xac]);
        frames.push(if k == 0 { 6 } else { 5 });
    }
    code.extend_from_slice(&[0x1a, 0xac]);
    b.method(
        common::ACC_STATIC,
        "branchy",
        "(I)I",
        Some(common::Code {
            max_stack: 1,
            max_locals: 1,
            bytes: code,
            attributes: vec![(stack_map, frames)],
            ..common::Code::default()
        }),
    );
    b.build()
}

fn bench_stages(c: &mut Criterion) {
    let mut group = c.benchmark_group("stages");
    for returns in [1usize, 16, 256] {
        let bytes = branchy_class(returns);
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("decode", returns), &bytes, |b, bytes| {
            b.iter(|| black_box(decode(black_box(bytes)).unwrap()));
        });

        let class = decode(&bytes).unwrap();
        group.bench_with_input(BenchmarkId::new("inject", returns), &class, |b, class| {
            b.iter(|| black_box(inject(class.clone(), ProbeTemplate::standard()).unwrap()));
        });

        let injected = inject(class.clone(), ProbeTemplate::standard()).unwrap().class;
        group.bench_with_input(BenchmarkId::new("encode", returns), &injected, |b, class| {
            b.iter(|| black_box(encode(black_box(class)).unwrap()));
        });
    }
    group.finish();
}

fn bench_coordinator(c: &mut Criterion) {
    let mut group = c.benchmark_group("coordinator");
    let filter = ClassFilter::default();
    for returns in [1usize, 16, 256] {
        let bytes = branchy_class(returns);
        group.bench_with_input(BenchmarkId::new("transform", returns), &bytes, |b, bytes| {
            b.iter(|| {
                let result = transform_class(
                    "bench/Branchy",
                    black_box(bytes),
                    &filter,
                    ProbeTemplate::standard(),
                    &NullSink,
                );
                black_box(result.into_bytes())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_stages, bench_coordinator);
criterion_main!(benches);
