// benches/script_execution.rs
//! Performance benchmarks for the scripting bridge
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hookscript::{HostValue, Session};

fn benchmark_simple_script(c: &mut Criterion) {
    c.bench_function("simple_script", |b| {
        let mut session = Session::new();
        session.set("x", HostValue::Number(21.0));

        b.iter(|| session.run(black_box("return x * 2")).unwrap())
    });
}

fn benchmark_arithmetic_loop(c: &mut Criterion) {
    let source = r#"
        local total = 0
        local i = 1
        while i <= 1000 do
            total = total + i * 2
            i = i + 1
        end
        return total
    "#;

    c.bench_function("arithmetic_loop_1000", |b| {
        let mut session = Session::new();
        b.iter(|| session.run(black_box(source)).unwrap())
    });
}

fn benchmark_context_marshalling(c: &mut Criterion) {
    let mut group = c.benchmark_group("context_marshalling");

    for size in [10usize, 100, 1000] {
        let seq = HostValue::Sequence(
            (0..size).map(|i| HostValue::Number(i as f64 + 1.0)).collect(),
        );

        group.bench_with_input(BenchmarkId::from_parameter(size), &seq, |b, seq| {
            let mut session = Session::new();
            session.set("items", seq.clone());

            b.iter(|| session.run(black_box("return items")).unwrap())
        });
    }

    group.finish();
}

fn benchmark_host_callback(c: &mut Criterion) {
    c.bench_function("host_callback", |b| {
        let mut session = Session::new();
        session.set_fn("add", |args| match (args.first(), args.get(1)) {
            (Some(HostValue::Number(a)), Some(HostValue::Number(x))) => HostValue::Number(a + x),
            _ => HostValue::Absent,
        });

        b.iter(|| session.run(black_box("return add(2, 3)")).unwrap())
    });
}

fn benchmark_guest_callback(c: &mut Criterion) {
    c.bench_function("guest_callback", |b| {
        let mut session = Session::new();
        let double = session.run("return function(n) return n * 2 end").unwrap();

        b.iter(|| double.call(black_box(vec![HostValue::Number(21.0)])))
    });
}

criterion_group!(
    benches,
    benchmark_simple_script,
    benchmark_arithmetic_loop,
    benchmark_context_marshalling,
    benchmark_host_callback,
    benchmark_guest_callback,
);
criterion_main!(benches);
