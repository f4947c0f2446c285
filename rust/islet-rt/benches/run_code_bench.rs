use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use islet_compiler::compile;
use islet_rt::Runtime;

const PROGRAMS: &[(&str, &str)] = &[
    ("assign", "x = 1\ny = x + 2\n"),
    (
        "loop",
        "total = 0\nfor i in range(1000):\n    total += i * 2\n",
    ),
    (
        "recursion",
        "def fib(n):\n    if n < 2:\n        return n\n    return fib(n - 1) + fib(n - 2)\nresult = fib(15)\n",
    ),
    (
        "containers",
        "items = []\nfor i in range(200):\n    items.append({'id': i, 'name': str(i)})\ncount = len(items)\n",
    ),
];

fn compile_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    for (name, source) in PROGRAMS {
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, source| {
            b.iter(|| black_box(compile(black_box(source))))
        });
    }
    group.finish();
}

fn run_code_benchmark(c: &mut Criterion) {
    let rt = Runtime::default();
    let mut group = c.benchmark_group("run_code");
    for (name, source) in PROGRAMS {
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, source| {
            let h = rt.create_interpreter(None).expect("create interpreter");
            b.iter(|| {
                let result = h.run_code(black_box(source));
                assert!(result.is_ok(), "{:?}", result);
                black_box(result)
            });
        });
    }
    group.finish();
}

fn create_close_benchmark(c: &mut Criterion) {
    let rt = Runtime::default();
    c.bench_function("create_and_close", |b| {
        b.iter(|| {
            let h = rt.create_interpreter(None).expect("create interpreter");
            h.close().expect("close interpreter");
        })
    });
}

criterion_group!(benches, compile_benchmark, run_code_benchmark, create_close_benchmark);
criterion_main!(benches);
