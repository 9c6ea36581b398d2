use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pkc::dtype::ElementType;
use pkc::kernel::KernelArgument;
use pkc::*;

// Sample kernels of varying complexity
const SIMPLE_DOMAINS: &[&str] = &["{[i]: 0<=i<n}"];
const SIMPLE_INSNS: &str = "out[i] = 2*a[i] + 1";

const MEDIUM_DOMAINS: &[&str] = &["{[i, j]: 0<=i<n and 0<=j<n}"];
const MEDIUM_INSNS: &str = r#"
    <float64> acc[i] = sum(j, a[i, j]*x[j])     # row dot product
    out[i] = cse(acc[i]*acc[i], sq) + sq
"#;

const COMPLEX_DOMAINS: &[&str] = &[
    "{[i]: 0<=i<n}",
    "{[j]: i<=j<n}",
    "{[k, l]: 0<=k<4 and 0<=l<=k}",
];
const COMPLEX_INSNS: &str = r#"
    sq(v) := v*v
    <float64> tri[i, j] = sum(l, a[i, l]*a[j, l]) {id=tri}
    <> blk[k] = product(l, sq(a[k, l]))
    out[i, j] = tri[i, j] + cse(blk[0]*2, scale) {dep=tri, priority=1}
"#;

fn inputs(domains: &[&str], insns: &str) -> KernelInputs {
    KernelInputs::new(domains.iter().copied(), [insns]).with_args(vec![
        KernelArgument::value("n", ElementType::Int32),
        KernelArgument::array("a", ElementType::Float64),
        KernelArgument::array("x", ElementType::Float64),
        KernelArgument::array("out", ElementType::Float64),
    ])
}

fn bench_make_kernel(c: &mut Criterion) {
    let mut group = c.benchmark_group("make_kernel");

    for (name, domains, insns) in [
        ("simple", SIMPLE_DOMAINS, SIMPLE_INSNS),
        ("medium", MEDIUM_DOMAINS, MEDIUM_INSNS),
        ("complex", COMPLEX_DOMAINS, COMPLEX_INSNS),
    ] {
        let input = inputs(domains, insns);
        group.bench_with_input(BenchmarkId::from_parameter(name), &input, |b, input| {
            b.iter(|| {
                let kernel = make_kernel(black_box(input));
                black_box(&kernel);
            });
        });
    }

    group.finish();
}

fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("macro_fanout");

    for width in [2usize, 8, 32] {
        let options = KernelOptions::default().with_define("K", (0..width).collect::<Vec<_>>());
        let input = KernelInputs::new(["{[i]: 0<=i<n}"], ["out[i] = a[i] + K"])
            .with_args(vec![
                KernelArgument::value("n", ElementType::Int32),
                KernelArgument::array("a", ElementType::Float64),
                KernelArgument::array("out", ElementType::Float64),
            ])
            .with_options(options);
        group.bench_with_input(BenchmarkId::from_parameter(width), &input, |b, input| {
            b.iter(|| black_box(make_kernel(black_box(input))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_make_kernel, bench_fanout);
criterion_main!(benches);
