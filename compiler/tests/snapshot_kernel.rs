// Snapshot tests: lock the kernel listing to detect unintended changes in
// construction output (ids, temporaries, tags, normalized domains).
//
// Uses the library API and snapshots the Display output inline.
// Run `cargo insta review` after intentional output changes to update them.

use pkc::dtype::ElementType;
use pkc::kernel::KernelArgument;
use pkc::pass::PassId;
use pkc::pipeline::run_pipeline;
use pkc::{make_kernel, KernelInputs, KernelOptions};

fn listing(inputs: &KernelInputs) -> String {
    match make_kernel(inputs) {
        Ok(k) => k.to_string().trim_end().to_string(),
        Err(d) => panic!("construction failed: {}", d),
    }
}

fn args(value: &[&str], arrays: &[&str]) -> Vec<KernelArgument> {
    value
        .iter()
        .map(|n| KernelArgument::value(*n, ElementType::Int32))
        .chain(
            arrays
                .iter()
                .map(|n| KernelArgument::array(*n, ElementType::Float64)),
        )
        .collect()
}

#[test]
fn snapshot_typed_temporary() {
    let inputs = KernelInputs::new(
        ["{[i]: 0<=i<n}"],
        ["<float64> tmp[i] = a[i] + 1", "out[i] = tmp[i]*2"],
    )
    .with_args(args(&["n"], &["a", "out"]));
    insta::assert_snapshot!(listing(&inputs), @r"
    kernel loopy_kernel (device cpu)
    arguments:
      n: value int32
      a: array float64
      out: array float64
    domains:
      [n] -> { [i] : i >= 0 and -i + n - 1 >= 0 }
    temporaries:
      tmp: float64 shape=(n,) base=(0,)
    instructions:
      tmp[i] = a[i] + 1 {id=insn}
      out[i] = tmp[i]*2 {id=insn_0}
    ");
}

#[test]
fn snapshot_reduction_and_cse() {
    let inputs = KernelInputs::new(
        ["{[i, k]: 0<=i<4 and 0<=k<8}"],
        ["out[i] = sum(k, a[i, k]) + cse(b[i]*b[i], sq)"],
    )
    .with_args(args(&[], &["a", "b", "out"]))
    .with_options(KernelOptions::default().with_name("rowsum"));
    insta::assert_snapshot!(listing(&inputs), @r"
    kernel rowsum (device cpu)
    arguments:
      a: array float64
      b: array float64
      out: array float64
    domains:
      { [i, k] : i >= 0 and -i + 3 >= 0 and k >= 0 and -k + 7 >= 0 }
    iname tags:
      k: forceseq
    temporaries:
      sq: auto shape=() base=()
    instructions:
      sq = b[i]*b[i] {id=insn_0}
      out[i] = sum(k, a[i, k]) + sq {id=insn}
    ");
}

#[test]
fn snapshot_offset_nested_domains() {
    let inputs = KernelInputs::new(
        ["{[i]: 1<=i<=n}", "{[j]: i<=j<i+3}"],
        ["<> acc[i, j] = a[j] {id=load, priority=2}", "out[i] = acc[i, i] {dep=load}"],
    )
    .with_args(args(&["n"], &["a", "out"]));
    insta::assert_snapshot!(listing(&inputs), @r"
    kernel loopy_kernel (device cpu)
    arguments:
      n: value int32
      a: array float64
      out: array float64
    domains:
      [n] -> { [i] : i - 1 >= 0 and -i + n >= 0 }
      [i] -> { [j] : -i + j >= 0 and i - j + 2 >= 0 }
    temporaries:
      acc: auto shape=(n, n + 2) base=(1, 1)
    instructions:
      acc[i, j] = a[j] {id=load, priority=2}
      out[i] = acc[i, i] {id=insn, dep=load}
    ");
}

#[test]
fn snapshot_substitution_rules() {
    let inputs = KernelInputs::new(
        ["{[i]: 0<=i<16}"],
        ["twice(x) := 2*x", "one := 1", "out[i] = twice(a[i]) + one"],
    )
    .with_args(args(&[], &["a", "out"]));
    insta::assert_snapshot!(listing(&inputs), @r"
    kernel loopy_kernel (device cpu)
    arguments:
      a: array float64
      out: array float64
    domains:
      { [i] : i >= 0 and -i + 15 >= 0 }
    substitutions:
      one := 1
      twice(x) := 2*x
    instructions:
      out[i] = twice(a[i]) + one {id=insn}
    ");
}

#[test]
fn snapshot_stop_after_assembly() {
    let inputs = KernelInputs::new(["{[i, k]: 0<=i<4 and 0<=k<4}"], ["<> t[i] = sum(k, a[i, k])"])
        .with_args(args(&[], &["a"]));
    let state = run_pipeline(&inputs, PassId::AssembleKernel, |_, _| {}).unwrap();
    let listing = state.kernel.unwrap().to_string();
    insta::assert_snapshot!(listing.trim_end(), @r"
    kernel loopy_kernel (device cpu)
    arguments:
      a: array float64
    domains:
      { [i, k] : i >= 0 and -i + 3 >= 0 and k >= 0 and -k + 3 >= 0 }
    instructions:
      <> t[i] = sum(k, a[i, k]) {id=insn}
    ");
}
