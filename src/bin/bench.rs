//! Interpreter benchmark binary.
//!
//! Measures execution time for representative programs.
//! Run with: `cargo run --release --bin bench`

use std::thread;
use std::time::{Duration, Instant};

use vmcore::virtual_machine::isa::Instruction;
use vmcore::virtual_machine::program::{Program, ProgramBuilder};
use vmcore::virtual_machine::vm::{Interpreter, Limits, Outcome};

// ---------------------------------------------------------------------------
// Benchmark harness
// ---------------------------------------------------------------------------

struct BenchResult {
    name: &'static str,
    iterations: u64,
    total: Duration,
    gas_used: u64,
    /// Instructions executed per run.
    steps: u64,
}

impl BenchResult {
    fn avg(&self) -> Duration {
        let nanos = self.total.as_nanos() / u128::from(self.iterations.max(1));
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    fn print(&self) {
        let avg = self.avg();
        let ns_per_op = avg.as_nanos();
        let ns_per_instr = if self.steps > 0 {
            format!("{:>8.1}", ns_per_op as f64 / self.steps as f64)
        } else {
            "       -".to_string()
        };
        println!(
            "  {:<30} {:>7} iters {:>10.3} us/iter {:>12} gas  {} ns/instr",
            self.name,
            self.iterations,
            ns_per_op as f64 / 1000.0,
            self.gas_used,
            ns_per_instr,
        );
    }
}

/// Runs `program` once and returns (gas used, steps).
fn run_once(program: &Program) -> (u64, u64) {
    match Interpreter::new(program, Limits::default()).run() {
        Outcome::Halted(state) => (state.gas().used(), state.steps()),
        Outcome::Faulted(fault) => panic!("benchmark program faulted: {fault}"),
        Outcome::Cancelled => panic!("benchmark program cancelled"),
    }
}

/// Runs `program` for at least `min_duration`, returning aggregated results.
fn bench(name: &'static str, min_duration: Duration, program: &Program) -> BenchResult {
    // Warmup
    for _ in 0..5 {
        run_once(program);
    }

    let mut iterations = 0u64;
    let mut last = (0, 0);
    let start = Instant::now();
    while start.elapsed() < min_duration {
        last = run_once(program);
        iterations += 1;
    }
    let total = start.elapsed();

    BenchResult {
        name,
        iterations,
        total,
        gas_used: last.0,
        steps: last.1,
    }
}

// ---------------------------------------------------------------------------
// Benchmark definitions
// ---------------------------------------------------------------------------

/// Emits `local[slot] -= 1; if local[slot] > 0 goto label`.
fn emit_countdown_tail(b: &mut ProgramBuilder, slot: u8, label: &str) {
    b.emit(Instruction::LoadLocal { slot });
    b.emit(Instruction::Dec {});
    b.emit(Instruction::Dup {});
    b.emit(Instruction::StoreLocal { slot });
    b.emit(Instruction::PushI64 { value: 0 });
    b.emit(Instruction::Gt {});
    b.emit_jump(Instruction::JumpIf { target: 0 }, label)
        .expect("jump");
}

fn emit_counter(b: &mut ProgramBuilder, slot: u8, n: i64) {
    b.emit(Instruction::PushI64 { value: n });
    b.emit(Instruction::StoreLocal { slot });
}

fn tight_loop(n: i64) -> Program {
    let mut b = ProgramBuilder::new();
    emit_counter(&mut b, 0, n);
    b.label("loop").expect("label");
    emit_countdown_tail(&mut b, 0, "loop");
    b.emit(Instruction::Halt {});
    b.build().expect("build")
}

fn arithmetic_mix(n: i64) -> Program {
    let mut b = ProgramBuilder::new();
    emit_counter(&mut b, 0, n);
    b.label("loop").expect("label");
    b.emit(Instruction::LoadLocal { slot: 0 });
    b.emit(Instruction::PushI64 { value: 3 });
    b.emit(Instruction::Mul {});
    b.emit(Instruction::PushI64 { value: 7 });
    b.emit(Instruction::Add {});
    b.emit(Instruction::PushI64 { value: 5 });
    b.emit(Instruction::Mod {});
    b.emit(Instruction::PushI64 { value: 2 });
    b.emit(Instruction::Div {});
    b.emit(Instruction::StoreLocal { slot: 1 });
    emit_countdown_tail(&mut b, 0, "loop");
    b.emit(Instruction::Halt {});
    b.build().expect("build")
}

fn branch_heavy(n: i64) -> Program {
    let mut b = ProgramBuilder::new();
    emit_counter(&mut b, 0, n);
    b.label("loop").expect("label");
    b.emit(Instruction::LoadLocal { slot: 0 });
    b.emit(Instruction::PushI64 { value: 2 });
    b.emit(Instruction::Mod {});
    b.emit(Instruction::PushI64 { value: 0 });
    b.emit(Instruction::Eq {});
    b.emit_jump(Instruction::JumpUnless { target: 0 }, "odd")
        .expect("jump");
    b.emit(Instruction::LoadLocal { slot: 1 });
    b.emit(Instruction::Inc {});
    b.emit(Instruction::StoreLocal { slot: 1 });
    b.emit_jump(Instruction::Jump { target: 0 }, "next")
        .expect("jump");
    b.label("odd").expect("label");
    b.emit(Instruction::LoadLocal { slot: 1 });
    b.emit(Instruction::Dec {});
    b.emit(Instruction::StoreLocal { slot: 1 });
    b.label("next").expect("label");
    emit_countdown_tail(&mut b, 0, "loop");
    b.emit(Instruction::Halt {});
    b.build().expect("build")
}

fn call_overhead(n: i64) -> Program {
    let mut b = ProgramBuilder::new();
    emit_counter(&mut b, 0, n);
    b.label("loop").expect("label");
    b.emit(Instruction::LoadLocal { slot: 0 });
    b.emit_jump(Instruction::Call { target: 0, argc: 1 }, "identity")
        .expect("call");
    b.emit(Instruction::Pop {});
    emit_countdown_tail(&mut b, 0, "loop");
    b.emit(Instruction::Halt {});
    b.label("identity").expect("label");
    b.emit(Instruction::LoadLocal { slot: 0 });
    b.emit(Instruction::Ret {});
    b.build().expect("build")
}

fn memory(n: i64) -> Program {
    let mut b = ProgramBuilder::new();
    emit_counter(&mut b, 0, n);
    b.label("loop").expect("label");
    b.emit(Instruction::PushI64 { value: 42 });
    b.emit(Instruction::LoadLocal { slot: 0 });
    b.emit(Instruction::Store {});
    b.emit(Instruction::LoadLocal { slot: 0 });
    b.emit(Instruction::Recall {});
    b.emit(Instruction::Pop {});
    emit_countdown_tail(&mut b, 0, "loop");
    b.emit(Instruction::Halt {});
    b.build().expect("build")
}

fn jump_table(n: i64) -> Program {
    let mut b = ProgramBuilder::new();
    emit_counter(&mut b, 0, n);
    b.label("loop").expect("label");
    b.emit(Instruction::LoadLocal { slot: 0 });
    b.emit(Instruction::PushI64 { value: 3 });
    b.emit(Instruction::Mod {});
    b.emit(Instruction::JumpTable {});
    for case in ["case0", "case1", "case2"] {
        b.label(case).expect("label");
        b.jump_table_entry(case);
        b.emit(Instruction::Nop {});
        b.emit_jump(Instruction::Jump { target: 0 }, "next")
            .expect("jump");
    }
    b.label("next").expect("label");
    emit_countdown_tail(&mut b, 0, "loop");
    b.emit(Instruction::Halt {});
    b.build().expect("build")
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let min = Duration::from_secs(2);

    println!("Interpreter Benchmarks (each runs for >= 2s)\n");
    println!(
        "  {:<30} {:>7}       {:>14} {:>12}  {:>10}",
        "benchmark", "iters", "avg time", "gas/run", "ns/instr"
    );
    println!("  {}", "-".repeat(82));

    // Programs are built up front; building is excluded from the timings.
    let cases: [(&'static str, Program); 6] = [
        ("tight_loop(100K)", tight_loop(100_000)),
        ("arithmetic_mix(10K)", arithmetic_mix(10_000)),
        ("branch_heavy(50K)", branch_heavy(50_000)),
        ("call_overhead(10K)", call_overhead(10_000)),
        ("mem_store_recall(5K)", memory(5_000)),
        ("jump_table(10K)", jump_table(10_000)),
    ];

    for (name, program) in &cases {
        bench(*name, min, program).print();
    }

    // One program shared by several concurrent runs.
    let program = &tight_loop(100_000);
    let threads = thread::available_parallelism().map_or(4, |n| n.get());
    let start = Instant::now();
    let runs: u64 = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(move || {
                    let mut runs = 0u64;
                    while start.elapsed() < min {
                        run_once(program);
                        runs += 1;
                    }
                    runs
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap_or(0)).sum()
    });
    println!();
    println!(
        "  tight_loop(100K) on {threads} threads: {runs} runs in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    println!();
}
