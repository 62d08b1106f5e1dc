//! Bytecode runner.
//!
//! Loads a raw bytecode file and executes it on the interpreter.
//!
//! # Usage
//! ```text
//! vmcore <program.bin> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `program.bin`: Raw instruction stream to execute
//!
//! # Options
//! - `--entry <offset>`: Entry offset (defaults to 0)
//! - `--jump-table <a,b,...>`: Jump table targets used by `JUMP_TABLE`
//! - `--gas-limit <n>`: Gas budget of the run
//! - `--max-stack <n>`: Maximum operand stack depth
//! - `--max-call-depth <n>`: Maximum number of frames
//! - `--locals <n>`: Local slots per frame
//! - `--memory-cells <n>`: Size of the data memory
//! - `--timeout-ms <n>`: Cancel the run after this many milliseconds
//!
//! # Exit status
//! `0` when the program halts, `1` for usage or load errors, `2` when the run
//! faults and `3` when it is cancelled by the timeout.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use vmcore::utils::log;
use vmcore::virtual_machine::errors::Fault;
use vmcore::virtual_machine::program::Program;
use vmcore::virtual_machine::state::ExecutionState;
use vmcore::virtual_machine::vm::gas::GasProfile;
use vmcore::virtual_machine::vm::{CancelToken, Interpreter, Limits, Outcome};
use vmcore::{error, info, warn};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{flag} requires an argument")]
    MissingValue { flag: String },
    #[error("invalid value '{value}' for {flag}")]
    InvalidValue { flag: String, value: String },
    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("program rejected: {0}")]
    Load(#[from] Fault),
}

/// Parsed command line.
#[derive(Debug)]
struct Options {
    input: PathBuf,
    entry: i64,
    jump_table: Vec<i64>,
    limits: Limits,
    timeout: Option<Duration>,
}

/// Parses the value following `flag` at `args[i]`.
fn flag_value<T: FromStr>(args: &[String], i: usize, flag: &str) -> Result<T, CliError> {
    let raw = args.get(i).ok_or_else(|| CliError::MissingValue {
        flag: flag.to_string(),
    })?;
    raw.trim().parse().map_err(|_| CliError::InvalidValue {
        flag: flag.to_string(),
        value: raw.clone(),
    })
}

fn parse_jump_table(raw: &str) -> Result<Vec<i64>, CliError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| CliError::InvalidValue {
                flag: "--jump-table".to_string(),
                value: s.to_string(),
            })
        })
        .collect()
}

/// Parses everything after the binary name.
fn parse_args(args: &[String]) -> Result<Options, CliError> {
    let input = args
        .first()
        .ok_or_else(|| CliError::MissingValue {
            flag: "<program.bin>".to_string(),
        })?
        .into();
    let mut options = Options {
        input,
        entry: 0,
        jump_table: Vec::new(),
        limits: Limits::default(),
        timeout: None,
    };

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        i += 1;
        match flag {
            "--entry" => options.entry = flag_value(args, i, flag)?,
            "--jump-table" => {
                let raw = args.get(i).ok_or_else(|| CliError::MissingValue {
                    flag: flag.to_string(),
                })?;
                options.jump_table = parse_jump_table(raw)?;
            }
            "--gas-limit" => {
                options.limits = options.limits.with_gas_limit(flag_value(args, i, flag)?)
            }
            "--max-stack" => {
                options.limits = options
                    .limits
                    .with_max_stack_depth(flag_value(args, i, flag)?)
            }
            "--max-call-depth" => {
                options.limits = options
                    .limits
                    .with_max_call_depth(flag_value(args, i, flag)?)
            }
            "--locals" => {
                options.limits = options
                    .limits
                    .with_locals_per_frame(flag_value(args, i, flag)?)
            }
            "--memory-cells" => {
                options.limits = options
                    .limits
                    .with_memory_cells(flag_value(args, i, flag)?)
            }
            "--timeout-ms" => {
                options.timeout = Some(Duration::from_millis(flag_value(args, i, flag)?))
            }
            other => return Err(CliError::UnexpectedArgument(other.to_string())),
        }
        i += 1;
    }
    Ok(options)
}

/// Reads `path` as a raw instruction stream and validates the jump table.
fn load_program(path: &Path, entry: i64, jump_table: &[i64]) -> Result<Program, CliError> {
    let code = fs::read(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Program::new(code, entry, jump_table)?)
}

/// Runs `program`, cancelling it once `timeout` elapses.
fn run_program(program: &Program, limits: Limits, timeout: Option<Duration>) -> Outcome {
    let token = CancelToken::new();
    let interpreter = Interpreter::new(program, limits).with_cancel_token(token.clone());
    let Some(timeout) = timeout else {
        return interpreter.run();
    };

    let (done_tx, done_rx) = mpsc::channel::<()>();
    thread::scope(|s| {
        s.spawn(move || {
            if let Err(mpsc::RecvTimeoutError::Timeout) = done_rx.recv_timeout(timeout) {
                token.cancel();
            }
        });
        let outcome = interpreter.run();
        drop(done_tx);
        outcome
    })
}

fn format_with_commas(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

fn print_stack(state: &ExecutionState) {
    println!("Stack (bottom to top):");
    if state.stack().is_empty() {
        println!("  <empty>");
    }
    for (i, value) in state.stack().as_slice().iter().enumerate() {
        println!("  [{i}] {value}");
    }
}

fn print_gas_profile(profile: &GasProfile) {
    let total_u = profile.total();
    let total = total_u as f64;

    let cat_w = 2 + profile
        .iter()
        .map(|(c, _)| c.as_str().chars().count())
        .max()
        .unwrap_or(0)
        .max("total".chars().count());

    let amt_w = profile
        .iter()
        .map(|(_, a)| format_with_commas(a).chars().count())
        .max()
        .unwrap_or(0)
        .max(format_with_commas(total_u).chars().count());

    let dash_w = cat_w + 1 + amt_w + 2 + "( 100.0%)".len();

    println!("Gas Profile:");
    println!("{}", "-".repeat(dash_w));

    for (category, amount) in profile.iter() {
        if amount == 0 {
            continue;
        }
        let percent = if total > 0.0 {
            (amount as f64 / total) * 100.0
        } else {
            0.0
        };
        println!(
            "{:<cat_w$} {:>amt_w$} ({:>5.1}%)",
            category.as_str(),
            format_with_commas(amount),
            percent,
        );
    }

    println!("{}", "-".repeat(dash_w));
    println!(
        "{:<cat_w$} {:>amt_w$} ({:>5.1}%)",
        "total",
        format_with_commas(total_u),
        100.0,
    );
}

fn main() {
    if let Err(e) = log::init_from_env() {
        error!("{e}");
        process::exit(1);
    }

    let args: Vec<String> = env::args().collect();
    let program_name = args.first().map(String::as_str).unwrap_or("vmcore");

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(program_name);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let options = parse_args(&args[1..]).unwrap_or_else(|e| {
        error!("{e}\n");
        print_usage(program_name);
        process::exit(1)
    });

    if !options.input.exists() {
        error!("Input file does not exist: {}", options.input.display());
        process::exit(1);
    }

    let program = load_program(&options.input, options.entry, &options.jump_table)
        .unwrap_or_else(|e| {
            error!("{e}");
            process::exit(1)
        });

    info!(
        "Loaded {} ({} bytes, entry {}, {} jump table entries)",
        options.input.display(),
        program.stream().len(),
        program.entry(),
        program.jump_table().len()
    );

    match run_program(&program, options.limits, options.timeout) {
        Outcome::Halted(state) => {
            info!(
                "Halted at offset {} after {} steps, {} gas used",
                state.ip(),
                state.steps(),
                format_with_commas(state.gas().used())
            );
            print_stack(&state);
            print_gas_profile(state.gas().profile());
        }
        Outcome::Faulted(fault) => {
            error!("Execution faulted ({}): {}", fault.kind(), fault);
            process::exit(2);
        }
        Outcome::Cancelled => {
            warn!("Execution cancelled: timeout reached");
            process::exit(3);
        }
    }
}

const USAGE: &str = "\
Bytecode Runner

USAGE:
    {program} <program.bin> [OPTIONS]

ARGS:
    <program.bin>    Raw instruction stream to execute

OPTIONS:
    --entry <offset>          Entry offset (defaults to 0)
    --jump-table <a,b,...>    Comma-separated jump table targets
    --gas-limit <n>           Gas budget (defaults to 10,000,000)
    --max-stack <n>           Maximum operand stack depth (defaults to 1024)
    --max-call-depth <n>      Maximum call depth (defaults to 256)
    --locals <n>              Local slots per frame (defaults to 16)
    --memory-cells <n>        Data memory cells (defaults to 65,535)
    --timeout-ms <n>          Cancel the run after n milliseconds
    -h, --help                Print this help message

ENVIRONMENT:
    VMCORE_LOG                info | warn | error | off
    VMCORE_LOG_TIMESTAMPS     0 hides timestamps

EXAMPLES:
    {program} program.bin
    {program} program.bin --entry 12 --jump-table 0,12,40
    {program} program.bin --gas-limit 5000 --timeout-ms 250
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use vmcore::virtual_machine::errors::InvalidJumpOffset;
    use vmcore::virtual_machine::isa::Instruction;
    use vmcore::virtual_machine::program::ProgramBuilder;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn write_program(instrs: &[Instruction]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for instr in instrs {
            file.write_all(&instr.to_bytes()).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn parse_defaults() {
        let options = parse_args(&args(&["prog.bin"])).unwrap();
        assert_eq!(options.input, PathBuf::from("prog.bin"));
        assert_eq!(options.entry, 0);
        assert!(options.jump_table.is_empty());
        assert_eq!(options.limits, Limits::default());
        assert_eq!(options.timeout, None);
    }

    #[test]
    fn parse_all_flags() {
        let options = parse_args(&args(&[
            "prog.bin",
            "--entry",
            "-3",
            "--jump-table",
            "0, 9,18",
            "--gas-limit",
            "500",
            "--max-stack",
            "8",
            "--max-call-depth",
            "4",
            "--locals",
            "3",
            "--memory-cells",
            "128",
            "--timeout-ms",
            "250",
        ]))
        .unwrap();
        assert_eq!(options.entry, -3);
        assert_eq!(options.jump_table, vec![0, 9, 18]);
        assert_eq!(
            options.limits,
            Limits::default()
                .with_gas_limit(500)
                .with_max_stack_depth(8)
                .with_max_call_depth(4)
                .with_locals_per_frame(3)
                .with_memory_cells(128)
        );
        assert_eq!(options.timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            parse_args(&args(&["prog.bin", "--entry"])),
            Err(CliError::MissingValue { .. })
        ));
        assert!(matches!(
            parse_args(&args(&["prog.bin", "--gas-limit", "lots"])),
            Err(CliError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_args(&args(&["prog.bin", "--jump-table", "1,x"])),
            Err(CliError::InvalidValue { value, .. }) if value == "x"
        ));
        assert!(matches!(
            parse_args(&args(&["prog.bin", "--verbose"])),
            Err(CliError::UnexpectedArgument(arg)) if arg == "--verbose"
        ));
    }

    #[test]
    fn load_and_run_file() {
        let file = write_program(&[
            Instruction::PushI64 { value: 2 },
            Instruction::PushI64 { value: 3 },
            Instruction::Mul {},
            Instruction::Halt {},
        ]);
        let program = load_program(file.path(), 0, &[]).unwrap();
        assert_eq!(program.stream().len(), 20);
        match run_program(&program, Limits::default(), None) {
            Outcome::Halted(state) => {
                assert_eq!(state.stack().as_slice().len(), 1);
                assert_eq!(state.stack().peek().map(|v| v.to_string()), Some("6".into()));
            }
            other => panic!("expected halt, got {other:?}"),
        }
    }

    #[test]
    fn load_rejects_bad_jump_table() {
        let file = write_program(&[Instruction::PushI64 { value: 1 }, Instruction::Halt {}]);
        let err = load_program(file.path(), 0, &[9, 4]).unwrap_err();
        match err {
            CliError::Load(fault) => {
                assert_eq!(fault, Fault::from(InvalidJumpOffset::new(4, None)))
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.bin");
        assert!(matches!(
            load_program(&missing, 0, &[]),
            Err(CliError::Read { .. })
        ));
    }

    #[test]
    fn timeout_cancels_endless_program() {
        let mut b = ProgramBuilder::new();
        b.label("top").unwrap();
        b.emit_jump(Instruction::Jump { target: 0 }, "top").unwrap();
        let program = b.build().unwrap();
        let limits = Limits::default().with_gas_limit(u64::MAX);
        let outcome = run_program(&program, limits, Some(Duration::from_millis(20)));
        assert!(matches!(outcome, Outcome::Cancelled));
    }

    #[test]
    fn timeout_does_not_affect_quick_programs() {
        let file = write_program(&[Instruction::Halt {}]);
        let program = load_program(file.path(), 0, &[]).unwrap();
        let outcome = run_program(&program, Limits::default(), Some(Duration::from_secs(5)));
        assert!(outcome.is_halted());
    }

    #[test]
    fn memory_and_locals_flags_reach_the_run() {
        // PUSH_I64 at 0, RECALL at 9.
        let file = write_program(&[
            Instruction::PushI64 { value: 4 },
            Instruction::Recall {},
            Instruction::Halt {},
        ]);
        let path = file.path().to_str().unwrap();
        let options = parse_args(&args(&[path, "--memory-cells", "4"])).unwrap();
        let program = load_program(&options.input, options.entry, &options.jump_table).unwrap();
        assert_eq!(
            run_program(&program, options.limits, None).fault(),
            Some(&Fault::MemoryOutOfBounds {
                offset: 9,
                address: 4,
                size: 4
            })
        );

        let file = write_program(&[Instruction::LoadLocal { slot: 2 }, Instruction::Halt {}]);
        let path = file.path().to_str().unwrap();
        let options = parse_args(&args(&[path, "--locals", "2"])).unwrap();
        let program = load_program(&options.input, options.entry, &options.jump_table).unwrap();
        assert_eq!(
            run_program(&program, options.limits, None).fault(),
            Some(&Fault::InvalidLocalSlot {
                offset: 0,
                slot: 2,
                available: 2
            })
        );
    }

    #[test]
    fn commas() {
        assert_eq!(format_with_commas(0), "0");
        assert_eq!(format_with_commas(999), "999");
        assert_eq!(format_with_commas(1_000), "1,000");
        assert_eq!(format_with_commas(10_000_000), "10,000,000");
    }
}
