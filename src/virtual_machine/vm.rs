//! Core virtual machine implementation.
//!
//! The [`Interpreter`] executes a [`Program`] with a stack-based model: every
//! instruction pops its operands from a shared operand stack and pushes its
//! results back. Integer arithmetic uses wrapping semantics so overflow never
//! panics.
//!
//! Each iteration of the loop checks for cancellation, decodes the
//! instruction at the pointer, charges its gas, executes it and applies the
//! resulting [`ExecutionEffect`]. Every control transfer routes its target
//! through [`jump::validate`] before the pointer moves.

pub mod gas;
pub mod memory;


use crate::virtual_machine::errors::{Fault, InvalidJumpOffset};
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::jump;
use crate::virtual_machine::program::Program;
use crate::virtual_machine::state::{CallFrame, ExecutionState, Locals, Value};
use gas::{CALL_ARG_GAS, GasCategory, MEMORY_ACCESS_GAS, TAKEN_BRANCH_GAS};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Default gas budget for one run.
pub const DEFAULT_GAS_LIMIT: u64 = 10_000_000;
/// Default maximum number of values on the operand stack.
pub const DEFAULT_MAX_STACK_DEPTH: usize = 1024;
/// Default maximum number of frames, the entry frame included.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;
/// Default number of local slots per frame.
pub const DEFAULT_LOCALS_PER_FRAME: usize = 16;

/// Resource bounds of one run.
///
/// Exceeding any of them faults the run, so every program terminates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Limits {
    pub gas_limit: u64,
    pub max_stack_depth: usize,
    pub max_call_depth: usize,
    pub locals_per_frame: usize,
    pub memory_cells: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            gas_limit: DEFAULT_GAS_LIMIT,
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            locals_per_frame: DEFAULT_LOCALS_PER_FRAME,
            memory_cells: memory::DEFAULT_MEMORY_CELLS,
        }
    }
}

impl Limits {
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = depth;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_locals_per_frame(mut self, count: usize) -> Self {
        self.locals_per_frame = count;
        self
    }

    pub fn with_memory_cells(mut self, cells: usize) -> Self {
        self.memory_cells = cells;
        self
    }
}

/// Cooperative cancellation flag shared between a run and its host.
///
/// Clones observe the same flag. The interpreter polls it once per
/// instruction.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Terminal result of a run.
#[derive(Debug)]
pub enum Outcome {
    /// Execution reached `HALT` or the end of the stream.
    Halted(ExecutionState),
    /// Execution stopped on a fault.
    Faulted(Fault),
    /// The cancel token was triggered before the run finished.
    Cancelled,
}

impl Outcome {
    pub fn is_halted(&self) -> bool {
        matches!(self, Outcome::Halted(_))
    }

    /// The final state of a halted run.
    pub fn state(&self) -> Option<&ExecutionState> {
        match self {
            Outcome::Halted(state) => Some(state),
            _ => None,
        }
    }

    /// The fault of a faulted run.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Outcome::Faulted(fault) => Some(fault),
            _ => None,
        }
    }
}

/// What the loop does after an instruction executed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecutionEffect {
    /// Continue with the next instruction in the stream.
    FallThrough,
    /// Transfer control to `target`.
    Jump { target: i64 },
    /// Push a frame taking `argc` arguments and transfer control to `target`.
    Call { target: i64, argc: u8 },
    /// Drop the current frame and resume at its return address.
    Return,
    /// Stop successfully.
    Halt,
}

/// State of a run after one [`Interpreter::step`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Running,
    Halted,
}

macro_rules! exec_vm {
    (
        vm = $vm:ident,
        state = $state:ident,
        at = $at:ident,
        instr = $instr:ident,
        { $( $variant:ident { $( $field:ident ),* } => $handler:ident ),* $(,)? }
    ) => {{
        let instr_name = $instr.mnemonic();
        match $instr {
            $(
                Instruction::$variant { $( $field ),* } => {
                    $vm.$handler(instr_name, $at, $state $(, $field )*)
                }
            ),*
        }
    }};
}

/// Bytecode interpreter over one borrowed [`Program`].
///
/// The interpreter holds no per-run state, so one instance (or many over the
/// same program) can drive any number of runs, each owning its
/// [`ExecutionState`].
pub struct Interpreter<'p> {
    program: &'p Program,
    limits: Limits,
    cancel: CancelToken,
}

impl<'p> Interpreter<'p> {
    /// Creates an interpreter with the given limits and a fresh cancel token.
    pub fn new(program: &'p Program, limits: Limits) -> Self {
        Self {
            program,
            limits,
            cancel: CancelToken::new(),
        }
    }

    /// Replaces the cancel token, typically with a clone held by the host.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Executes the program from its entry until it halts, faults or is
    /// cancelled.
    pub fn run(&self) -> Outcome {
        match self.start() {
            Ok(state) => self.resume(state),
            Err(fault) => Outcome::Faulted(fault),
        }
    }

    /// Validates the entry offset and creates the initial state.
    ///
    /// An invalid entry is reported without an instruction offset.
    pub fn start(&self) -> Result<ExecutionState, Fault> {
        let entry = jump::validate(self.program.entry(), self.program.stream(), None)?;
        Ok(ExecutionState::new(entry, &self.limits))
    }

    /// Continues `state` until it halts, faults or is cancelled.
    pub fn resume(&self, mut state: ExecutionState) -> Outcome {
        loop {
            if self.cancel.is_cancelled() {
                return Outcome::Cancelled;
            }
            match self.step(&mut state) {
                Ok(Status::Running) => {}
                Ok(Status::Halted) => return Outcome::Halted(state),
                Err(fault) => return Outcome::Faulted(fault),
            }
        }
    }

    /// Executes exactly one instruction.
    ///
    /// Reaching the end of the stream counts as halting. A pointer that is
    /// not on an instruction boundary of this program faults without
    /// executing anything, e.g. a state started on a different program.
    pub fn step(&self, state: &mut ExecutionState) -> Result<Status, Fault> {
        let stream = self.program.stream();
        let at = state.ip;
        if at >= stream.len() {
            return Ok(Status::Halted);
        }
        if !stream.is_decode_point(at) {
            return Err(InvalidJumpOffset::new(at as i64, None).into());
        }

        let (instruction, next) = stream.decode_at(at)?;
        state
            .gas
            .charge(GasCategory::OpcodeBase, instruction.opcode().base_gas())?;
        state.steps += 1;

        let effect = self.execute(instruction, at, state)?;
        self.apply(instruction.mnemonic(), effect, at, next, state)
    }

    /// Moves the instruction pointer according to `effect`.
    fn apply(
        &self,
        instr: &'static str,
        effect: ExecutionEffect,
        at: usize,
        next: usize,
        state: &mut ExecutionState,
    ) -> Result<Status, Fault> {
        let stream = self.program.stream();
        match effect {
            ExecutionEffect::FallThrough => {
                state.ip = next;
            }
            ExecutionEffect::Jump { target } => {
                let target = jump::validate(target, stream, Some(at))?;
                state
                    .gas
                    .charge(GasCategory::ControlTransfer, TAKEN_BRANCH_GAS)?;
                state.ip = target;
            }
            ExecutionEffect::Call { target, argc } => {
                let target = jump::validate(target, stream, Some(at))?;
                if state.frames.len() >= self.limits.max_call_depth {
                    return Err(Fault::CallDepthExceeded {
                        offset: at,
                        limit: self.limits.max_call_depth,
                    });
                }
                state.gas.charge(
                    GasCategory::CallOverhead,
                    CALL_ARG_GAS.saturating_mul(argc as u64),
                )?;

                let mut locals = Locals::new(self.limits.locals_per_frame);
                let args = state.stack.pop_n(argc as usize, instr, at)?;
                for (slot, value) in (0..=u8::MAX).zip(args) {
                    locals.set(slot, value, at)?;
                }
                state
                    .frames
                    .push(CallFrame::new(locals, Some(next as i64)));
                state.ip = target;
            }
            ExecutionEffect::Return => {
                if state.frames.len() <= 1 {
                    return Err(Fault::ReturnWithoutCall { offset: at });
                }
                let return_addr = state
                    .frames
                    .pop()
                    .and_then(|frame| frame.return_addr)
                    .ok_or(Fault::ReturnWithoutCall { offset: at })?;
                let target = jump::validate(return_addr, stream, Some(at))?;
                state
                    .gas
                    .charge(GasCategory::ControlTransfer, TAKEN_BRANCH_GAS)?;
                state.ip = target;
            }
            ExecutionEffect::Halt => return Ok(Status::Halted),
        }
        Ok(Status::Running)
    }

    /// Executes one decoded instruction located at `at`.
    pub fn execute(
        &self,
        instruction: Instruction,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        exec_vm! {
            vm = self,
            state = state,
            at = at,
            instr = instruction,
            {
                // Stack and locals
                Halt {} => op_halt,
                Nop {} => op_nop,
                PushI64 { value } => op_push_i64,
                PushBool { value } => op_push_bool,
                Pop {} => op_pop,
                Dup {} => op_dup,
                Swap {} => op_swap,
                LoadLocal { slot } => op_load_local,
                StoreLocal { slot } => op_store_local,
                Store {} => op_store,
                Recall {} => op_recall,
                // Integer arithmetic
                Add {} => op_add,
                Sub {} => op_sub,
                Mul {} => op_mul,
                Div {} => op_div,
                Mod {} => op_mod,
                Inc {} => op_inc,
                Dec {} => op_dec,
                Neg {} => op_neg,
                // Comparison / logic
                Eq {} => op_eq,
                Lt {} => op_lt,
                Le {} => op_le,
                Gt {} => op_gt,
                Ge {} => op_ge,
                And {} => op_and,
                Or {} => op_or,
                Xor {} => op_xor,
                Not {} => op_not,
                // Control Flow
                Jump { target } => op_jump,
                JumpIf { target } => op_jump_if,
                JumpUnless { target } => op_jump_unless,
                JumpIndirect {} => op_jump_indirect,
                JumpIfIndirect {} => op_jump_if_indirect,
                JumpTable {} => op_jump_table,
                Call { target, argc } => op_call,
                CallIndirect { argc } => op_call_indirect,
                Ret {} => op_ret,
            }
        }
    }

    fn int_binary(
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
        f: impl FnOnce(i64, i64) -> Value,
    ) -> Result<ExecutionEffect, Fault> {
        let b = state.stack.pop_int(instr, at)?;
        let a = state.stack.pop_int(instr, at)?;
        state.stack.push(f(a, b), at)?;
        Ok(ExecutionEffect::FallThrough)
    }

    fn int_unary(
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
        f: impl FnOnce(i64) -> i64,
    ) -> Result<ExecutionEffect, Fault> {
        let v = state.stack.pop_int(instr, at)?;
        state.stack.push(Value::Int(f(v)), at)?;
        Ok(ExecutionEffect::FallThrough)
    }

    /// Bitwise on two integers, logical on two booleans.
    fn logic_binary(
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
        int_op: impl FnOnce(i64, i64) -> i64,
        bool_op: impl FnOnce(bool, bool) -> bool,
    ) -> Result<ExecutionEffect, Fault> {
        let b = state.stack.pop(instr, at)?;
        let a = state.stack.pop(instr, at)?;
        let result = match (a, b) {
            (Value::Int(a), Value::Int(b)) => Value::Int(int_op(a, b)),
            (Value::Bool(a), Value::Bool(b)) => Value::Bool(bool_op(a, b)),
            (a, b) => {
                return Err(Fault::TypeMismatch {
                    instruction: instr,
                    offset: at,
                    expected: a.type_name(),
                    actual: b.type_name(),
                });
            }
        };
        state.stack.push(result, at)?;
        Ok(ExecutionEffect::FallThrough)
    }

    fn op_halt(
        &self,
        _instr: &'static str,
        _at: usize,
        _state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        Ok(ExecutionEffect::Halt)
    }

    fn op_nop(
        &self,
        _instr: &'static str,
        _at: usize,
        _state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        Ok(ExecutionEffect::FallThrough)
    }

    fn op_push_i64(
        &self,
        _instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
        value: i64,
    ) -> Result<ExecutionEffect, Fault> {
        state.stack.push(Value::Int(value), at)?;
        Ok(ExecutionEffect::FallThrough)
    }

    fn op_push_bool(
        &self,
        _instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
        value: bool,
    ) -> Result<ExecutionEffect, Fault> {
        state.stack.push(Value::Bool(value), at)?;
        Ok(ExecutionEffect::FallThrough)
    }

    fn op_pop(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        state.stack.pop(instr, at)?;
        Ok(ExecutionEffect::FallThrough)
    }

    fn op_dup(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        let top = *state.stack.peek().ok_or(Fault::StackUnderflow {
            instruction: instr,
            offset: at,
        })?;
        state.stack.push(top, at)?;
        Ok(ExecutionEffect::FallThrough)
    }

    fn op_swap(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        let b = state.stack.pop(instr, at)?;
        let a = state.stack.pop(instr, at)?;
        state.stack.push(b, at)?;
        state.stack.push(a, at)?;
        Ok(ExecutionEffect::FallThrough)
    }

    fn op_load_local(
        &self,
        _instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
        slot: u8,
    ) -> Result<ExecutionEffect, Fault> {
        let value = state.current_frame().locals.get(slot, at)?;
        state.stack.push(value, at)?;
        Ok(ExecutionEffect::FallThrough)
    }

    fn op_store_local(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
        slot: u8,
    ) -> Result<ExecutionEffect, Fault> {
        let value = state.stack.pop(instr, at)?;
        state.current_frame_mut().locals.set(slot, value, at)?;
        Ok(ExecutionEffect::FallThrough)
    }

    fn op_store(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        let address = state.stack.pop_int(instr, at)?;
        let value = state.stack.pop_int(instr, at)?;
        state.gas.charge(GasCategory::Memory, MEMORY_ACCESS_GAS)?;
        state.memory.set(address, value, at)?;
        Ok(ExecutionEffect::FallThrough)
    }

    fn op_recall(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        let address = state.stack.pop_int(instr, at)?;
        state.gas.charge(GasCategory::Memory, MEMORY_ACCESS_GAS)?;
        let value = state.memory.get(address, at)?;
        state.stack.push(Value::Int(value), at)?;
        Ok(ExecutionEffect::FallThrough)
    }

    fn op_add(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        Self::int_binary(instr, at, state, |a, b| Value::Int(a.wrapping_add(b)))
    }

    fn op_sub(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        Self::int_binary(instr, at, state, |a, b| Value::Int(a.wrapping_sub(b)))
    }

    fn op_mul(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        Self::int_binary(instr, at, state, |a, b| Value::Int(a.wrapping_mul(b)))
    }

    fn op_div(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        let b = state.stack.pop_int(instr, at)?;
        let a = state.stack.pop_int(instr, at)?;
        if b == 0 {
            return Err(Fault::DivisionByZero { offset: at });
        }
        state.stack.push(Value::Int(a.wrapping_div(b)), at)?;
        Ok(ExecutionEffect::FallThrough)
    }

    fn op_mod(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        let b = state.stack.pop_int(instr, at)?;
        let a = state.stack.pop_int(instr, at)?;
        if b == 0 {
            return Err(Fault::DivisionByZero { offset: at });
        }
        state.stack.push(Value::Int(a.wrapping_rem(b)), at)?;
        Ok(ExecutionEffect::FallThrough)
    }

    fn op_inc(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        Self::int_unary(instr, at, state, |v| v.wrapping_add(1))
    }

    fn op_dec(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        Self::int_unary(instr, at, state, |v| v.wrapping_sub(1))
    }

    fn op_neg(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        Self::int_unary(instr, at, state, i64::wrapping_neg)
    }

    fn op_eq(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        let b = state.stack.pop(instr, at)?;
        let a = state.stack.pop(instr, at)?;
        if a.type_name() != b.type_name() {
            return Err(Fault::TypeMismatch {
                instruction: instr,
                offset: at,
                expected: a.type_name(),
                actual: b.type_name(),
            });
        }
        state.stack.push(Value::Bool(a == b), at)?;
        Ok(ExecutionEffect::FallThrough)
    }

    fn op_lt(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        Self::int_binary(instr, at, state, |a, b| Value::Bool(a < b))
    }

    fn op_le(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        Self::int_binary(instr, at, state, |a, b| Value::Bool(a <= b))
    }

    fn op_gt(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        Self::int_binary(instr, at, state, |a, b| Value::Bool(a > b))
    }

    fn op_ge(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        Self::int_binary(instr, at, state, |a, b| Value::Bool(a >= b))
    }

    fn op_and(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        Self::logic_binary(instr, at, state, |a, b| a & b, |a, b| a && b)
    }

    fn op_or(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        Self::logic_binary(instr, at, state, |a, b| a | b, |a, b| a || b)
    }

    fn op_xor(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        Self::logic_binary(instr, at, state, |a, b| a ^ b, |a, b| a ^ b)
    }

    fn op_not(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        let result = match state.stack.pop(instr, at)? {
            Value::Int(v) => Value::Int(!v),
            Value::Bool(v) => Value::Bool(!v),
        };
        state.stack.push(result, at)?;
        Ok(ExecutionEffect::FallThrough)
    }

    fn op_jump(
        &self,
        _instr: &'static str,
        _at: usize,
        _state: &mut ExecutionState,
        target: i64,
    ) -> Result<ExecutionEffect, Fault> {
        Ok(ExecutionEffect::Jump { target })
    }

    fn op_jump_if(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
        target: i64,
    ) -> Result<ExecutionEffect, Fault> {
        if state.stack.pop_bool(instr, at)? {
            return Ok(ExecutionEffect::Jump { target });
        }
        Ok(ExecutionEffect::FallThrough)
    }

    fn op_jump_unless(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
        target: i64,
    ) -> Result<ExecutionEffect, Fault> {
        if !state.stack.pop_bool(instr, at)? {
            return Ok(ExecutionEffect::Jump { target });
        }
        Ok(ExecutionEffect::FallThrough)
    }

    fn op_jump_indirect(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        let target = state.stack.pop_int(instr, at)?;
        Ok(ExecutionEffect::Jump { target })
    }

    fn op_jump_if_indirect(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        let target = state.stack.pop_int(instr, at)?;
        if state.stack.pop_bool(instr, at)? {
            return Ok(ExecutionEffect::Jump { target });
        }
        Ok(ExecutionEffect::FallThrough)
    }

    fn op_jump_table(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        let index = state.stack.pop_int(instr, at)?;
        let table = self.program.jump_table();
        let target = usize::try_from(index)
            .ok()
            .and_then(|i| table.get(i))
            .ok_or(Fault::JumpTableIndexOutOfBounds {
                offset: at,
                index,
                len: table.len(),
            })?;
        Ok(ExecutionEffect::Jump {
            target: *target as i64,
        })
    }

    fn op_call(
        &self,
        _instr: &'static str,
        _at: usize,
        _state: &mut ExecutionState,
        target: i64,
        argc: u8,
    ) -> Result<ExecutionEffect, Fault> {
        Ok(ExecutionEffect::Call { target, argc })
    }

    fn op_call_indirect(
        &self,
        instr: &'static str,
        at: usize,
        state: &mut ExecutionState,
        argc: u8,
    ) -> Result<ExecutionEffect, Fault> {
        let target = state.stack.pop_int(instr, at)?;
        Ok(ExecutionEffect::Call { target, argc })
    }

    fn op_ret(
        &self,
        _instr: &'static str,
        _at: usize,
        _state: &mut ExecutionState,
    ) -> Result<ExecutionEffect, Fault> {
        Ok(ExecutionEffect::Return)
    }
}
