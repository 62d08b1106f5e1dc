//! Mutable interpreter context.
//!
//! An [`ExecutionState`] is owned by exactly one run. It holds the
//! instruction pointer, the operand stack, the call frames with their local
//! slots, data memory and gas accounting.

use crate::virtual_machine::errors::Fault;
use crate::virtual_machine::vm::Limits;
use crate::virtual_machine::vm::gas::GasMeter;
use crate::virtual_machine::vm::memory::Memory;
use std::fmt;

/// Runtime value stored on the operand stack, in locals and in memory cells.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Value {
    /// 64-bit signed integer.
    Int(i64),
    /// Boolean value.
    Bool(bool),
}

impl Value {
    /// Returns the type name for error messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Bool(_) => "Bool",
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Int(0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// Bounded LIFO operand stack shared by all frames of a run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperandStack {
    values: Vec<Value>,
    limit: usize,
}

impl OperandStack {
    pub fn new(limit: usize) -> Self {
        Self {
            values: Vec::new(),
            limit,
        }
    }

    /// Pushes a value on behalf of the instruction at `offset`.
    ///
    /// Returns [`Fault::StackOverflow`] if the stack is at its limit.
    pub fn push(&mut self, value: Value, offset: usize) -> Result<(), Fault> {
        if self.values.len() >= self.limit {
            return Err(Fault::StackOverflow {
                offset,
                limit: self.limit,
            });
        }
        self.values.push(value);
        Ok(())
    }

    /// Pops the top value on behalf of `instr` at `offset`.
    ///
    /// Returns [`Fault::StackUnderflow`] if the stack is empty.
    pub fn pop(&mut self, instr: &'static str, offset: usize) -> Result<Value, Fault> {
        self.values.pop().ok_or(Fault::StackUnderflow {
            instruction: instr,
            offset,
        })
    }

    /// Pops an integer.
    ///
    /// Returns [`Fault::TypeMismatch`] if the top value is not an integer.
    pub fn pop_int(&mut self, instr: &'static str, offset: usize) -> Result<i64, Fault> {
        match self.pop(instr, offset)? {
            Value::Int(v) => Ok(v),
            other => Err(Fault::TypeMismatch {
                instruction: instr,
                offset,
                expected: "Int",
                actual: other.type_name(),
            }),
        }
    }

    /// Pops a boolean.
    ///
    /// Returns [`Fault::TypeMismatch`] if the top value is not a boolean.
    pub fn pop_bool(&mut self, instr: &'static str, offset: usize) -> Result<bool, Fault> {
        match self.pop(instr, offset)? {
            Value::Bool(v) => Ok(v),
            other => Err(Fault::TypeMismatch {
                instruction: instr,
                offset,
                expected: "Bool",
                actual: other.type_name(),
            }),
        }
    }

    /// Pops `count` values, returned in push order.
    pub fn pop_n(
        &mut self,
        count: usize,
        instr: &'static str,
        offset: usize,
    ) -> Result<Vec<Value>, Fault> {
        if count > self.values.len() {
            return Err(Fault::StackUnderflow {
                instruction: instr,
                offset,
            });
        }
        let split = self.values.len() - count;
        Ok(self.values.split_off(split))
    }

    /// Returns the top value without removing it.
    pub fn peek(&self) -> Option<&Value> {
        self.values.last()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values from bottom to top.
    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }
}

/// Fixed set of local slots owned by one frame.
///
/// Slots start as `Int(0)`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Locals {
    slots: Vec<Value>,
}

impl Locals {
    pub fn new(count: usize) -> Self {
        Self {
            slots: vec![Value::default(); count],
        }
    }

    /// The value in `slot`, if the frame has it.
    pub fn value(&self, slot: u8) -> Option<Value> {
        self.slots.get(slot as usize).copied()
    }

    /// Reads `slot` for the instruction at `offset`.
    ///
    /// Returns [`Fault::InvalidLocalSlot`] if `slot` is out of bounds.
    pub fn get(&self, slot: u8, offset: usize) -> Result<Value, Fault> {
        self.value(slot).ok_or(Fault::InvalidLocalSlot {
            offset,
            slot,
            available: self.slots.len(),
        })
    }

    /// Stores `value` into `slot` for the instruction at `offset`.
    ///
    /// Returns [`Fault::InvalidLocalSlot`] if `slot` is out of bounds.
    pub fn set(&mut self, slot: u8, value: Value, offset: usize) -> Result<(), Fault> {
        let available = self.slots.len();
        let entry = self
            .slots
            .get_mut(slot as usize)
            .ok_or(Fault::InvalidLocalSlot {
                offset,
                slot,
                available,
            })?;
        *entry = value;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Activation record for one call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallFrame {
    pub(crate) locals: Locals,
    /// Offset to resume at after `RET`; `None` for the entry frame.
    ///
    /// Kept signed and unvalidated: `RET` passes it through the jump
    /// validator like any other target.
    pub(crate) return_addr: Option<i64>,
}

impl CallFrame {
    pub fn new(locals: Locals, return_addr: Option<i64>) -> Self {
        Self {
            locals,
            return_addr,
        }
    }

    pub fn locals(&self) -> &Locals {
        &self.locals
    }

    pub fn return_addr(&self) -> Option<i64> {
        self.return_addr
    }
}

/// Complete state of one run.
#[derive(Clone, Debug)]
pub struct ExecutionState {
    /// Offset of the next instruction to execute.
    pub(crate) ip: usize,
    pub(crate) stack: OperandStack,
    /// Never empty while running; index 0 is the entry frame.
    pub(crate) frames: Vec<CallFrame>,
    pub(crate) memory: Memory,
    pub(crate) gas: GasMeter,
    /// Instructions executed so far.
    pub(crate) steps: u64,
}

impl ExecutionState {
    /// Creates the state for a run entered at the already validated `entry`.
    ///
    /// Only [`Interpreter::start`](crate::virtual_machine::vm::Interpreter::start)
    /// builds states, so every run begins on a checked offset.
    pub(crate) fn new(entry: usize, limits: &Limits) -> Self {
        Self {
            ip: entry,
            stack: OperandStack::new(limits.max_stack_depth),
            frames: vec![CallFrame::new(Locals::new(limits.locals_per_frame), None)],
            memory: Memory::new(limits.memory_cells),
            gas: GasMeter::new(limits.gas_limit),
            steps: 0,
        }
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn stack(&self) -> &OperandStack {
        &self.stack
    }

    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    /// Number of active frames, the entry frame included.
    pub fn call_depth(&self) -> usize {
        self.frames.len()
    }

    /// Returns a local of the innermost frame.
    pub fn local(&self, slot: u8) -> Option<Value> {
        self.current_frame().locals.value(slot)
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn gas(&self) -> &GasMeter {
        &self.gas
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub(crate) fn current_frame(&self) -> &CallFrame {
        // `frames` always holds the entry frame.
        &self.frames[self.frames.len() - 1]
    }

    pub(crate) fn current_frame_mut(&mut self) -> &mut CallFrame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }
}
