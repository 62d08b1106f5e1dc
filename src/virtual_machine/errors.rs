//! Runtime faults and program construction errors.
//!
//! [`Fault`] is the closed taxonomy of everything that can stop a run. Each
//! variant carries only its own diagnostic payload, so hosts match on it
//! exhaustively instead of inspecting messages.

use std::fmt;

/// A control transfer asked for an offset that is outside the instruction
/// stream or not on an instruction boundary.
///
/// `faulty_instruction_offset` is present when the target came from a
/// specific instruction (jump, branch, call, return) and absent when it was
/// rejected before execution, e.g. the entry point or a jump table entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct InvalidJumpOffset {
    faulty_offset: i64,
    faulty_instruction_offset: Option<usize>,
}

impl InvalidJumpOffset {
    pub const fn new(faulty_offset: i64, faulty_instruction_offset: Option<usize>) -> Self {
        Self {
            faulty_offset,
            faulty_instruction_offset,
        }
    }

    /// The rejected target.
    pub const fn faulty_offset(&self) -> i64 {
        self.faulty_offset
    }

    /// Offset of the instruction that requested the jump, if known.
    pub const fn faulty_instruction_offset(&self) -> Option<usize> {
        self.faulty_instruction_offset
    }
}

impl fmt::Display for InvalidJumpOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.faulty_instruction_offset {
            Some(at) => write!(
                f,
                "Invalid jump offset {}; cannot jump. Caused by instruction at offset {}",
                self.faulty_offset, at
            ),
            None => write!(f, "Invalid jump offset {}; cannot jump.", self.faulty_offset),
        }
    }
}

impl std::error::Error for InvalidJumpOffset {}

/// Errors that terminate an execution.
///
/// A fault is built once where the violation is detected and returned
/// unchanged to the caller of the interpreter.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Fault {
    /// Control transfer to an out-of-bounds or misaligned offset.
    #[error(transparent)]
    InvalidJumpOffset(#[from] InvalidJumpOffset),
    /// Malformed instruction: the opcode byte is not part of the instruction set.
    #[error("unknown opcode 0x{opcode:02X} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    /// Malformed instruction: the stream ends inside the instruction.
    #[error(
        "truncated instruction at offset {offset}: {requested} more bytes needed, {available} available"
    )]
    TruncatedInstruction {
        offset: usize,
        requested: usize,
        available: usize,
    },
    /// An instruction needed more operands than the stack holds.
    #[error("stack underflow in {instruction} at offset {offset}")]
    StackUnderflow {
        instruction: &'static str,
        offset: usize,
    },
    /// Pushing would exceed the configured operand stack depth.
    #[error("operand stack overflow at offset {offset}: limit of {limit} values reached")]
    StackOverflow { offset: usize, limit: usize },
    /// An operand had the wrong runtime type.
    #[error("{instruction} at offset {offset} expected {expected} but got {actual}")]
    TypeMismatch {
        instruction: &'static str,
        offset: usize,
        expected: &'static str,
        actual: &'static str,
    },
    /// A local slot index past the frame's slots.
    #[error("local slot {slot} at offset {offset} out of bounds ({available} slots per frame)")]
    InvalidLocalSlot {
        offset: usize,
        slot: u8,
        available: usize,
    },
    /// `RET` executed in the entry frame.
    #[error("return without call at offset {offset}")]
    ReturnWithoutCall { offset: usize },
    /// A call would nest deeper than the configured limit.
    #[error("call at offset {offset} exceeds the call depth limit of {limit} frames")]
    CallDepthExceeded { offset: usize, limit: usize },
    /// `JUMP_TABLE` index outside the program's jump table.
    #[error(
        "jump table index {index} at offset {offset} out of bounds for table of {len} entries"
    )]
    JumpTableIndexOutOfBounds {
        offset: usize,
        index: i64,
        len: usize,
    },
    /// Memory access outside the data memory.
    #[error("address {address} exceeds the memory space of {size} cells (offset {offset})")]
    MemoryOutOfBounds {
        offset: usize,
        address: i64,
        size: usize,
    },
    /// `DIV` or `MOD` with a zero divisor.
    #[error("division by zero at offset {offset}")]
    DivisionByZero { offset: usize },
    /// The gas limit would be exceeded.
    #[error("out of gas: {used} used, limit is {limit}")]
    OutOfGas { used: u64, limit: u64 },
}

impl Fault {
    /// Name of the fault kind, stable across message changes.
    pub const fn kind(&self) -> &'static str {
        match self {
            Fault::InvalidJumpOffset(_) => "InvalidJumpOffset",
            Fault::UnknownOpcode { .. } => "UnknownOpcode",
            Fault::TruncatedInstruction { .. } => "TruncatedInstruction",
            Fault::StackUnderflow { .. } => "StackUnderflow",
            Fault::StackOverflow { .. } => "StackOverflow",
            Fault::TypeMismatch { .. } => "TypeMismatch",
            Fault::InvalidLocalSlot { .. } => "InvalidLocalSlot",
            Fault::ReturnWithoutCall { .. } => "ReturnWithoutCall",
            Fault::CallDepthExceeded { .. } => "CallDepthExceeded",
            Fault::JumpTableIndexOutOfBounds { .. } => "JumpTableIndexOutOfBounds",
            Fault::MemoryOutOfBounds { .. } => "MemoryOutOfBounds",
            Fault::DivisionByZero { .. } => "DivisionByZero",
            Fault::OutOfGas { .. } => "OutOfGas",
        }
    }

    /// True for faults raised while decoding rather than executing.
    pub const fn is_malformed_instruction(&self) -> bool {
        matches!(
            self,
            Fault::UnknownOpcode { .. } | Fault::TruncatedInstruction { .. }
        )
    }

    /// Offset of the instruction that raised the fault.
    ///
    /// `None` for jump faults raised before execution and for running out of
    /// gas, which is charged against the run rather than one instruction.
    pub const fn offset(&self) -> Option<usize> {
        match self {
            Fault::InvalidJumpOffset(jump) => jump.faulty_instruction_offset(),
            Fault::OutOfGas { .. } => None,
            Fault::UnknownOpcode { offset, .. }
            | Fault::TruncatedInstruction { offset, .. }
            | Fault::StackUnderflow { offset, .. }
            | Fault::StackOverflow { offset, .. }
            | Fault::TypeMismatch { offset, .. }
            | Fault::InvalidLocalSlot { offset, .. }
            | Fault::ReturnWithoutCall { offset }
            | Fault::CallDepthExceeded { offset, .. }
            | Fault::JumpTableIndexOutOfBounds { offset, .. }
            | Fault::MemoryOutOfBounds { offset, .. }
            | Fault::DivisionByZero { offset } => Some(*offset),
        }
    }

    /// The jump payload, if this is an [`InvalidJumpOffset`] fault.
    pub const fn as_invalid_jump(&self) -> Option<&InvalidJumpOffset> {
        match self {
            Fault::InvalidJumpOffset(jump) => Some(jump),
            _ => None,
        }
    }
}

/// Errors raised while assembling a program with
/// [`ProgramBuilder`](super::program::ProgramBuilder).
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum BuildError {
    /// Label defined more than once.
    #[error("duplicate label: {0}")]
    DuplicateLabel(String),
    /// Reference to a label that was never placed.
    #[error("undefined label: {0}")]
    UndefinedLabel(String),
    /// Only instructions whose first operand is an absolute target can take a label.
    #[error("{mnemonic} has no jump target operand to resolve a label into")]
    NotALabelledJump { mnemonic: &'static str },
    /// The assembled program failed load-time validation.
    #[error("program rejected: {0}")]
    Load(#[from] Fault),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_jump_message_without_instruction() {
        let fault = InvalidJumpOffset::new(10, None);
        assert_eq!(fault.to_string(), "Invalid jump offset 10; cannot jump.");
        assert_eq!(fault.faulty_offset(), 10);
        assert_eq!(fault.faulty_instruction_offset(), None);
    }

    #[test]
    fn invalid_jump_message_with_instruction() {
        let fault = InvalidJumpOffset::new(100, Some(3));
        assert_eq!(
            fault.to_string(),
            "Invalid jump offset 100; cannot jump. Caused by instruction at offset 3"
        );
        assert_eq!(fault.faulty_instruction_offset(), Some(3));
    }

    #[test]
    fn invalid_jump_message_negative_target() {
        let fault = InvalidJumpOffset::new(-4, Some(0));
        assert_eq!(
            fault.to_string(),
            "Invalid jump offset -4; cannot jump. Caused by instruction at offset 0"
        );
    }

    #[test]
    fn fault_is_transparent_over_jump_payload() {
        let jump = InvalidJumpOffset::new(7, Some(2));
        let fault = Fault::from(jump);
        assert_eq!(fault.to_string(), jump.to_string());
        assert_eq!(fault.kind(), "InvalidJumpOffset");
        assert_eq!(fault.as_invalid_jump(), Some(&jump));
    }

    #[test]
    fn formatting_is_idempotent() {
        let fault = Fault::from(InvalidJumpOffset::new(i64::MIN, Some(usize::MAX)));
        let first = fault.to_string();
        let second = fault.to_string();
        assert_eq!(first.as_bytes(), second.as_bytes());
        assert_eq!(fault.clone().to_string(), first);
    }

    #[test]
    fn malformed_instruction_kinds() {
        assert!(
            Fault::UnknownOpcode {
                opcode: 0xFF,
                offset: 0
            }
            .is_malformed_instruction()
        );
        assert!(
            Fault::TruncatedInstruction {
                offset: 1,
                requested: 8,
                available: 2
            }
            .is_malformed_instruction()
        );
        assert!(!Fault::DivisionByZero { offset: 0 }.is_malformed_instruction());
    }

    #[test]
    fn sibling_fault_messages() {
        assert_eq!(
            Fault::UnknownOpcode {
                opcode: 0xAB,
                offset: 12
            }
            .to_string(),
            "unknown opcode 0xAB at offset 12"
        );
        assert_eq!(
            Fault::MemoryOutOfBounds {
                offset: 9,
                address: 70000,
                size: 65535
            }
            .to_string(),
            "address 70000 exceeds the memory space of 65535 cells (offset 9)"
        );
        assert_eq!(
            Fault::StackOverflow {
                offset: 3,
                limit: 1024
            }
            .to_string(),
            "operand stack overflow at offset 3: limit of 1024 values reached"
        );
        assert_eq!(
            Fault::StackUnderflow {
                instruction: "ADD",
                offset: 4
            }
            .to_string(),
            "stack underflow in ADD at offset 4"
        );
    }

    #[test]
    fn runtime_faults_carry_their_offset() {
        let located = [
            Fault::StackOverflow { offset: 1, limit: 4 },
            Fault::InvalidLocalSlot {
                offset: 2,
                slot: 9,
                available: 4,
            },
            Fault::CallDepthExceeded { offset: 3, limit: 8 },
            Fault::JumpTableIndexOutOfBounds {
                offset: 4,
                index: -1,
                len: 2,
            },
            Fault::MemoryOutOfBounds {
                offset: 5,
                address: 70000,
                size: 4,
            },
        ];
        for (expected, fault) in (1..).zip(located.iter()) {
            assert_eq!(fault.offset(), Some(expected), "{}", fault.kind());
        }

        assert_eq!(
            Fault::from(InvalidJumpOffset::new(12, Some(7))).offset(),
            Some(7)
        );
        assert_eq!(Fault::from(InvalidJumpOffset::new(12, None)).offset(), None);
        assert_eq!(Fault::OutOfGas { used: 5, limit: 4 }.offset(), None);
    }

    #[test]
    fn build_error_wraps_fault() {
        let err = BuildError::from(Fault::from(InvalidJumpOffset::new(99, None)));
        assert_eq!(
            err.to_string(),
            "program rejected: Invalid jump offset 99; cannot jump."
        );
    }
}
