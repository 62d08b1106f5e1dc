//! Stack-based bytecode virtual machine with validated control flow.
//!
//! A host loads a byte-encoded [`program::Program`] and hands it to a
//! [`vm::Interpreter`], which runs it to one of three outcomes: halted,
//! faulted or cancelled.
//!
//! # Architecture
//!
//! - **Operand stack**: typed [`state::Value`]s (`Int`, `Bool`) shared by all frames
//! - **Frames**: each call gets its own local slots; arguments land in slots `0..argc`
//! - **Instruction format**: one opcode byte followed by fixed-size little-endian operands
//! - **Control flow**: every jump, branch, call and return target is checked for
//!   bounds and instruction alignment before the pointer moves
//! - **Gas metering**: execution is bounded by a gas limit with category profiling
//!
//! # Modules
//!
//! - [`errors`]: Fault taxonomy and builder errors
//! - [`isa`]: Instruction set definition and opcode mappings
//! - [`jump`]: Jump target validation
//! - [`operand`]: Operand decoding cursor
//! - [`program`]: Instruction streams, programs and the program builder
//! - [`state`]: Values, operand stack, frames and execution state
//! - [`vm`]: Interpreter loop, limits, cancellation and gas metering

pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod jump;
pub mod operand;
pub mod program;
pub mod state;
pub mod vm;
