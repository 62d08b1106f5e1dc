//! Execution core of a stack-based bytecode virtual machine.
//!
//! Provides the instruction set, program loading with jump-target
//! validation, and an interpreter with gas metering and cooperative
//! cancellation.

pub mod utils;
pub mod virtual_machine;
