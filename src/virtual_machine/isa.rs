//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical instruction table and hands it to a callback macro, so the
//! decoder, the encoder and the ISA fingerprint check are all generated from
//! one list.
//!
//! This module generates:
//! - The [`Opcode`] enum with byte mappings, mnemonics, gas costs and sizes
//! - The decoded [`Instruction`] enum with typed operands
//! - [`Instruction::decode`] and [`Instruction::encode`]
//!
//! # Bytecode Format
//!
//! Instructions use variable-length encoding:
//! - Opcode: 1 byte
//! - Immediate i64 (targets, constants): 8 bytes (little-endian)
//! - Immediate u8 (local slots, argument counts): 1 byte
//! - Boolean: 1 byte (0 = false, nonzero = true)

use crate::virtual_machine::errors::Fault;
use crate::virtual_machine::operand::OperandReader;

/// Invokes a callback macro with the complete instruction definition list.
///
/// Each entry is `Name = opcode, "MNEMONIC" => [operand: Kind, ...], gas`.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Stack and locals
            // =========================
            /// HALT ; stop execution successfully
            Halt = 0x00, "HALT" => [], 1,
            /// NOP ; do nothing
            Nop = 0x01, "NOP" => [], 1,
            /// PUSH_I64 imm64 ; push imm64
            PushI64 = 0x02, "PUSH_I64" => [value: ImmI64], 1,
            /// PUSH_BOOL true|false ; push a boolean
            PushBool = 0x03, "PUSH_BOOL" => [value: Bool], 1,
            /// POP ; discard the top value
            Pop = 0x04, "POP" => [], 1,
            /// DUP ; push a copy of the top value
            Dup = 0x05, "DUP" => [], 1,
            /// SWAP ; exchange the two top values
            Swap = 0x06, "SWAP" => [], 1,
            /// LOAD_LOCAL slot ; push locals[slot]
            LoadLocal = 0x07, "LOAD_LOCAL" => [slot: ImmU8], 2,
            /// STORE_LOCAL slot ; locals[slot] = pop
            StoreLocal = 0x08, "STORE_LOCAL" => [slot: ImmU8], 2,
            /// STORE ; addr = pop, value = pop, memory[addr] = value
            Store = 0x09, "STORE" => [], 5,
            /// RECALL ; addr = pop, push memory[addr]
            Recall = 0x0A, "RECALL" => [], 5,
            // =========================
            // Integer arithmetic
            // =========================
            /// ADD ; b = pop, a = pop, push a + b (wrapping)
            Add = 0x10, "ADD" => [], 3,
            /// SUB ; b = pop, a = pop, push a - b (wrapping)
            Sub = 0x11, "SUB" => [], 3,
            /// MUL ; b = pop, a = pop, push a * b (wrapping)
            Mul = 0x12, "MUL" => [], 5,
            /// DIV ; b = pop, a = pop, push a / b (fault on division by zero)
            Div = 0x13, "DIV" => [], 10,
            /// MOD ; b = pop, a = pop, push a % b (fault on division by zero)
            Mod = 0x14, "MOD" => [], 10,
            /// INC ; push pop + 1
            Inc = 0x15, "INC" => [], 2,
            /// DEC ; push pop - 1
            Dec = 0x16, "DEC" => [], 2,
            /// NEG ; push -pop
            Neg = 0x17, "NEG" => [], 2,
            // =========================
            // Comparison / logic
            // =========================
            /// EQ ; push (a == b) for two values of the same type
            Eq = 0x20, "EQ" => [], 3,
            /// LT ; push (a < b)
            Lt = 0x21, "LT" => [], 3,
            /// LE ; push (a <= b)
            Le = 0x22, "LE" => [], 3,
            /// GT ; push (a > b)
            Gt = 0x23, "GT" => [], 3,
            /// GE ; push (a >= b)
            Ge = 0x24, "GE" => [], 3,
            /// AND ; bitwise on integers, logical on booleans
            And = 0x25, "AND" => [], 2,
            /// OR ; bitwise on integers, logical on booleans
            Or = 0x26, "OR" => [], 2,
            /// XOR ; bitwise on integers, logical on booleans
            Xor = 0x27, "XOR" => [], 2,
            /// NOT ; bitwise on integers, logical on booleans
            Not = 0x28, "NOT" => [], 1,
            // =========================
            // Control Flow
            // =========================
            /// JUMP target ; PC = target
            Jump = 0x30, "JUMP" => [target: ImmI64], 5,
            /// JUMP_IF target ; if pop then PC = target
            JumpIf = 0x31, "JUMP_IF" => [target: ImmI64], 5,
            /// JUMP_UNLESS target ; if !pop then PC = target
            JumpUnless = 0x32, "JUMP_UNLESS" => [target: ImmI64], 5,
            /// JUMP_INDIRECT ; PC = pop
            JumpIndirect = 0x33, "JUMP_INDIRECT" => [], 5,
            /// JUMP_IF_INDIRECT ; target = pop, if pop then PC = target
            JumpIfIndirect = 0x34, "JUMP_IF_INDIRECT" => [], 5,
            /// JUMP_TABLE ; PC = jump_table[pop]
            JumpTable = 0x35, "JUMP_TABLE" => [], 8,
            /// CALL target, argc ; move argc values into a new frame's locals, PC = target
            Call = 0x36, "CALL" => [target: ImmI64, argc: ImmU8], 50,
            /// CALL_INDIRECT argc ; target = pop, then as CALL
            CallIndirect = 0x37, "CALL_INDIRECT" => [argc: ImmU8], 50,
            /// RET ; drop the current frame, PC = its return address
            Ret = 0x38, "RET" => [], 5,
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    // ---------- types ----------
    (@ty ImmU8)  => { u8 };
    (@ty Bool)   => { bool };
    (@ty ImmI64) => { i64 };

    // ---------- encoded operand sizes ----------
    (@size ImmU8)  => { 1 };
    (@size Bool)   => { 1 };
    (@size ImmI64) => { 8 };

    // ---------- decoding ----------
    (@read $reader:ident, ImmU8)  => { $reader.read_u8()? };
    (@read $reader:ident, Bool)   => { $reader.read_bool()? };
    (@read $reader:ident, ImmI64) => { $reader.read_i64()? };

    // ---------- encoding ----------
    (@emit $out:ident, ImmU8, $v:ident) => {
        $out.push(*$v);
    };

    (@emit $out:ident, Bool, $v:ident) => {
        $out.push(if *$v { 1 } else { 0 });
    };

    (@emit $out:ident, ImmI64, $v:ident) => {
        $out.extend_from_slice(&$v.to_le_bytes());
    };

    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $gas:expr
        ),* $(,)?
    ) => {
        // =========================
        // Opcode enum
        // =========================
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Opcode {
            type Error = Fault;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Opcode::$name), )*
                    _ => Err(Fault::UnknownOpcode {
                        opcode: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Opcode {
            /// Every opcode in table order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name, )* ];

            /// Returns the assembly mnemonic for this opcode.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Returns the base gas cost for this opcode.
            pub const fn base_gas(&self) -> u64 {
                match self {
                    $( Opcode::$name => $gas, )*
                }
            }

            /// Returns the encoded length in bytes, opcode byte included.
            pub const fn size(&self) -> usize {
                match self {
                    $( Opcode::$name => 1 $( + $crate::define_instructions!(@size $kind) )*, )*
                }
            }
        }

        // =========================
        // Decoded instruction enum
        // =========================
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name { $( $field: $crate::define_instructions!(@ty $kind) ),* },
            )*
        }

        impl Instruction {
            /// Returns the opcode of this instruction.
            pub const fn opcode(&self) -> Opcode {
                match self {
                    $( Instruction::$name { .. } => Opcode::$name, )*
                }
            }

            /// Decodes the instruction starting at `offset`.
            ///
            /// Returns the instruction and the offset of the byte right after it.
            pub fn decode(code: &[u8], offset: usize) -> Result<(Instruction, usize), Fault> {
                let opcode_byte = *code.get(offset).ok_or(Fault::TruncatedInstruction {
                    offset,
                    requested: 1,
                    available: 0,
                })?;
                let opcode = Opcode::try_from(opcode_byte).map_err(|_| Fault::UnknownOpcode {
                    opcode: opcode_byte,
                    offset,
                })?;
                let mut reader = OperandReader::new(code, offset);
                let instruction = match opcode {
                    $(
                        Opcode::$name => Instruction::$name {
                            $( $field: $crate::define_instructions!(@read reader, $kind), )*
                        },
                    )*
                };
                Ok((instruction, reader.position()))
            }

            /// Appends the encoded instruction to `out`.
            pub fn encode(&self, out: &mut Vec<u8>) {
                match self {
                    $(
                        #[allow(unused_variables)]
                        Instruction::$name { $( $field ),* } => {
                            out.push(Opcode::$name as u8);
                            $( $crate::define_instructions!(@emit out, $kind, $field); )*
                        }
                    )*
                }
            }
        }
    };
}

for_each_instruction!(define_instructions);

impl Instruction {
    /// Returns the assembly mnemonic for this instruction.
    pub const fn mnemonic(&self) -> &'static str {
        self.opcode().mnemonic()
    }

    /// Returns the encoded length in bytes.
    pub const fn size(&self) -> usize {
        self.opcode().size()
    }

    /// Returns the encoded bytes of this instruction.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        self.encode(&mut out);
        out
    }

    /// The absolute target carried as an immediate, if any.
    pub const fn immediate_target(&self) -> Option<i64> {
        match self {
            Instruction::Jump { target }
            | Instruction::JumpIf { target }
            | Instruction::JumpUnless { target }
            | Instruction::Call { target, .. } => Some(*target),
            _ => None,
        }
    }
}
