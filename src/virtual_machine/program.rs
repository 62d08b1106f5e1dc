//! Loaded program representation.
//!
//! [`InstructionStream`] is the immutable, shareable byte buffer the
//! interpreter executes, together with its instruction boundary map.
//! [`Program`] bundles a stream with its entry offset and jump table.
//! [`ProgramBuilder`] assembles programs in code, resolving labels into
//! absolute targets.

use crate::virtual_machine::errors::{BuildError, Fault};
use crate::virtual_machine::isa::{Instruction, Opcode};
use crate::virtual_machine::jump;
use crate::warn;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

/// Immutable instruction bytes plus the offsets where instructions start.
///
/// Cloning is cheap; clones share the same buffer, so one stream can back
/// any number of concurrent runs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstructionStream {
    code: Arc<[u8]>,
    /// `boundaries[i]` is true if an instruction starts at offset `i`.
    boundaries: Arc<[bool]>,
    /// Length of the prefix that decodes cleanly.
    decodable_len: usize,
}

impl InstructionStream {
    /// Wraps `code` and computes its instruction boundaries.
    ///
    /// Boundaries come from a linear sweep starting at offset 0. The sweep
    /// stops at the first unknown opcode or truncated instruction; no offset
    /// from there on is a boundary, so no jump can land in undecodable bytes.
    pub fn new(code: impl Into<Vec<u8>>) -> Self {
        let code: Vec<u8> = code.into();
        let mut boundaries = vec![false; code.len()];
        let mut offset = 0;

        while offset < code.len() {
            let size = match Opcode::try_from(code[offset]) {
                Ok(op) => op.size(),
                Err(_) => break,
            };
            if offset + size > code.len() {
                break;
            }
            boundaries[offset] = true;
            offset += size;
        }

        if offset < code.len() {
            warn!(
                "instruction stream of {} bytes only decodes up to offset {}",
                code.len(),
                offset
            );
        }

        Self {
            code: code.into(),
            boundaries: boundaries.into(),
            decodable_len: offset,
        }
    }

    /// Returns the number of bytes in the stream.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Returns true if the stream holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Returns the raw instruction bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.code
    }

    /// Returns true if an instruction starts exactly at `offset`.
    pub fn is_boundary(&self, offset: usize) -> bool {
        self.boundaries.get(offset).copied().unwrap_or(false)
    }

    /// Returns true if decoding may start at `offset`.
    ///
    /// That is every boundary plus the offset where the sweep stopped, so a
    /// run falling through into malformed bytes reports them as such.
    pub fn is_decode_point(&self, offset: usize) -> bool {
        self.is_boundary(offset) || (offset == self.decodable_len && offset < self.len())
    }

    /// Length of the prefix that the boundary sweep could decode.
    ///
    /// Equal to [`len`](Self::len) for well-formed streams.
    pub fn decodable_len(&self) -> usize {
        self.decodable_len
    }

    /// Iterates over the offsets at which instructions start.
    pub fn boundaries(&self) -> impl Iterator<Item = usize> + '_ {
        self.boundaries
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.then_some(i))
    }

    /// Decodes the instruction at `offset`.
    pub fn decode_at(&self, offset: usize) -> Result<(Instruction, usize), Fault> {
        Instruction::decode(&self.code, offset)
    }
}

impl Deref for InstructionStream {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl From<Vec<u8>> for InstructionStream {
    fn from(code: Vec<u8>) -> Self {
        Self::new(code)
    }
}

/// A loaded program: instructions, entry offset and jump table.
///
/// The entry offset is kept as given and validated when a run starts, so an
/// invalid entry surfaces as the first outcome of that run. Jump table
/// entries are validated here, at load time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Program {
    stream: InstructionStream,
    entry: i64,
    jump_table: Arc<[usize]>,
}

impl Program {
    /// Builds a program, rejecting any jump table entry that is not a valid
    /// jump target. Such faults carry no instruction offset.
    pub fn new(
        stream: impl Into<InstructionStream>,
        entry: i64,
        jump_table: &[i64],
    ) -> Result<Self, Fault> {
        let stream = stream.into();
        let jump_table = jump_table
            .iter()
            .map(|&target| jump::validate(target, &stream, None))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            stream,
            entry,
            jump_table: jump_table.into(),
        })
    }

    /// A program without jump table, entered at `entry`.
    pub fn with_entry(stream: impl Into<InstructionStream>, entry: i64) -> Self {
        Self {
            stream: stream.into(),
            entry,
            jump_table: Arc::from([]),
        }
    }

    pub fn stream(&self) -> &InstructionStream {
        &self.stream
    }

    /// The entry offset as supplied by the loader, not yet validated.
    pub fn entry(&self) -> i64 {
        self.entry
    }

    /// Validated jump table targets, indexed by `JUMP_TABLE`.
    pub fn jump_table(&self) -> &[usize] {
        &self.jump_table
    }
}

/// A pending label reference to patch once all labels are known.
struct Fixup {
    /// Offset of the 8-byte target immediate.
    at: usize,
    label: String,
}

/// Programmatic assembler producing a [`Program`].
///
/// Instructions are appended in order. Jumps and calls can name a label
/// instead of an offset; labels may be placed before or after use.
///
/// ```
/// use vmcore::virtual_machine::isa::Instruction;
/// use vmcore::virtual_machine::program::ProgramBuilder;
///
/// let mut b = ProgramBuilder::new();
/// b.emit(Instruction::PushBool { value: true });
/// b.emit_jump(Instruction::JumpIf { target: 0 }, "done").unwrap();
/// b.emit(Instruction::Nop {});
/// b.label("done").unwrap();
/// b.emit(Instruction::Halt {});
/// let program = b.build().unwrap();
/// assert_eq!(program.stream().len(), 13);
/// ```
#[derive(Default)]
pub struct ProgramBuilder {
    code: Vec<u8>,
    labels: HashMap<String, usize>,
    fixups: Vec<Fixup>,
    entry: Option<String>,
    jump_table: Vec<String>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset at which the next instruction will be placed.
    pub fn here(&self) -> usize {
        self.code.len()
    }

    /// Appends an instruction and returns its offset.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        let at = self.here();
        instruction.encode(&mut self.code);
        at
    }

    /// Appends raw bytes, e.g. to plant data or corrupt code in tests.
    pub fn emit_raw(&mut self, bytes: &[u8]) -> usize {
        let at = self.here();
        self.code.extend_from_slice(bytes);
        at
    }

    /// Appends a jump or call whose target is resolved from `label`.
    ///
    /// The target already present in `instruction` is ignored.
    pub fn emit_jump(&mut self, instruction: Instruction, label: &str) -> Result<usize, BuildError> {
        if instruction.immediate_target().is_none() {
            return Err(BuildError::NotALabelledJump {
                mnemonic: instruction.mnemonic(),
            });
        }
        let at = self.emit(instruction);
        self.fixups.push(Fixup {
            at: at + 1,
            label: label.to_string(),
        });
        Ok(at)
    }

    /// Names the current offset.
    pub fn label(&mut self, name: &str) -> Result<usize, BuildError> {
        let at = self.here();
        if self.labels.insert(name.to_string(), at).is_some() {
            return Err(BuildError::DuplicateLabel(name.to_string()));
        }
        Ok(at)
    }

    /// Enters the program at `label` instead of offset 0.
    pub fn entry(&mut self, label: &str) -> &mut Self {
        self.entry = Some(label.to_string());
        self
    }

    /// Appends `label` to the jump table and returns its index.
    pub fn jump_table_entry(&mut self, label: &str) -> usize {
        self.jump_table.push(label.to_string());
        self.jump_table.len() - 1
    }

    fn resolve(&self, label: &str) -> Result<usize, BuildError> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| BuildError::UndefinedLabel(label.to_string()))
    }

    /// Patches all label references and validates the jump table.
    pub fn build(mut self) -> Result<Program, BuildError> {
        let fixups = std::mem::take(&mut self.fixups);
        for fixup in &fixups {
            let target = self.resolve(&fixup.label)? as i64;
            self.code[fixup.at..fixup.at + 8].copy_from_slice(&target.to_le_bytes());
        }

        let entry = match &self.entry {
            Some(label) => self.resolve(label)? as i64,
            None => 0,
        };
        let table = self
            .jump_table
            .iter()
            .map(|label| self.resolve(label).map(|t| t as i64))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Program::new(self.code, entry, &table)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::errors::InvalidJumpOffset;

    fn code(instructions: &[Instruction]) -> Vec<u8> {
        let mut out = Vec::new();
        for i in instructions {
            i.encode(&mut out);
        }
        out
    }

    #[test]
    fn boundaries_follow_instruction_sizes() {
        let stream = InstructionStream::new(code(&[
            Instruction::Nop {},
            Instruction::PushI64 { value: 1 },
            Instruction::LoadLocal { slot: 0 },
            Instruction::Halt {},
        ]));
        assert_eq!(stream.boundaries().collect::<Vec<_>>(), vec![0, 1, 10, 12]);
        assert!(stream.is_boundary(10));
        assert!(!stream.is_boundary(5));
        assert!(!stream.is_decode_point(5));
        assert!(!stream.is_decode_point(stream.len()));
        assert!(!stream.is_boundary(13));
        assert_eq!(stream.decodable_len(), stream.len());
    }

    #[test]
    fn sweep_stops_at_unknown_opcode() {
        let mut bytes = code(&[Instruction::Nop {}, Instruction::Nop {}]);
        bytes.push(0xFF);
        bytes.extend(code(&[Instruction::Halt {}]));
        let stream = InstructionStream::new(bytes);
        assert_eq!(stream.decodable_len(), 2);
        assert!(stream.is_boundary(1));
        assert!(!stream.is_boundary(2));
        // Looks like HALT, but follows garbage.
        assert!(!stream.is_boundary(3));

        assert!(stream.is_decode_point(1));
        assert!(stream.is_decode_point(2));
        assert!(!stream.is_decode_point(3));
    }

    #[test]
    fn sweep_stops_at_truncated_tail() {
        let mut bytes = code(&[Instruction::Nop {}]);
        bytes.extend_from_slice(&[0x30, 0, 0]);
        let stream = InstructionStream::new(bytes);
        assert_eq!(stream.decodable_len(), 1);
        assert!(!stream.is_boundary(1));
        assert!(stream.is_decode_point(1));
        assert!(!stream.is_decode_point(2));
    }

    #[test]
    fn clones_share_the_buffer() {
        let stream = InstructionStream::new(code(&[Instruction::Halt {}]));
        let clone = stream.clone();
        assert!(std::ptr::eq(stream.as_slice(), clone.as_slice()));
    }

    #[test]
    fn jump_table_is_validated_without_instruction_context() {
        let bytes = code(&[Instruction::Nop {}, Instruction::PushI64 { value: 0 }]);
        let ok = Program::new(bytes.clone(), 0, &[0, 1]).unwrap();
        assert_eq!(ok.jump_table(), &[0, 1]);

        let err = Program::new(bytes.clone(), 0, &[1, 4]).unwrap_err();
        assert_eq!(err, Fault::from(InvalidJumpOffset::new(4, None)));
        assert_eq!(err.to_string(), "Invalid jump offset 4; cannot jump.");

        let err = Program::new(bytes, 0, &[-1]).unwrap_err();
        assert_eq!(err, Fault::from(InvalidJumpOffset::new(-1, None)));
    }

    #[test]
    fn entry_is_not_validated_at_load() {
        let program = Program::with_entry(code(&[Instruction::Halt {}]), -3);
        assert_eq!(program.entry(), -3);
    }

    #[test]
    fn builder_resolves_forward_and_backward_labels() {
        let mut b = ProgramBuilder::new();
        b.label("top").unwrap();
        b.emit(Instruction::Nop {});
        b.emit_jump(Instruction::Jump { target: 0 }, "end").unwrap();
        b.emit_jump(Instruction::Jump { target: 0 }, "top").unwrap();
        b.label("end").unwrap();
        b.emit(Instruction::Halt {});
        let program = b.build().unwrap();

        let (first_jump, _) = program.stream().decode_at(1).unwrap();
        assert_eq!(first_jump, Instruction::Jump { target: 19 });
        let (second_jump, _) = program.stream().decode_at(10).unwrap();
        assert_eq!(second_jump, Instruction::Jump { target: 0 });
    }

    #[test]
    fn builder_entry_and_jump_table() {
        let mut b = ProgramBuilder::new();
        b.emit(Instruction::Halt {});
        b.label("main").unwrap();
        b.emit(Instruction::Nop {});
        b.emit(Instruction::Halt {});
        b.entry("main");
        assert_eq!(b.jump_table_entry("main"), 0);
        let program = b.build().unwrap();
        assert_eq!(program.entry(), 1);
        assert_eq!(program.jump_table(), &[1]);
    }

    #[test]
    fn builder_errors() {
        let mut b = ProgramBuilder::new();
        b.label("a").unwrap();
        assert_eq!(b.label("a"), Err(BuildError::DuplicateLabel("a".into())));
        assert_eq!(
            b.emit_jump(Instruction::Ret {}, "a"),
            Err(BuildError::NotALabelledJump { mnemonic: "RET" })
        );

        let mut b = ProgramBuilder::new();
        b.emit_jump(Instruction::JumpUnless { target: 0 }, "nowhere")
            .unwrap();
        assert_eq!(
            b.build().unwrap_err(),
            BuildError::UndefinedLabel("nowhere".into())
        );
    }

    #[test]
    fn builder_rejects_jump_table_label_at_end() {
        let mut b = ProgramBuilder::new();
        b.emit(Instruction::Halt {});
        b.label("end").unwrap();
        b.jump_table_entry("end");
        assert_eq!(
            b.build().unwrap_err(),
            BuildError::Load(Fault::from(InvalidJumpOffset::new(1, None)))
        );
    }
}
