//! Operand decoding cursor.
//!
//! [`OperandReader`] walks the operand bytes of one instruction. Running out
//! of bytes is reported as [`Fault::TruncatedInstruction`] against the
//! instruction's own offset, never as a panic.

use crate::virtual_machine::errors::Fault;

pub struct OperandReader<'a> {
    code: &'a [u8],
    /// Offset of the opcode byte of the instruction being decoded.
    instr_offset: usize,
    /// Next byte to read.
    pos: usize,
}

impl<'a> OperandReader<'a> {
    /// Positions the reader right after the opcode byte at `instr_offset`.
    pub fn new(code: &'a [u8], instr_offset: usize) -> Self {
        Self {
            code,
            instr_offset,
            pos: instr_offset.saturating_add(1),
        }
    }

    /// Offset of the first byte not consumed yet.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Reads exactly `N` bytes and advances.
    fn read_exact<const N: usize>(&mut self) -> Result<[u8; N], Fault> {
        let available = self.code.len().saturating_sub(self.pos);
        let truncated = Fault::TruncatedInstruction {
            offset: self.instr_offset,
            requested: N,
            available,
        };
        let end = self.pos.checked_add(N).ok_or(truncated.clone())?;
        let bytes: [u8; N] = self
            .code
            .get(self.pos..end)
            .and_then(|s| s.try_into().ok())
            .ok_or(truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, Fault> {
        Ok(self.read_exact::<1>()?[0])
    }

    /// Reads a boolean byte (0 = false, nonzero = true).
    pub fn read_bool(&mut self) -> Result<bool, Fault> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a little-endian i64 immediate.
    pub fn read_i64(&mut self) -> Result<i64, Fault> {
        Ok(i64::from_le_bytes(self.read_exact::<8>()?))
    }
}
