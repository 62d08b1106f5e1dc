//! Jump target validation.
//!
//! Every control transfer (jumps, branches, jump tables, calls and returns)
//! computes its target first and passes it through [`validate`] before the
//! instruction pointer changes. Entry points and jump tables go through the
//! same function without an instruction offset.

use crate::virtual_machine::errors::InvalidJumpOffset;
use crate::virtual_machine::program::InstructionStream;

/// Checks `0 <= target < stream_len`.
///
/// Returns the target as an offset on success.
pub fn check_bounds(
    target: i64,
    stream_len: usize,
    instruction_offset: Option<usize>,
) -> Result<usize, InvalidJumpOffset> {
    usize::try_from(target)
        .ok()
        .filter(|&t| t < stream_len)
        .ok_or(InvalidJumpOffset::new(target, instruction_offset))
}

/// Validates `target` as the next instruction pointer.
///
/// The target must lie inside the stream and start an instruction. On
/// failure the fault records `target` and, when given, the offset of the
/// instruction that asked for the transfer.
pub fn validate(
    target: i64,
    stream: &InstructionStream,
    instruction_offset: Option<usize>,
) -> Result<usize, InvalidJumpOffset> {
    let offset = check_bounds(target, stream.len(), instruction_offset)?;
    if !stream.is_boundary(offset) {
        return Err(InvalidJumpOffset::new(target, instruction_offset));
    }
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::isa::Instruction;

    /// Ten bytes: JUMP at 0 (9 bytes), HALT at 9.
    fn jump_then_halt() -> InstructionStream {
        let mut code = Vec::new();
        Instruction::Jump { target: 9 }.encode(&mut code);
        Instruction::Halt {}.encode(&mut code);
        InstructionStream::new(code)
    }

    /// Ten bytes: NOP at 0..5, PUSH_BOOL at 5 (operand at 6), NOP at 7..10.
    fn ten_byte_stream() -> InstructionStream {
        let mut code = Vec::new();
        for _ in 0..5 {
            Instruction::Nop {}.encode(&mut code);
        }
        Instruction::PushBool { value: false }.encode(&mut code);
        for _ in 0..3 {
            Instruction::Nop {}.encode(&mut code);
        }
        assert_eq!(code.len(), 10);
        InstructionStream::new(code)
    }

    #[test]
    fn in_bounds_aligned_targets_are_returned_unchanged() {
        let stream = ten_byte_stream();
        for target in stream.boundaries() {
            assert_eq!(validate(target as i64, &stream, None), Ok(target));
            assert_eq!(validate(target as i64, &stream, Some(7)), Ok(target));
        }
    }

    #[test]
    fn out_of_bounds_targets_are_rejected() {
        let stream = ten_byte_stream();
        for target in [-1, -100, i64::MIN, 10, 11, 1_000, i64::MAX] {
            let fault = validate(target, &stream, None).unwrap_err();
            assert_eq!(fault.faulty_offset(), target);
            assert_eq!(fault.faulty_instruction_offset(), None);
        }
    }

    #[test]
    fn misaligned_target_is_rejected() {
        let stream = jump_then_halt();
        for target in 1..9 {
            let fault = validate(target, &stream, Some(0)).unwrap_err();
            assert_eq!(fault, InvalidJumpOffset::new(target, Some(0)));
        }
        // Operand byte of PUSH_BOOL.
        assert!(validate(6, &ten_byte_stream(), None).is_err());
    }

    #[test]
    fn instruction_offset_is_carried_exactly() {
        let stream = ten_byte_stream();
        let with = validate(42, &stream, Some(3)).unwrap_err();
        assert_eq!(with.faulty_instruction_offset(), Some(3));
        assert!(with.to_string().ends_with("Caused by instruction at offset 3"));

        let without = validate(42, &stream, None).unwrap_err();
        assert_eq!(without.faulty_instruction_offset(), None);
        assert!(!without.to_string().contains("Caused by"));
    }

    #[test]
    fn target_equal_to_length_is_rejected() {
        let stream = ten_byte_stream();
        let fault = validate(10, &stream, None).unwrap_err();
        assert_eq!(fault.faulty_offset(), 10);
        assert_eq!(fault.faulty_instruction_offset(), None);
        assert_eq!(fault.to_string(), "Invalid jump offset 10; cannot jump.");
    }

    #[test]
    fn far_target_from_instruction_is_reported_with_both_offsets() {
        let stream = ten_byte_stream();
        let fault = validate(100, &stream, Some(3)).unwrap_err();
        assert_eq!(fault.faulty_offset(), 100);
        assert_eq!(fault.faulty_instruction_offset(), Some(3));
        let message = fault.to_string();
        assert!(message.contains("100"));
        assert!(message.contains('3'));
    }

    #[test]
    fn aligned_target_inside_stream_is_accepted() {
        assert_eq!(validate(5, &ten_byte_stream(), Some(3)), Ok(5));
    }

    #[test]
    fn verdicts_are_deterministic() {
        let stream = ten_byte_stream();
        for target in -3..14 {
            assert_eq!(
                validate(target, &stream, Some(1)),
                validate(target, &stream, Some(1))
            );
        }
    }

    #[test]
    fn empty_stream_accepts_nothing() {
        let stream = InstructionStream::new(Vec::<u8>::new());
        assert!(validate(0, &stream, None).is_err());
    }

    #[test]
    fn bounds_check_alone_ignores_alignment() {
        assert_eq!(check_bounds(9, 10, None), Ok(9));
        assert_eq!(
            check_bounds(10, 10, Some(2)),
            Err(InvalidJumpOffset::new(10, Some(2)))
        );
        assert!(check_bounds(-1, 10, None).is_err());
    }
}
